//! Composition root: one explicit instance of every component, wired
//! together, plus the mutate and read use-cases callers go through.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheLayer, CachePolicy, CacheResult, CacheStore};
use crate::clock::{Clock, SystemClock};
use crate::config::{self, Config};
use crate::connectivity::{ConnectivityMonitor, ReachabilityProbe};
use crate::error::{Error, Result};
use crate::queue::{OperationBody, OperationKind, PendingQueue};
use crate::remote::{HttpRemote, RemoteApi, RemoteRequest};
use crate::storage::{KeyValueStore, MemoryStore, SqliteStore, AUTH_TOKEN_KEY};
use crate::sync::{apply_confirmed, apply_optimistic, SyncEngine, SyncScheduler};

/// What happened to a submitted mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
  /// The server accepted it; carries the response body, if any
  Applied(Option<Value>),
  /// Stored for later replay under this operation id
  Queued(String),
}

impl Submission {
  pub fn is_queued(&self) -> bool {
    matches!(self, Submission::Queued(_))
  }
}

pub struct OfflineClient {
  storage: Arc<dyn KeyValueStore>,
  monitor: Arc<ConnectivityMonitor>,
  cache: Arc<CacheStore>,
  queue: Arc<PendingQueue>,
  remote: Arc<dyn RemoteApi>,
  engine: Arc<SyncEngine>,
  layer: CacheLayer,
  probe: ReachabilityProbe,
  poll_interval: Duration,
}

impl OfflineClient {
  /// Build the client from configuration.
  ///
  /// Probes the server once so the monitor starts from an observed state.
  pub async fn open(config: &Config) -> Result<Self> {
    let storage: Arc<dyn KeyValueStore> = if config.storage.is_in_memory() {
      Arc::new(MemoryStore::new())
    } else {
      let path = match &config.storage.path {
        Some(path) => path.clone(),
        None => SqliteStore::default_path()?,
      };
      debug!(path = %path.display(), "Opening store");
      Arc::new(SqliteStore::open(&path)?)
    };

    let token = match Config::api_token_from_env() {
      Some(token) => Some(token),
      None => storage.get(AUTH_TOKEN_KEY)?,
    };
    let remote: Arc<dyn RemoteApi> = Arc::new(HttpRemote::new(
      &config.server.base_url,
      config.server.timeout(),
      token,
    )?);
    let probe = ReachabilityProbe::new(
      remote.clone(),
      config.server.health_path.clone(),
      config.sync.probe_interval(),
    );
    let online = probe.check_once().await;
    info!(
      base_url = %config.server.base_url,
      online = online,
      "Client ready"
    );

    Ok(Self::assemble(
      storage,
      Arc::new(SystemClock),
      remote,
      probe,
      config.cache.policy(),
      config.sync.poll_interval(),
      online,
    ))
  }

  /// Build the client from injected collaborators, with default policies.
  pub fn with_parts(
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    remote: Arc<dyn RemoteApi>,
    initially_online: bool,
  ) -> Self {
    let probe = ReachabilityProbe::new(
      remote.clone(),
      config::DEFAULT_HEALTH_PATH,
      Duration::from_secs(config::DEFAULT_PROBE_INTERVAL_SECS),
    );
    Self::assemble(
      storage,
      clock,
      remote,
      probe,
      CachePolicy::default(),
      Duration::from_secs(config::DEFAULT_POLL_INTERVAL_SECS),
      initially_online,
    )
  }

  fn assemble(
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    remote: Arc<dyn RemoteApi>,
    probe: ReachabilityProbe,
    policy: CachePolicy,
    poll_interval: Duration,
    initially_online: bool,
  ) -> Self {
    let monitor = Arc::new(ConnectivityMonitor::new(initially_online, clock.clone()));
    let cache = Arc::new(CacheStore::new(storage.clone(), clock.clone()).with_policy(policy));
    let queue = Arc::new(PendingQueue::new(storage.clone(), clock));
    let engine = Arc::new(SyncEngine::new(
      queue.clone(),
      cache.clone(),
      remote.clone(),
      monitor.clone(),
    ));
    let layer = CacheLayer::new(cache.clone());

    Self {
      storage,
      monitor,
      cache,
      queue,
      remote,
      engine,
      layer,
      probe,
      poll_interval,
    }
  }

  /// Apply a mutation now if the server is reachable, otherwise queue it.
  ///
  /// A server that answers with an error is a rejection and is not
  /// queued; only an unreachable server is. A target that still has queued
  /// operations is queued behind them, so replay never overwrites a newer
  /// direct write.
  pub async fn submit(
    &self,
    kind: OperationKind,
    target: &str,
    payload: Option<Value>,
  ) -> Result<Submission> {
    if self.monitor.is_online() && !self.has_pending(target)? {
      let request = RemoteRequest {
        method: kind.method(),
        target: target.to_string(),
        body: OperationBody::new(kind, payload.clone()).payload().cloned(),
      };

      match self.remote.send(request).await {
        Ok(response) => {
          if let Err(e) = apply_confirmed(&self.cache, kind, target, payload.as_ref()) {
            warn!(endpoint = %target, "Cache not updated: {}", e);
          }
          debug!(kind = %kind, endpoint = %target, "Applied");
          return Ok(Submission::Applied(response));
        }
        Err(e) if e.is_unreachable() => {
          warn!(endpoint = %target, "Server unreachable, queueing: {}", e);
          self.monitor.set_online(false);
        }
        Err(e) => {
          return Err(Error::OperationRejected {
            target: target.to_string(),
            reason: e.to_string(),
          });
        }
      }
    }

    let id = self.queue.enqueue(kind, target, payload.clone())?;
    if let Err(e) = apply_optimistic(&self.cache, kind, target, payload.as_ref()) {
      warn!(endpoint = %target, "Cache not updated: {}", e);
    }
    Ok(Submission::Queued(id))
  }

  fn has_pending(&self, target: &str) -> Result<bool> {
    Ok(self.queue.list()?.iter().any(|op| op.target == target))
  }

  /// Read `target`, caching it under `key`, with offline fallback.
  pub async fn fetch(&self, key: &str, target: &str) -> Result<CacheResult<Value>> {
    let remote = self.remote.clone();
    let request = RemoteRequest::get(target);
    self
      .layer
      .fetch_one(key, self.monitor.is_online(), || async move {
        remote
          .send(request)
          .await
          .map(|body| body.unwrap_or(Value::Null))
      })
      .await
  }

  /// Start the reachability probe and the sync scheduler.
  pub fn spawn_background(&self) -> Background {
    let probe = self.probe.clone().spawn(self.monitor.clone());
    let scheduler = SyncScheduler::spawn(self.engine.clone(), &self.monitor, self.poll_interval);
    Background { probe, scheduler }
  }

  pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
    &self.storage
  }

  pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
    &self.monitor
  }

  pub fn cache(&self) -> &Arc<CacheStore> {
    &self.cache
  }

  pub fn queue(&self) -> &Arc<PendingQueue> {
    &self.queue
  }

  pub fn engine(&self) -> &Arc<SyncEngine> {
    &self.engine
  }

  pub fn probe(&self) -> &ReachabilityProbe {
    &self.probe
  }
}

/// Background tasks started by [`OfflineClient::spawn_background`].
pub struct Background {
  probe: JoinHandle<()>,
  scheduler: SyncScheduler,
}

impl Background {
  pub fn scheduler(&self) -> &SyncScheduler {
    &self.scheduler
  }

  pub fn shutdown(self) {
    self.probe.abort();
    self.scheduler.shutdown();
  }
}
