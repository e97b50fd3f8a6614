use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::reconcile::apply_confirmed;
use super::types::{SyncResult, SyncState};
use crate::cache::CacheStore;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::queue::{PendingOperation, PendingQueue};
use crate::remote::RemoteApi;

/// Replays pending operations, oldest first, one at a time.
///
/// A failed operation stays queued and does not stop the ones after it.
/// Only one pass runs at a time; a request that arrives while a pass is
/// in flight is declined, since that pass (or the next trigger) will see
/// whatever was queued meanwhile.
pub struct SyncEngine {
  queue: Arc<PendingQueue>,
  cache: Arc<CacheStore>,
  remote: Arc<dyn RemoteApi>,
  monitor: Arc<ConnectivityMonitor>,
  state: watch::Sender<SyncState>,
}

impl SyncEngine {
  pub fn new(
    queue: Arc<PendingQueue>,
    cache: Arc<CacheStore>,
    remote: Arc<dyn RemoteApi>,
    monitor: Arc<ConnectivityMonitor>,
  ) -> Self {
    let (state, _) = watch::channel(SyncState::Idle);
    Self {
      queue,
      cache,
      remote,
      monitor,
      state,
    }
  }

  pub fn state(&self) -> SyncState {
    self.state.borrow().clone()
  }

  /// Watch state changes (e.g. to drive a status indicator).
  pub fn subscribe(&self) -> watch::Receiver<SyncState> {
    self.state.subscribe()
  }

  pub fn is_online(&self) -> bool {
    self.monitor.is_online()
  }

  pub fn pending_count(&self) -> Result<usize> {
    self.queue.len()
  }

  /// Run one sync pass now.
  ///
  /// Declines with `success: false` when offline or when another pass is
  /// already running; neither case touches the server.
  pub async fn run_sync(&self) -> SyncResult {
    if !self.monitor.is_online() {
      info!("Sync skipped: offline");
      return SyncResult::not_run(Error::SyncUnavailable.to_string());
    }

    match self.try_run().await {
      Some(result) => result,
      None => SyncResult::not_run("sync already in progress"),
    }
  }

  /// Run a pass unless one is in flight. Returns `None` if declined.
  pub async fn try_run(&self) -> Option<SyncResult> {
    let started = self.state.send_if_modified(|state| {
      if state.is_syncing() {
        false
      } else {
        *state = SyncState::Syncing;
        true
      }
    });
    if !started {
      debug!("Sync already in progress, ignoring trigger");
      return None;
    }

    let guard = RunGuard {
      state: &self.state,
      done: false,
    };
    let result = self.replay().await;
    guard.finish(result.clone());
    Some(result)
  }

  async fn replay(&self) -> SyncResult {
    let ops = match self.queue.list() {
      Ok(ops) => ops,
      Err(e) => {
        error!("Cannot read pending operations: {}", e);
        return SyncResult::not_run(format!("pending operations unavailable: {}", e));
      }
    };

    if ops.is_empty() {
      debug!("Nothing to sync");
      return SyncResult::empty();
    }

    info!(pending = ops.len(), "Sync started");
    let mut result = SyncResult::default();
    for op in &ops {
      match self.replay_one(op).await {
        Ok(()) => result.record_synced(),
        Err(e) => {
          warn!(id = %op.id, "{}", e);
          result.record_failure(format!("{} ({}): {}", op.kind(), op.id, e));
        }
      }
    }

    let result = result.finish();
    info!(
      synced = result.synced_count,
      failed = result.failed_count,
      "Sync finished"
    );
    result
  }

  async fn replay_one(&self, op: &PendingOperation) -> Result<()> {
    let request = op.to_request();
    debug!(id = %op.id, method = %request.method, endpoint = %op.target, "Replaying");

    self
      .remote
      .send(request)
      .await
      .map_err(|e| Error::OperationRejected {
        target: op.target.clone(),
        reason: e.to_string(),
      })?;

    if let Err(e) = apply_confirmed(&self.cache, op.kind(), &op.target, op.payload()) {
      warn!(id = %op.id, "Cache not updated after sync: {}", e);
    }

    // Still queued means it will be sent again; report it rather than count it
    self.queue.remove(&op.id).map_err(|e| {
      Error::StorageUnavailable(format!("applied on server but still queued: {}", e))
    })?;
    Ok(())
  }
}

/// Puts the engine back in a terminal state even if the run future is
/// dropped halfway.
struct RunGuard<'a> {
  state: &'a watch::Sender<SyncState>,
  done: bool,
}

impl RunGuard<'_> {
  fn finish(mut self, result: SyncResult) {
    self.done = true;
    self.state.send_replace(SyncState::Done(result));
  }
}

impl Drop for RunGuard<'_> {
  fn drop(&mut self) {
    if !self.done {
      self.state.send_replace(SyncState::Idle);
    }
  }
}
