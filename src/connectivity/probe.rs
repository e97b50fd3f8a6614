use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use super::ConnectivityMonitor;
use crate::remote::{RemoteApi, RemoteError, RemoteRequest};

/// Polls the server's health endpoint and reports reachability to a
/// [`ConnectivityMonitor`].
///
/// Any answer from the server, even an error status, counts as online;
/// only transport failures and timeouts count as offline.
#[derive(Clone)]
pub struct ReachabilityProbe {
  remote: Arc<dyn RemoteApi>,
  health_path: String,
  interval: Duration,
}

impl ReachabilityProbe {
  pub fn new(remote: Arc<dyn RemoteApi>, health_path: impl Into<String>, interval: Duration) -> Self {
    Self {
      remote,
      health_path: health_path.into(),
      interval,
    }
  }

  /// Probe once.
  pub async fn check_once(&self) -> bool {
    match self.remote.send(RemoteRequest::get(&self.health_path)).await {
      Ok(_) | Err(RemoteError::Status { .. }) => true,
      Err(e) => {
        debug!("Health probe failed: {}", e);
        !e.is_unreachable()
      }
    }
  }

  /// Probe once and report the result to `monitor`.
  pub async fn refresh(&self, monitor: &ConnectivityMonitor) -> bool {
    let online = self.check_once().await;
    monitor.set_online(online);
    online
  }

  /// Keep probing in the background until the task is aborted.
  pub fn spawn(self, monitor: Arc<ConnectivityMonitor>) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(self.interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        self.refresh(&monitor).await;
      }
    })
  }
}
