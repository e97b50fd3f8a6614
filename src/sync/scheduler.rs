use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::engine::SyncEngine;
use crate::connectivity::ConnectivityMonitor;

/// Why a run was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
  Reconnected,
  Poll,
  Manual,
}

/// Background task that starts sync runs.
///
/// Runs are spawned, not awaited, so a trigger arriving mid-run reaches the
/// engine and is declined there instead of piling up behind it.
pub struct SyncScheduler {
  tx: mpsc::UnboundedSender<Trigger>,
  handle: JoinHandle<()>,
}

impl SyncScheduler {
  /// Start scheduling runs: on every reconnect, and every `poll_interval`
  /// while online with work queued.
  pub fn spawn(
    engine: Arc<SyncEngine>,
    monitor: &ConnectivityMonitor,
    poll_interval: Duration,
  ) -> Self {
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Weak, so the loop ends once the scheduler handle is gone even though
    // the monitor keeps the listener
    let reconnect_tx = tx.downgrade();
    monitor.on_change(move |change| {
      if !change.state.is_online {
        return;
      }
      if let Some(tx) = reconnect_tx.upgrade() {
        let _ = tx.send(Trigger::Reconnected);
      }
    });

    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(poll_interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      // The first tick completes immediately
      ticker.tick().await;

      loop {
        let trigger = tokio::select! {
          trigger = rx.recv() => match trigger {
            Some(trigger) => trigger,
            None => break,
          },
          _ = ticker.tick() => Trigger::Poll,
        };

        if trigger != Trigger::Manual && !worth_running(&engine) {
          continue;
        }

        debug!(?trigger, "Starting sync");
        let engine = engine.clone();
        tokio::spawn(async move {
          engine.run_sync().await;
        });
      }
    });

    Self { tx, handle }
  }

  /// Ask for a run now.
  pub fn trigger(&self) {
    if self.tx.send(Trigger::Manual).is_err() {
      warn!("Sync scheduler is not running");
    }
  }

  pub fn shutdown(self) {
    drop(self.tx);
    self.handle.abort();
  }
}

fn worth_running(engine: &SyncEngine) -> bool {
  if !engine.is_online() {
    return false;
  }
  match engine.pending_count() {
    Ok(n) => n > 0,
    Err(e) => {
      // Let the engine report it as a failed run
      warn!("Cannot count pending operations: {}", e);
      true
    }
  }
}
