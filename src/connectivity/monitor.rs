use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

use crate::clock::Clock;

/// Current view of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
  pub is_online: bool,
  /// When the monitor last saw the transport come online
  pub last_online_at: Option<DateTime<Utc>>,
}

/// Delivered to listeners on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityChange {
  pub state: ConnectivityState,
  /// Time spent offline, set only on a transition to online
  pub offline_for: Option<Duration>,
}

type Listener = Arc<dyn Fn(&ConnectivityChange) + Send + Sync>;

struct Inner {
  state: ConnectivityState,
  offline_since: Option<DateTime<Utc>>,
}

/// Tracks online/offline transitions and notifies listeners.
pub struct ConnectivityMonitor {
  clock: Arc<dyn Clock>,
  inner: Mutex<Inner>,
  listeners: Mutex<Vec<Listener>>,
}

impl ConnectivityMonitor {
  /// Create a monitor seeded with the transport state observed at startup.
  pub fn new(initially_online: bool, clock: Arc<dyn Clock>) -> Self {
    let now = clock.now();
    let inner = Inner {
      state: ConnectivityState {
        is_online: initially_online,
        last_online_at: initially_online.then_some(now),
      },
      offline_since: (!initially_online).then_some(now),
    };

    Self {
      clock,
      inner: Mutex::new(inner),
      listeners: Mutex::new(Vec::new()),
    }
  }

  pub fn is_online(&self) -> bool {
    self.lock_inner().state.is_online
  }

  pub fn state(&self) -> ConnectivityState {
    self.lock_inner().state
  }

  /// Register a listener for transitions in either direction.
  pub fn on_change<F>(&self, listener: F)
  where
    F: Fn(&ConnectivityChange) + Send + Sync + 'static,
  {
    self
      .listeners
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(Arc::new(listener));
  }

  /// Report the transport state.
  ///
  /// Returns true if this was a transition. Reporting the current state
  /// again is not a transition and notifies nobody.
  pub fn set_online(&self, online: bool) -> bool {
    let change = {
      let mut inner = self.lock_inner();
      if inner.state.is_online == online {
        return false;
      }

      let now = self.clock.now();
      inner.state.is_online = online;
      let offline_for = if online {
        inner.state.last_online_at = Some(now);
        inner.offline_since.take().map(|since| now - since)
      } else {
        inner.offline_since = Some(now);
        None
      };

      ConnectivityChange {
        state: inner.state,
        offline_for,
      }
    };

    if online {
      let secs = change.offline_for.map(|d| d.num_seconds()).unwrap_or(0);
      info!(offline_secs = secs, "Network: online");
    } else {
      warn!("Network: offline");
    }

    // Snapshot so listeners may query the monitor without deadlocking
    let listeners: Vec<Listener> = self
      .listeners
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone();
    for listener in listeners {
      listener(&change);
    }

    true
  }

  fn lock_inner(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::ManualClock;

  fn monitor(online: bool) -> (Arc<ManualClock>, ConnectivityMonitor) {
    let clock = Arc::new(ManualClock::new());
    let monitor = ConnectivityMonitor::new(online, clock.clone());
    (clock, monitor)
  }

  fn recorder(monitor: &ConnectivityMonitor) -> Arc<Mutex<Vec<ConnectivityChange>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    monitor.on_change(move |change| sink.lock().unwrap().push(*change));
    seen
  }

  #[test]
  fn test_initial_state() {
    let (clock, online) = monitor(true);
    assert!(online.is_online());
    assert_eq!(online.state().last_online_at, Some(clock.now()));

    let (_, offline) = monitor(false);
    assert!(!offline.is_online());
    assert_eq!(offline.state().last_online_at, None);
  }

  #[test]
  fn test_repeated_state_is_not_a_transition() {
    let (_, monitor) = monitor(true);
    let seen = recorder(&monitor);

    assert!(!monitor.set_online(true));
    assert!(seen.lock().unwrap().is_empty());
  }

  #[test]
  fn test_reconnect_reports_offline_duration() {
    let (clock, monitor) = monitor(true);
    let seen = recorder(&monitor);

    assert!(monitor.set_online(false));
    clock.advance(Duration::minutes(5));
    assert!(monitor.set_online(true));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(!seen[0].state.is_online);
    assert_eq!(seen[0].offline_for, None);
    assert!(seen[1].state.is_online);
    assert_eq!(seen[1].offline_for, Some(Duration::minutes(5)));
    assert_eq!(seen[1].state.last_online_at, Some(clock.now()));
  }

  #[test]
  fn test_listener_can_query_monitor() {
    let (_, monitor) = monitor(false);
    let monitor = Arc::new(monitor);
    let observed = Arc::new(Mutex::new(None));

    let m = Arc::downgrade(&monitor);
    let o = observed.clone();
    monitor.on_change(move |_| {
      if let Some(m) = m.upgrade() {
        *o.lock().unwrap() = Some(m.is_online());
      }
    });

    monitor.set_online(true);
    assert_eq!(*observed.lock().unwrap(), Some(true));
  }
}
