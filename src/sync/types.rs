/// Outcome of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
  /// True when nothing failed
  pub success: bool,
  pub synced_count: usize,
  pub failed_count: usize,
  /// One line per failure, plus any reason the run did not happen
  pub messages: Vec<String>,
}

impl SyncResult {
  /// Result of a run over an empty queue.
  pub fn empty() -> Self {
    Self {
      success: true,
      ..Self::default()
    }
  }

  /// A run that did not replay anything (offline, already running, queue
  /// unreadable).
  pub fn not_run(message: impl Into<String>) -> Self {
    Self {
      success: false,
      messages: vec![message.into()],
      ..Self::default()
    }
  }

  pub(crate) fn record_synced(&mut self) {
    self.synced_count += 1;
  }

  pub(crate) fn record_failure(&mut self, message: String) {
    self.failed_count += 1;
    self.messages.push(message);
  }

  pub(crate) fn finish(mut self) -> Self {
    self.success = self.failed_count == 0;
    self
  }
}

impl std::fmt::Display for SyncResult {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let status = if self.success { "ok" } else { "failed" };
    write!(
      f,
      "{}: {} synced, {} failed",
      status, self.synced_count, self.failed_count
    )
  }
}

/// Sync engine state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncState {
  /// No run has happened yet
  #[default]
  Idle,
  /// A replay pass is in flight
  Syncing,
  /// Last run finished with this result
  Done(SyncResult),
}

impl SyncState {
  pub fn is_syncing(&self) -> bool {
    matches!(self, SyncState::Syncing)
  }

  pub fn last_result(&self) -> Option<&SyncResult> {
    match self {
      SyncState::Done(result) => Some(result),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_finish_sets_success_from_failures() {
    let mut result = SyncResult::default();
    result.record_synced();
    result.record_synced();
    result.record_failure("PUT /a/2: HTTP 500".into());
    let result = result.finish();

    assert!(!result.success);
    assert_eq!((result.synced_count, result.failed_count), (2, 1));
    assert_eq!(result.to_string(), "failed: 2 synced, 1 failed");
  }

  #[test]
  fn test_empty_is_success() {
    let result = SyncResult::empty();
    assert!(result.success);
    assert!(result.messages.is_empty());
    assert_eq!(SyncState::Done(result.clone()).last_result(), Some(&result));
  }
}
