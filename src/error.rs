use thiserror::Error;

use crate::remote::RemoteError;

/// Errors surfaced by the offline engine's public operations.
#[derive(Debug, Error)]
pub enum Error {
  /// Persistent storage could not be read or written.
  #[error("storage unavailable: {0}")]
  StorageUnavailable(String),

  /// A stored value exists but could not be decoded.
  #[error("stored value under '{key}' is unreadable: {reason}")]
  Corrupt { key: String, reason: String },

  /// The server refused (or never answered) a specific operation.
  #[error("operation on {target} rejected: {reason}")]
  OperationRejected { target: String, reason: String },

  #[error("sync unavailable while offline")]
  SyncUnavailable,

  /// Offline read with nothing usable in the cache.
  #[error("no cached data for '{0}'")]
  NotCached(String),

  #[error(transparent)]
  Remote(#[from] RemoteError),
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self {
    Error::StorageUnavailable(e.to_string())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
