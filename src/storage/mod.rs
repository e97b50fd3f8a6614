//! Persistent key-value substrate shared by the queue, the cache and the
//! favorites list.
//!
//! Everything the engine persists lives under a namespaced string key
//! (`queue:pending-operations`, `cache:<namespace>:<id>`, `favorites:ids`,
//! `auth:token`) with a JSON string value.

mod memory;
mod sqlite;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage key holding the auth token, written by the login flow.
pub const AUTH_TOKEN_KEY: &str = "auth:token";

/// Trait for key-value storage backends.
pub trait KeyValueStore: Send + Sync {
  /// Read the raw value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Insert or overwrite `key`.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Delete `key`. Deleting a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;

  /// Read-modify-write `key` as one step, atomic against every other
  /// writer of the same store (other handles and processes included).
  ///
  /// `change` sees the current value and returns the value to store, or
  /// `None` to leave it as is. An error from `change` aborts the write.
  fn update(
    &self,
    key: &str,
    change: &mut dyn FnMut(Option<String>) -> Result<Option<String>>,
  ) -> Result<()>;
}

/// JSON helpers available on every store, including `dyn KeyValueStore`.
pub trait JsonStore: KeyValueStore {
  /// Read and decode a JSON value.
  fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    self.get(key)?.map(|raw| decode(key, &raw)).transpose()
  }

  /// Encode and store a JSON value.
  fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
    self.set(key, &encode(key, value)?)
  }

  /// Atomically decode, change and re-encode a JSON value.
  ///
  /// `change` returns the new value (`None` writes nothing) and a result
  /// handed back to the caller.
  fn update_json<T, R, F>(&self, key: &str, change: F) -> Result<R>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(Option<T>) -> Result<(Option<T>, R)>,
  {
    let mut change = Some(change);
    let mut outcome = None;

    self.update(key, &mut |raw| {
      let change = change
        .take()
        .ok_or_else(|| Error::StorageUnavailable(format!("update of {} re-entered", key)))?;
      let current = raw.map(|raw| decode::<T>(key, &raw)).transpose()?;
      let (next, result) = change(current)?;
      outcome = Some(result);
      next.map(|value| encode(key, &value)).transpose()
    })?;

    outcome.ok_or_else(|| Error::StorageUnavailable(format!("update of {} did not run", key)))
  }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
  serde_json::from_str(raw).map_err(|e| Error::Corrupt {
    key: key.to_string(),
    reason: e.to_string(),
  })
}

fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String> {
  serde_json::to_string(value)
    .map_err(|e| Error::StorageUnavailable(format!("Failed to serialize {}: {}", key, e)))
}

impl<S: KeyValueStore + ?Sized> JsonStore for S {}
