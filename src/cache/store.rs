//! TTL key-value cache on top of the storage substrate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::storage::{JsonStore, KeyValueStore};

/// Prefix of every cache key in storage.
const KEY_PREFIX: &str = "cache:";

/// How long entries stay readable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
  default_ttl: Duration,
  namespace_ttl: HashMap<String, Duration>,
}

impl CachePolicy {
  /// Default age after which an entry is expired.
  pub const DEFAULT_TTL_HOURS: i64 = 24;

  pub fn new(default_ttl: Duration) -> Self {
    Self {
      default_ttl,
      namespace_ttl: HashMap::new(),
    }
  }

  /// Override the TTL for keys in `namespace` (the part before the first `:`).
  pub fn with_namespace_ttl(mut self, namespace: impl Into<String>, ttl: Duration) -> Self {
    self.namespace_ttl.insert(namespace.into(), ttl);
    self
  }

  pub fn ttl_for(&self, key: &str) -> Duration {
    key
      .split_once(':')
      .and_then(|(namespace, _)| self.namespace_ttl.get(namespace))
      .copied()
      .unwrap_or(self.default_ttl)
  }
}

impl Default for CachePolicy {
  fn default() -> Self {
    Self::new(Duration::hours(Self::DEFAULT_TTL_HOURS))
  }
}

/// A live cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  pub key: String,
  pub payload: Value,
  pub stored_at: DateTime<Utc>,
}

/// Stored wrapper: `{ "payload": ..., "storedAt": ... }`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
  payload: Value,
  stored_at: DateTime<Utc>,
}

/// Cache of previously fetched server data.
pub struct CacheStore {
  storage: Arc<dyn KeyValueStore>,
  clock: Arc<dyn Clock>,
  policy: CachePolicy,
}

impl CacheStore {
  pub fn new(storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
    Self {
      storage,
      clock,
      policy: CachePolicy::default(),
    }
  }

  pub fn with_policy(mut self, policy: CachePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn policy(&self) -> &CachePolicy {
    &self.policy
  }

  /// Insert or overwrite `key`, stamped with the current time.
  pub fn put(&self, key: &str, payload: Value) -> Result<()> {
    let entry = StoredEntry {
      payload,
      stored_at: self.clock.now(),
    };
    self.storage.set_json(&storage_key(key), &entry)
  }

  /// Payload for `key` if present and not expired.
  pub fn get(&self, key: &str) -> Result<Option<Value>> {
    Ok(self.get_entry(key)?.map(|entry| entry.payload))
  }

  /// Like [`get`](Self::get), with the entry's metadata.
  ///
  /// Expired or undecodable entries are purged and reported as missing.
  pub fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
    let storage_key = storage_key(key);

    let stored = match self.storage.get_json::<StoredEntry>(&storage_key) {
      Ok(Some(stored)) => stored,
      Ok(None) => return Ok(None),
      Err(Error::Corrupt { reason, .. }) => {
        warn!(key = %key, "Dropping unreadable cache entry: {}", reason);
        self.storage.remove(&storage_key)?;
        return Ok(None);
      }
      Err(e) => return Err(e),
    };

    let age = self.clock.now() - stored.stored_at;
    if age > self.policy.ttl_for(key) {
      debug!(key = %key, age_secs = age.num_seconds(), "Cache entry expired");
      self.storage.remove(&storage_key)?;
      return Ok(None);
    }

    Ok(Some(CacheEntry {
      key: key.to_string(),
      payload: stored.payload,
      stored_at: stored.stored_at,
    }))
  }

  /// Remove `key` regardless of age.
  pub fn invalidate(&self, key: &str) -> Result<()> {
    self.storage.remove(&storage_key(key))
  }
}

fn storage_key(key: &str) -> String {
  format!("{}{}", KEY_PREFIX, key)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::MemoryStore;
  use crate::testing::{FlakyStore, ManualClock};
  use serde_json::json;

  fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, CacheStore) {
    let storage = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new());
    let cache = CacheStore::new(storage.clone(), clock.clone());
    (storage, clock, cache)
  }

  #[test]
  fn test_put_overwrites() {
    let (_, _, cache) = setup();
    cache.put("listings:1", json!({"title": "old"})).unwrap();
    cache.put("listings:1", json!({"title": "new"})).unwrap();

    assert_eq!(cache.get("listings:1").unwrap(), Some(json!({"title": "new"})));
  }

  #[test]
  fn test_entry_is_stored_under_namespaced_key() {
    let (storage, clock, cache) = setup();
    cache.put("listings:1", json!(1)).unwrap();

    let raw: Value = storage.get_json("cache:listings:1").unwrap().unwrap();
    assert_eq!(raw["payload"], json!(1));
    assert_eq!(raw["storedAt"], json!(clock.now()));
  }

  #[test]
  fn test_ttl_boundary() {
    let (storage, clock, cache) = setup();
    cache.put("listings:1", json!("x")).unwrap();

    clock.advance(Duration::hours(23) + Duration::minutes(59));
    assert_eq!(cache.get("listings:1").unwrap(), Some(json!("x")));

    clock.advance(Duration::minutes(2));
    assert_eq!(cache.get("listings:1").unwrap(), None);
    // purged, not just hidden
    assert_eq!(storage.get("cache:listings:1").unwrap(), None);
  }

  #[test]
  fn test_namespace_ttl_override() {
    let (_, clock, cache) = setup();
    let cache =
      cache.with_policy(CachePolicy::default().with_namespace_ttl("prices", Duration::minutes(10)));

    cache.put("prices:1", json!(10)).unwrap();
    cache.put("listings:1", json!("x")).unwrap();
    clock.advance(Duration::minutes(11));

    assert_eq!(cache.get("prices:1").unwrap(), None);
    assert_eq!(cache.get("listings:1").unwrap(), Some(json!("x")));
  }

  #[test]
  fn test_invalidate() {
    let (_, _, cache) = setup();
    cache.put("listings:1", json!("x")).unwrap();
    cache.invalidate("listings:1").unwrap();
    cache.invalidate("listings:missing").unwrap();

    assert_eq!(cache.get("listings:1").unwrap(), None);
  }

  #[test]
  fn test_unreadable_entry_is_purged() {
    let (storage, _, cache) = setup();
    storage.set("cache:listings:1", "garbage").unwrap();

    assert_eq!(cache.get("listings:1").unwrap(), None);
    assert_eq!(storage.get("cache:listings:1").unwrap(), None);
  }

  #[test]
  fn test_storage_failure_propagates() {
    let storage = Arc::new(FlakyStore::new());
    let cache = CacheStore::new(storage.clone(), Arc::new(ManualClock::new()));
    storage.set_broken(true);

    assert!(matches!(
      cache.put("listings:1", json!(1)),
      Err(Error::StorageUnavailable(_))
    ));
    assert!(matches!(
      cache.get("listings:1"),
      Err(Error::StorageUnavailable(_))
    ));
  }
}
