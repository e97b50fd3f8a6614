//! Cache layer that orchestrates caching logic with network fetching.

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::store::{CacheEntry, CacheStore};
use super::traits::CacheResult;
use crate::error::{Error, Result};
use crate::remote::RemoteResult;

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network client,
/// refreshing the cache on every successful read and serving the cache
/// when the network cannot.
pub struct CacheLayer {
  store: Arc<CacheStore>,
}

impl CacheLayer {
  pub fn new(store: Arc<CacheStore>) -> Self {
    Self { store }
  }

  /// Fetch a single value with offline fallback.
  ///
  /// 1. Offline: serve the cache, or fail with [`Error::NotCached`]
  /// 2. Online: fetch from network and overwrite the cache
  /// 3. On network failure, serve the cache if there is one
  pub async fn fetch_one<T, F, Fut>(
    &self,
    key: &str,
    online: bool,
    fetcher: F,
  ) -> Result<CacheResult<T>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = RemoteResult<T>>,
  {
    if !online {
      return match self.cached::<T>(key)? {
        Some((data, entry)) => {
          debug!(key = %key, "Serving cached data while offline");
          Ok(CacheResult::offline(data, entry.stored_at))
        }
        None => Err(Error::NotCached(key.to_string())),
      };
    }

    match fetcher().await {
      Ok(data) => {
        let payload = serde_json::to_value(&data)
          .map_err(|e| Error::StorageUnavailable(format!("Failed to serialize {}: {}", key, e)))?;
        self.store.put(key, payload)?;
        Ok(CacheResult::from_network(data))
      }
      Err(e) => match self.cached::<T>(key)? {
        Some((data, entry)) => {
          warn!(key = %key, "Network read failed, serving cache: {}", e);
          Ok(CacheResult::fallback(data, entry.stored_at))
        }
        None => Err(Error::Remote(e)),
      },
    }
  }

  fn cached<T: DeserializeOwned>(&self, key: &str) -> Result<Option<(T, CacheEntry)>> {
    let Some(entry) = self.store.get_entry(key)? else {
      return Ok(None);
    };

    match serde_json::from_value(entry.payload.clone()) {
      Ok(data) => Ok(Some((data, entry))),
      Err(e) => {
        // Shape changed since it was cached; useless to this reader
        warn!(key = %key, "Cached payload does not match expected type: {}", e);
        Ok(None)
      }
    }
  }
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
    }
  }
}
