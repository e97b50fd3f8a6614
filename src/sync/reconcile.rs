//! Keeps cached reads in line with mutations.
//!
//! Targets map to cache keys by convention: `/.../<collection>/<id>` is the
//! entity `<collection>:<id>`, and `<collection>:list` is the cached listing
//! of that collection. A create targets the collection itself.

use serde_json::Value;

use crate::cache::CacheStore;
use crate::error::Result;
use crate::queue::OperationKind;

/// Cache keys touched by an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
  pub entity: Option<String>,
  pub collection: Option<String>,
}

impl CacheKeys {
  pub fn for_operation(kind: OperationKind, target: &str) -> Self {
    let path = target.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (kind, segments.as_slice()) {
      (_, []) => Self {
        entity: None,
        collection: None,
      },
      (OperationKind::Create, [.., collection]) | (_, [collection]) => Self {
        entity: None,
        collection: Some(list_key(collection)),
      },
      (_, [.., collection, id]) => Self {
        entity: Some(format!("{}:{}", collection, id)),
        collection: Some(list_key(collection)),
      },
    }
  }
}

fn list_key(collection: &str) -> String {
  format!("{}:list", collection)
}

/// Bring the cache in line with an operation the server has accepted.
pub(crate) fn apply_confirmed(
  cache: &CacheStore,
  kind: OperationKind,
  target: &str,
  payload: Option<&Value>,
) -> Result<()> {
  let keys = CacheKeys::for_operation(kind, target);
  apply_entity(cache, kind, keys.entity.as_deref(), payload)?;
  if let Some(collection) = &keys.collection {
    cache.invalidate(collection)?;
  }
  Ok(())
}

/// Reflect a queued operation in the cache before the server has seen it.
///
/// Listings are left alone so they stay readable offline.
pub(crate) fn apply_optimistic(
  cache: &CacheStore,
  kind: OperationKind,
  target: &str,
  payload: Option<&Value>,
) -> Result<()> {
  let keys = CacheKeys::for_operation(kind, target);
  apply_entity(cache, kind, keys.entity.as_deref(), payload)
}

fn apply_entity(
  cache: &CacheStore,
  kind: OperationKind,
  entity: Option<&str>,
  payload: Option<&Value>,
) -> Result<()> {
  let Some(entity) = entity else {
    return Ok(());
  };

  match (kind, payload) {
    (OperationKind::Update, Some(payload)) if !payload.is_null() => {
      cache.put(entity, payload.clone())
    }
    (OperationKind::Create, _) => Ok(()),
    _ => cache.invalidate(entity),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::MemoryStore;
  use crate::testing::ManualClock;
  use serde_json::json;
  use std::sync::Arc;

  fn keys(kind: OperationKind, target: &str) -> (Option<String>, Option<String>) {
    let k = CacheKeys::for_operation(kind, target);
    (k.entity, k.collection)
  }

  fn cache() -> CacheStore {
    CacheStore::new(Arc::new(MemoryStore::new()), Arc::new(ManualClock::new()))
  }

  #[test]
  fn test_key_convention() {
    assert_eq!(
      keys(OperationKind::Update, "/listings/42"),
      (Some("listings:42".into()), Some("listings:list".into()))
    );
    assert_eq!(
      keys(OperationKind::Delete, "/api/v1/listings/42?force=true"),
      (Some("listings:42".into()), Some("listings:list".into()))
    );
    assert_eq!(
      keys(OperationKind::Create, "/listings"),
      (None, Some("listings:list".into()))
    );
    assert_eq!(
      keys(OperationKind::Update, "/profile"),
      (None, Some("profile:list".into()))
    );
    assert_eq!(keys(OperationKind::Delete, "/"), (None, None));
  }

  #[test]
  fn test_confirmed_update_refreshes_entity_and_drops_listing() {
    let cache = cache();
    cache.put("listings:1", json!({"title": "old"})).unwrap();
    cache.put("listings:list", json!([1])).unwrap();

    apply_confirmed(
      &cache,
      OperationKind::Update,
      "/listings/1",
      Some(&json!({"title": "new"})),
    )
    .unwrap();

    assert_eq!(cache.get("listings:1").unwrap(), Some(json!({"title": "new"})));
    assert_eq!(cache.get("listings:list").unwrap(), None);
  }

  #[test]
  fn test_optimistic_delete_keeps_listing() {
    let cache = cache();
    cache.put("listings:1", json!({"title": "old"})).unwrap();
    cache.put("listings:list", json!([1])).unwrap();

    apply_optimistic(&cache, OperationKind::Delete, "/listings/1", None).unwrap();

    assert_eq!(cache.get("listings:1").unwrap(), None);
    assert_eq!(cache.get("listings:list").unwrap(), Some(json!([1])));
  }
}
