//! User favorites, kept locally and optionally mirrored to the server.

use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::client::OfflineClient;
use crate::error::Result;
use crate::queue::OperationKind;
use crate::storage::JsonStore;

/// Storage key of the favorite ids.
pub const FAVORITES_KEY: &str = "favorites:ids";

/// Whether favorites exist only on this device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FavoritesMode {
  #[default]
  LocalOnly,
  /// Every change is also submitted to `collection` (create on add,
  /// delete of `<collection>/<id>` on remove), queued while offline
  Mirrored { collection: String },
}

pub struct Favorites {
  client: Arc<OfflineClient>,
  mode: FavoritesMode,
  /// Insertion order, no duplicates
  ids: Mutex<Vec<String>>,
  /// Held across check, mirror and save so one id is never mirrored twice
  writer: AsyncMutex<()>,
}

impl Favorites {
  /// Load the saved favorites.
  pub fn open(client: Arc<OfflineClient>, mode: FavoritesMode) -> Result<Self> {
    let ids: Vec<String> = client
      .storage()
      .get_json::<Vec<String>>(FAVORITES_KEY)?
      .unwrap_or_default();

    Ok(Self {
      client,
      mode,
      ids: Mutex::new(ids),
      writer: AsyncMutex::new(()),
    })
  }

  pub fn mode(&self) -> &FavoritesMode {
    &self.mode
  }

  /// Mark `id` as a favorite. Returns false if it already was one.
  pub async fn add(&self, id: &str) -> Result<bool> {
    let _writer = self.writer.lock().await;
    if self.is_favorite(id) {
      return Ok(false);
    }

    if let FavoritesMode::Mirrored { collection } = &self.mode {
      self
        .client
        .submit(
          OperationKind::Create,
          &collection_target(collection),
          Some(json!({ "resourceId": id })),
        )
        .await?;
    }

    let added = self.update(|ids| {
      if ids.iter().any(|existing| existing == id) {
        false
      } else {
        ids.push(id.to_string());
        true
      }
    })?;
    if added {
      info!(id = %id, "Added favorite");
    }
    Ok(added)
  }

  /// Unmark `id`. Returns false if it was not a favorite.
  pub async fn remove(&self, id: &str) -> Result<bool> {
    let _writer = self.writer.lock().await;
    if !self.is_favorite(id) {
      return Ok(false);
    }

    if let FavoritesMode::Mirrored { collection } = &self.mode {
      let target = format!("{}/{}", collection_target(collection), id);
      self
        .client
        .submit(OperationKind::Delete, &target, None)
        .await?;
    }

    let removed = self.update(|ids| {
      let before = ids.len();
      ids.retain(|existing| existing != id);
      ids.len() != before
    })?;
    if removed {
      info!(id = %id, "Removed favorite");
    }
    Ok(removed)
  }

  pub fn is_favorite(&self, id: &str) -> bool {
    self.lock().iter().any(|existing| existing == id)
  }

  pub fn list_ids(&self) -> Vec<String> {
    self.lock().clone()
  }

  /// Apply `change` to the stored list and persist it in one step; memory
  /// only changes once the new list is stored.
  fn update(&self, change: impl FnOnce(&mut Vec<String>) -> bool) -> Result<bool> {
    let (ids, changed) =
      self
        .client
        .storage()
        .update_json(FAVORITES_KEY, |stored: Option<Vec<String>>| {
          let mut ids = stored.unwrap_or_default();
          let changed = change(&mut ids);
          Ok((changed.then(|| ids.clone()), (ids, changed)))
        })?;

    *self.lock() = ids;
    Ok(changed)
  }

  fn lock(&self) -> MutexGuard<'_, Vec<String>> {
    self.ids.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

fn collection_target(collection: &str) -> String {
  format!("/{}", collection.trim_matches('/'))
}
