//! SQLite-backed key-value storage.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::KeyValueStore;
use crate::error::{Error, Result};

/// How long a write waits for another connection's lock on the same file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based storage implementation.
///
/// Several handles (or processes) may share one file; `update` holds the
/// database write lock for its whole read-modify-write.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        Error::StorageUnavailable(format!("Failed to create storage directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::StorageUnavailable(format!(
        "Failed to open store at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::StorageUnavailable("Could not determine data directory".into()))?;

    Ok(data_dir.join("offsync").join("store.db"))
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(SCHEMA)
      .map_err(|e| Error::StorageUnavailable(format!("Failed to run migrations: {}", e)))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::StorageUnavailable(format!("Lock poisoned: {}", e)))
  }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl KeyValueStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.lock()?;
    let value = conn
      .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()?;
    Ok(value)
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO kv (key, value, written_at) VALUES (?, ?, datetime('now'))",
      params![key, value],
    )?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM kv WHERE key = ?", params![key])?;
    Ok(())
  }

  fn update(
    &self,
    key: &str,
    change: &mut dyn FnMut(Option<String>) -> Result<Option<String>>,
  ) -> Result<()> {
    let mut conn = self.lock()?;
    // IMMEDIATE takes the write lock up front so no other writer slips in
    // between the read and the write
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current: Option<String> = tx
      .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()?;

    // Dropping the transaction on error rolls it back
    if let Some(next) = change(current)? {
      tx.execute(
        "INSERT OR REPLACE INTO kv (key, value, written_at) VALUES (?, ?, datetime('now'))",
        params![key, next],
      )?;
    }

    tx.commit()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_set_get_remove() {
    let store = SqliteStore::open_in_memory().unwrap();

    assert_eq!(store.get("a").unwrap(), None);
    store.set("a", "1").unwrap();
    store.set("a", "2").unwrap();
    assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));

    store.remove("a").unwrap();
    store.remove("a").unwrap();
    assert_eq!(store.get("a").unwrap(), None);
  }

  #[test]
  fn test_update_is_atomic_across_handles() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.db");
    SqliteStore::open(&path).unwrap().set("counter", "0").unwrap();

    let handles: Vec<_> = (0..2)
      .map(|_| {
        let path = path.clone();
        std::thread::spawn(move || {
          let store = SqliteStore::open(&path).unwrap();
          for _ in 0..100 {
            store
              .update("counter", &mut |raw| {
                let n: u64 = raw.as_deref().unwrap_or("0").parse().unwrap();
                Ok(Some((n + 1).to_string()))
              })
              .unwrap();
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.get("counter").unwrap().as_deref(), Some("200"));
  }

  #[test]
  fn test_failed_update_rolls_back() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.set("k", "1").unwrap();

    let result = store.update("k", &mut |_| Err(Error::StorageUnavailable("nope".into())));

    assert!(result.is_err());
    assert_eq!(store.get("k").unwrap().as_deref(), Some("1"));
    // the connection is usable again afterwards
    store.set("k", "2").unwrap();
  }

  #[test]
  fn test_values_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("store.db");

    {
      let store = SqliteStore::open(&path).unwrap();
      store.set("queue:pending-operations", "[]").unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(
      store.get("queue:pending-operations").unwrap().as_deref(),
      Some("[]")
    );
  }
}
