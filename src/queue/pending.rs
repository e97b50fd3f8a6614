use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use super::operation::{OperationKind, PendingOperation, SCHEMA_VERSION};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::storage::{JsonStore, KeyValueStore};

/// Storage key of the queue.
pub const QUEUE_KEY: &str = "queue:pending-operations";

/// Ordered, durable queue of pending operations.
///
/// `enqueue` and `remove` are the only mutators. Both rewrite the stored
/// array through [`KeyValueStore::update`], so concurrent writers (threads,
/// other handles on the same file, other processes) never lose each
/// other's writes.
pub struct PendingQueue {
  storage: Arc<dyn KeyValueStore>,
  clock: Arc<dyn Clock>,
  next_seq: Mutex<u64>,
}

impl PendingQueue {
  pub fn new(storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
    Self {
      storage,
      clock,
      next_seq: Mutex::new(0),
    }
  }

  /// Append an operation and persist it before returning its id.
  pub fn enqueue(
    &self,
    kind: OperationKind,
    target: &str,
    payload: Option<Value>,
  ) -> Result<String> {
    let mut seq = self.next_seq.lock().unwrap_or_else(PoisonError::into_inner);

    let op = PendingOperation::new(kind, target, payload, self.clock.now(), *seq);
    let id = op.id.clone();
    let pending = self.storage.update_json(QUEUE_KEY, |stored: Option<Vec<PendingOperation>>| {
      let mut ops = checked(stored)?;
      ops.push(op);
      sort(&mut ops);
      let pending = ops.len();
      Ok((Some(ops), pending))
    })?;

    *seq += 1;
    info!(id = %id, kind = %kind, endpoint = %target, pending = pending, "Queued operation");
    Ok(id)
  }

  /// All pending operations, oldest first.
  pub fn list(&self) -> Result<Vec<PendingOperation>> {
    let mut ops = self.load()?;
    sort(&mut ops);
    Ok(ops)
  }

  /// Remove one operation. Returns false if it was not queued.
  pub fn remove(&self, id: &str) -> Result<bool> {
    let remaining = self.storage.update_json(QUEUE_KEY, |stored: Option<Vec<PendingOperation>>| {
      let mut ops = checked(stored)?;
      let before = ops.len();
      ops.retain(|op| op.id != id);
      if ops.len() == before {
        return Ok((None, None));
      }
      let remaining = ops.len();
      Ok((Some(ops), Some(remaining)))
    })?;

    match remaining {
      Some(pending) => {
        debug!(id = %id, pending = pending, "Removed operation");
        Ok(true)
      }
      None => Ok(false),
    }
  }

  pub fn len(&self) -> Result<usize> {
    Ok(self.load()?.len())
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }

  fn load(&self) -> Result<Vec<PendingOperation>> {
    checked(self.storage.get_json(QUEUE_KEY)?)
  }
}

/// The stored array, refusing records written by another schema version.
fn checked(stored: Option<Vec<PendingOperation>>) -> Result<Vec<PendingOperation>> {
  let ops = stored.unwrap_or_default();

  if let Some(op) = ops.iter().find(|op| op.version != SCHEMA_VERSION) {
    return Err(Error::Corrupt {
      key: QUEUE_KEY.to_string(),
      reason: format!(
        "operation {} has schema version {}, expected {}",
        op.id, op.version, SCHEMA_VERSION
      ),
    });
  }

  Ok(ops)
}

fn sort(ops: &mut [PendingOperation]) {
  ops.sort_by(|a, b| {
    a.enqueued_at
      .cmp(&b.enqueued_at)
      .then_with(|| a.id.cmp(&b.id))
  });
}
