use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

use crate::remote::{Method, RemoteRequest};

/// Current on-disk schema of [`PendingOperation`].
pub const SCHEMA_VERSION: u32 = 1;

/// What a queued operation does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
  Create,
  Update,
  Delete,
}

impl OperationKind {
  /// HTTP verb used when the operation is replayed.
  pub fn method(&self) -> Method {
    match self {
      OperationKind::Create => Method::Post,
      OperationKind::Update => Method::Put,
      OperationKind::Delete => Method::Delete,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      OperationKind::Create => "create",
      OperationKind::Update => "update",
      OperationKind::Delete => "delete",
    }
  }
}

impl std::fmt::Display for OperationKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OperationKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "create" | "post" => Ok(OperationKind::Create),
      "update" | "put" => Ok(OperationKind::Update),
      "delete" => Ok(OperationKind::Delete),
      other => Err(format!(
        "unknown operation kind '{}' (expected create, update or delete)",
        other
      )),
    }
  }
}

/// Kind-specific content. Deletes carry no payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OperationBody {
  Create {
    #[serde(default)]
    payload: Value,
  },
  Update {
    #[serde(default)]
    payload: Value,
  },
  Delete,
}

impl OperationBody {
  /// Build a body; a missing payload on create/update is stored as `null`
  /// and any payload given to a delete is dropped.
  pub fn new(kind: OperationKind, payload: Option<Value>) -> Self {
    match kind {
      OperationKind::Create => OperationBody::Create {
        payload: payload.unwrap_or(Value::Null),
      },
      OperationKind::Update => OperationBody::Update {
        payload: payload.unwrap_or(Value::Null),
      },
      OperationKind::Delete => OperationBody::Delete,
    }
  }

  pub fn kind(&self) -> OperationKind {
    match self {
      OperationBody::Create { .. } => OperationKind::Create,
      OperationBody::Update { .. } => OperationKind::Update,
      OperationBody::Delete => OperationKind::Delete,
    }
  }

  pub fn payload(&self) -> Option<&Value> {
    match self {
      OperationBody::Create { payload } | OperationBody::Update { payload } => Some(payload),
      OperationBody::Delete => None,
    }
  }
}

/// A mutating action waiting to be replayed against the server.
///
/// Never edited in place: a further change to the same target is a new
/// operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
  #[serde(rename = "v")]
  pub version: u32,
  pub id: String,
  #[serde(flatten)]
  pub body: OperationBody,
  /// Endpoint path the operation applies to (e.g. `/listings/42`)
  pub target: String,
  pub enqueued_at: DateTime<Utc>,
}

impl PendingOperation {
  pub fn new(
    kind: OperationKind,
    target: impl Into<String>,
    payload: Option<Value>,
    enqueued_at: DateTime<Utc>,
    seq: u64,
  ) -> Self {
    Self {
      version: SCHEMA_VERSION,
      id: generate_id(enqueued_at, seq),
      body: OperationBody::new(kind, payload),
      target: target.into(),
      enqueued_at,
    }
  }

  pub fn kind(&self) -> OperationKind {
    self.body.kind()
  }

  pub fn payload(&self) -> Option<&Value> {
    self.body.payload()
  }

  /// The call that replays this operation.
  pub fn to_request(&self) -> RemoteRequest {
    RemoteRequest {
      method: self.kind().method(),
      target: self.target.clone(),
      body: self.payload().cloned(),
    }
  }
}

/// `<millis>-<seq>-<random>`: zero-padded so ids sort like their creation
/// order, with a random tail so two writers never collide.
fn generate_id(at: DateTime<Utc>, seq: u64) -> String {
  let suffix = Uuid::new_v4().simple().to_string();
  format!(
    "{:013}-{:06}-{}",
    at.timestamp_millis(),
    seq % 1_000_000,
    &suffix[..8]
  )
}
