//! Durable log of mutating operations waiting to reach the server.
//!
//! Operations are stored as one JSON array under
//! [`QUEUE_KEY`](pending::QUEUE_KEY) and rewritten on every enqueue and
//! removal, so a crash between two calls never loses an acknowledged
//! operation.

mod operation;
mod pending;

pub use operation::{OperationBody, OperationKind, PendingOperation, SCHEMA_VERSION};
pub use pending::{PendingQueue, QUEUE_KEY};
