//! Replays the pending queue against the server.
//!
//! [`SyncEngine`] owns the `Idle -> Syncing -> Done` state machine and
//! guarantees a single active replay pass. [`SyncScheduler`] turns
//! reconnects, manual requests and a poll interval into runs.

mod engine;
mod reconcile;
mod scheduler;
mod types;

pub use engine::SyncEngine;
pub use reconcile::CacheKeys;
pub use scheduler::SyncScheduler;
pub use types::{SyncResult, SyncState};

pub(crate) use reconcile::{apply_confirmed, apply_optimistic};
