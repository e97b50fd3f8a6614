//! Offline-first data access for intermittently connected clients.
//!
//! Reads go through a TTL cache that keeps answering while the server is
//! unreachable; writes made offline land in a durable queue that the sync
//! engine replays, in order, once connectivity returns.

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod favorites;
pub mod queue;
pub mod remote;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod testing;

pub use client::{Background, OfflineClient, Submission};
pub use error::{Error, Result};
pub use favorites::{Favorites, FavoritesMode};
pub use queue::{OperationKind, PendingOperation};
pub use sync::{SyncResult, SyncState};
