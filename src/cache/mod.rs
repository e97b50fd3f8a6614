//! Local cache of server data used as a read fallback while offline.
//!
//! - [`CacheStore`] keeps one JSON payload per caller-defined key with the
//!   time it was stored; entries older than their TTL are never returned
//!   and are purged by the read that finds them.
//! - [`CacheLayer`] wraps network reads: fresh data refreshes the store,
//!   failed or offline reads fall back to whatever the store still holds.

mod layer;
mod store;
mod traits;

pub use layer::CacheLayer;
pub use store::{CacheEntry, CachePolicy, CacheStore};
pub use traits::{CacheResult, CacheSource};
