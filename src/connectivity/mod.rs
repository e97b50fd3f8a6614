//! Connectivity tracking.
//!
//! [`ConnectivityMonitor`] is a thin observer: something else (the
//! [`ReachabilityProbe`], or an embedding host with its own network events)
//! reports the transport state, and the monitor turns those reports into
//! transitions for its listeners.

mod monitor;
mod probe;

pub use monitor::{ConnectivityChange, ConnectivityMonitor, ConnectivityState};
pub use probe::ReachabilityProbe;
