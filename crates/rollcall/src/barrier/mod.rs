//! Readiness barrier.
//!
//! Implements:
//! - Peer registry (roster entries and resolved addresses)
//! - Heartbeat sender and listener (UDP)
//! - Quorum tracking
//! - Deadline supervision

mod listener;
mod registry;
mod sender;
mod supervisor;
mod tracker;

pub use registry::PeerRegistry;
pub use supervisor::{BarrierConfig, Supervisor};
