//! # Rollcall Common
//!
//! Shared types, errors, and protocol definitions used across Rollcall components.
//!
//! ## Modules
//! - `types` - Core data structures (Peer, PeerSeen, BarrierPhase, etc.)
//! - `error` - Common error types
//! - `constants` - Protocol defaults
//! - `wire` - Heartbeat datagram format

pub mod constants;
pub mod error;
pub mod types;
pub mod wire;

pub use error::RollcallError;
pub use types::*;
