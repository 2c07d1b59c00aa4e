//! Core types shared across Rollcall components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Peer identity as written in the roster (a hostname)
pub type PeerId = String;

/// A peer expected to take part in the barrier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// Roster identity
    pub id: PeerId,

    /// Transport address (host:port)
    pub address: String,
}

impl Peer {
    pub fn new(id: impl Into<PeerId>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }

    /// Build a peer whose address is its hostname on the given port
    pub fn on_port(id: impl Into<PeerId>, port: u16) -> Self {
        let id = id.into();
        let address = format!("{}:{}", id, port);
        Self { id, address }
    }
}

/// Compare two hostnames the way roster entries are matched.
///
/// ASCII case is ignored, and a short name matches the first label of a
/// fully-qualified one (`nodeA` matches `nodea.cluster.local`). Two
/// fully-qualified names must match in full.
pub fn hosts_match(a: &str, b: &str) -> bool {
    if a.eq_ignore_ascii_case(b) {
        return true;
    }

    let short = |name: &str| name.split('.').next().unwrap_or(name).to_string();
    match (a.contains('.'), b.contains('.')) {
        (false, true) => a.eq_ignore_ascii_case(&short(b)),
        (true, false) => short(a).eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// A valid heartbeat was received from a registered peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSeen {
    /// Registered identity the source address belongs to
    pub peer: PeerId,

    /// Transport-level source of the datagram
    pub source: SocketAddr,
}

/// Barrier state on this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarrierPhase {
    /// Still waiting to hear from at least one peer
    #[default]
    Waiting,
    /// Every peer has been heard from (terminal for the run)
    Ready,
}

impl BarrierPhase {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Final report of one barrier run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarrierOutcome {
    /// Phase when the run ended
    pub phase: BarrierPhase,

    /// Peers heard from (sorted)
    pub observed: Vec<PeerId>,

    /// Peers never heard from (sorted)
    pub missing: Vec<PeerId>,

    /// When READY was reached, if it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
}

impl BarrierOutcome {
    pub fn is_ready(&self) -> bool {
        self.phase.is_ready()
    }
}
