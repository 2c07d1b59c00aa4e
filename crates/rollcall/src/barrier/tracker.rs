//! Quorum tracking.
//!
//! A two-state machine, WAITING then READY. READY is terminal for the run and
//! is announced exactly once, both as a log line and on a watch channel.

use chrono::{DateTime, Utc};
use rollcall_common::constants::READY_LINE;
use rollcall_common::{BarrierOutcome, BarrierPhase, PeerId, PeerSeen};
use std::collections::HashSet;
use tokio::sync::{mpsc, watch};

/// What a single peer-seen event did to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Not one of the expected peers
    Unexpected,
    /// Already heard from this peer
    Duplicate,
    /// First heartbeat from this peer, quorum not yet reached
    Recorded,
    /// First heartbeat from this peer, and it completed the quorum
    Completed,
}

/// Tracks which expected peers have been heard from
#[derive(Debug)]
pub struct QuorumTracker {
    expected: HashSet<PeerId>,
    seen: HashSet<PeerId>,
    phase: BarrierPhase,
    ready_at: Option<DateTime<Utc>>,
}

impl QuorumTracker {
    pub fn new(expected: impl IntoIterator<Item = PeerId>) -> Self {
        Self {
            expected: expected.into_iter().collect(),
            seen: HashSet::new(),
            phase: BarrierPhase::Waiting,
            ready_at: None,
        }
    }

    /// Check the barrier before any event arrives.
    ///
    /// An empty peer set is already complete, so a lone node goes READY here.
    /// Returns true if this call made the transition.
    pub fn start(&mut self) -> bool {
        if self.expected.is_empty() && !self.phase.is_ready() {
            tracing::warn!("No peers to wait for, barrier is trivially complete");
            self.fire_ready();
            return true;
        }
        false
    }

    /// Record a heartbeat from `peer`
    pub fn observe(&mut self, peer: &str) -> Observation {
        if !self.expected.contains(peer) {
            return Observation::Unexpected;
        }
        if !self.seen.insert(peer.to_string()) {
            return Observation::Duplicate;
        }

        tracing::debug!(
            peer = %peer,
            seen = self.seen.len(),
            expected = self.expected.len(),
            "Peer is up"
        );

        if !self.phase.is_ready() && self.seen.len() == self.expected.len() {
            self.fire_ready();
            Observation::Completed
        } else {
            Observation::Recorded
        }
    }

    fn fire_ready(&mut self) {
        self.phase = BarrierPhase::Ready;
        self.ready_at = Some(Utc::now());
        tracing::info!("{}", READY_LINE);
    }

    #[allow(dead_code)]
    pub fn phase(&self) -> BarrierPhase {
        self.phase
    }

    #[allow(dead_code)]
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn expected_count(&self) -> usize {
        self.expected.len()
    }

    /// Expected peers not yet heard from (sorted)
    pub fn missing(&self) -> Vec<PeerId> {
        let mut missing: Vec<_> = self.expected.difference(&self.seen).cloned().collect();
        missing.sort();
        missing
    }

    /// Final report for the run
    pub fn outcome(&self) -> BarrierOutcome {
        let mut observed: Vec<_> = self.seen.iter().cloned().collect();
        observed.sort();
        BarrierOutcome {
            phase: self.phase,
            observed,
            missing: self.missing(),
            ready_at: self.ready_at,
        }
    }

    /// Consume events until shutdown, publishing the phase on `phase_tx`.
    ///
    /// Returns the tracker so the caller can read the final state.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<PeerSeen>,
        phase_tx: watch::Sender<BarrierPhase>,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> Self {
        if self.start() {
            publish(&phase_tx, self.phase);
        }

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    if self.observe(&event.peer) == Observation::Completed {
                        publish(&phase_tx, self.phase);
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!(
                        seen = self.seen.len(),
                        expected = self.expected.len(),
                        "Quorum tracker stopping"
                    );
                    break;
                }
            }
        }

        self
    }
}

fn publish(phase_tx: &watch::Sender<BarrierPhase>, phase: BarrierPhase) {
    phase_tx.send_if_modified(|current| {
        if *current == phase {
            return false;
        }
        *current = phase;
        true
    });
}
