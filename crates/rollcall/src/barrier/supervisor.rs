//! Run supervision.
//!
//! Binds both sockets, starts the sender, listener and tracker under one
//! shutdown channel, and tears them down when the deadline expires. The
//! deadline is local to this node and does not depend on quorum progress.

use anyhow::{Context, Result};
use rollcall_common::constants::{
    DEADLINE_SECS, DEFAULT_BIND_ADDR, DEFAULT_PORT, HEARTBEAT_MARKER, SEND_INTERVAL_SECS,
};
use rollcall_common::{BarrierOutcome, BarrierPhase};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

use super::listener::HeartbeatListener;
use super::registry::PeerRegistry;
use super::sender::{HeartbeatSender, sender_bind_addr};
use super::tracker::QuorumTracker;

/// Runtime settings for one barrier run
#[derive(Clone, Debug)]
pub struct BarrierConfig {
    /// Listen address for heartbeats (e.g., "0.0.0.0:8000")
    pub bind_addr: String,
    /// Heartbeat payload
    pub marker: String,
    /// Heartbeat period
    pub send_interval: Duration,
    /// Total run time
    pub deadline: Duration,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("{}:{}", DEFAULT_BIND_ADDR, DEFAULT_PORT),
            marker: HEARTBEAT_MARKER.to_string(),
            send_interval: Duration::from_secs(SEND_INTERVAL_SECS),
            deadline: Duration::from_secs(DEADLINE_SECS),
        }
    }
}

/// Owns the deadline and the lifetime of every barrier task
pub struct Supervisor {
    config: BarrierConfig,
    registry: Arc<PeerRegistry>,
    phase_tx: watch::Sender<BarrierPhase>,
}

impl Supervisor {
    pub fn new(config: BarrierConfig, registry: Arc<PeerRegistry>) -> Self {
        let (phase_tx, _) = watch::channel(BarrierPhase::Waiting);
        Self {
            config,
            registry,
            phase_tx,
        }
    }

    /// Watch the barrier phase while the run is in progress
    #[allow(dead_code)]
    pub fn subscribe(&self) -> watch::Receiver<BarrierPhase> {
        self.phase_tx.subscribe()
    }

    /// Run until the deadline and report what was reached
    pub async fn run(self) -> Result<BarrierOutcome> {
        let listener = HeartbeatListener::bind(
            &self.config.bind_addr,
            self.registry.clone(),
            self.config.marker.clone(),
        )
        .await
        .context("Failed to bind heartbeat listener")?;

        let sender = HeartbeatSender::bind(
            sender_bind_addr(&self.config.bind_addr),
            self.registry.clone(),
            self.config.marker.clone(),
            self.config.send_interval,
        )
        .await
        .context("Failed to bind heartbeat sender")?;

        // The peer set is fixed for the run
        let expected = self.registry.peer_ids().await;
        let tracker = QuorumTracker::new(expected);

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        // Unbounded: the listener must never block on or drop a valid heartbeat
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let tracker_task = tokio::spawn(tracker.run(
            event_rx,
            self.phase_tx.clone(),
            shutdown_tx.subscribe(),
        ));
        let listener_task = tokio::spawn(listener.run(event_tx, shutdown_tx.subscribe()));
        let sender_shutdown = shutdown_tx.subscribe();
        let sender_task = tokio::spawn(async move { sender.run(sender_shutdown).await });

        let peer_count = self.registry.len().await;
        tracing::info!(
            deadline = ?self.config.deadline,
            peers = peer_count,
            "⏳ Barrier started"
        );

        tokio::time::sleep(self.config.deadline).await;
        tracing::info!("Deadline reached, shutting down...");
        let _ = shutdown_tx.send(());

        sender_task.await.context("Heartbeat sender task failed")?;
        listener_task.await.context("Heartbeat listener task failed")?;
        let tracker = tracker_task.await.context("Quorum tracker task failed")?;

        let outcome = tracker.outcome();
        if outcome.is_ready() {
            tracing::info!(peers = outcome.observed.len(), "✅ Barrier run complete");
        } else {
            tracing::warn!(
                seen = outcome.observed.len(),
                expected = tracker.expected_count(),
                missing = ?outcome.missing,
                "Total timeout reached without hearing from every peer"
            );
        }

        Ok(outcome)
    }
}
