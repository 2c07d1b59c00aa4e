//! # Rollcall - cluster startup barrier
//!
//! Every node announces itself to every peer in the roster over UDP and
//! logs `READY` once it has heard back from all of them. There is no
//! coordinator: each node decides on its own, bounded by a local deadline.
//!
//! ## Architecture
//! ```text
//! Sender ──HEARTBEAT──▶ peers          peers ──HEARTBEAT──▶ Listener
//!   ▲                                                          │ PeerSeen
//!   └──── PeerRegistry ◀── resolved addresses                  ▼
//!                                                        QuorumTracker ──▶ READY
//!             Supervisor (deadline) ── shutdown ──▶ all tasks
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod barrier;
mod config;
mod roster;

use barrier::{PeerRegistry, Supervisor};
use config::AppConfig;
use roster::PeerSet;

/// Rollcall - wait until every peer in the roster is up
#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(author, version, about, long_about = None)]
#[command(disable_help_flag = true)]
struct Args {
    /// Hosts (roster) file, one peer hostname per line
    #[arg(short = 'h', long = "hosts", env = "ROLLCALL_HOSTS")]
    hosts: Option<String>,

    /// Enable verbose per-event logging
    #[arg(short, long)]
    debug: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "config/rollcall.toml")]
    config: String,

    /// Name of this node as it appears in the roster (defaults to the hostname)
    #[arg(long, env = "ROLLCALL_NODE_NAME")]
    node_name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up env-backed flags from .env, if present
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let level = if args.debug { "debug" } else { args.log_level.as_str() };
    init_logging(level, args.json_logs)?;

    info!("🔔 Starting Rollcall v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;

    let node_name = config.node_name().context("Error getting hostname")?;
    let roster_path = config.roster_path()?;
    let roster = roster::load_roster(roster_path)
        .await
        .context("Error reading hosts file")?;

    let peer_set = PeerSet::build(roster, &node_name, config.port);
    if !peer_set.self_listed {
        warn!(hostname = %node_name, "Current host not found in hosts file");
    }
    debug!(hostname = %node_name, "My hostname");
    debug!(peers = ?peer_set.ids(), "Expecting heartbeats from");

    let registry = Arc::new(PeerRegistry::from_peers(peer_set.peers));
    let supervisor = Supervisor::new(config.barrier(), registry);
    let outcome = supervisor.run().await?;

    if !outcome.is_ready() && config.fail_on_timeout {
        anyhow::bail!(
            "Deadline expired before every peer was heard from (missing: {})",
            outcome.missing.join(", ")
        );
    }

    info!("👋 Rollcall shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
