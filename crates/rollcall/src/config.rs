//! Configuration management for Rollcall.

use anyhow::{Context, Result};
use rollcall_common::RollcallError;
use rollcall_common::constants::{
    DEADLINE_SECS, DEFAULT_BIND_ADDR, DEFAULT_PORT, HEARTBEAT_MARKER, SEND_INTERVAL_SECS,
};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::barrier::BarrierConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Roster file path
    #[serde(default)]
    pub roster_path: Option<String>,

    /// This node's roster name (defaults to the OS hostname)
    #[serde(default)]
    pub node_name: Option<String>,

    /// Heartbeat listen address (without port)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Well-known heartbeat port, shared by every node
    #[serde(default = "default_port")]
    pub port: u16,

    /// Heartbeat payload
    #[serde(default = "default_marker")]
    pub heartbeat_marker: String,

    /// Heartbeat period in seconds
    #[serde(default = "default_send_interval")]
    pub send_interval_secs: u64,

    /// Total run time in seconds
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,

    /// Exit non-zero if the deadline passes before READY
    #[serde(default)]
    pub fail_on_timeout: bool,
}

// Default value functions
fn default_bind_addr() -> String { DEFAULT_BIND_ADDR.to_string() }
fn default_port() -> u16 { DEFAULT_PORT }
fn default_marker() -> String { HEARTBEAT_MARKER.to_string() }
fn default_send_interval() -> u64 { SEND_INTERVAL_SECS }
fn default_deadline() -> u64 { DEADLINE_SECS }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            // Use defaults if config file doesn't exist
            tracing::debug!(path = %config_path, "Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref hosts) = args.hosts {
            config.roster_path = Some(hosts.clone());
        }
        if let Some(ref name) = args.node_name {
            config.node_name = Some(name.clone());
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), RollcallError> {
        if self.heartbeat_marker.is_empty() {
            return Err(RollcallError::Config("heartbeat_marker must not be empty".into()));
        }
        if self.send_interval_secs == 0 {
            return Err(RollcallError::Config("send_interval_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// Roster path, which every run needs
    pub fn roster_path(&self) -> Result<&Path, RollcallError> {
        self.roster_path.as_deref().map(Path::new).ok_or_else(|| {
            RollcallError::Config(
                "Hosts file not provided. Use -h to specify the hosts file.".into(),
            )
        })
    }

    /// This node's name: configured, or the OS hostname
    pub fn node_name(&self) -> Result<String, RollcallError> {
        if let Some(ref name) = self.node_name {
            return Ok(name.clone());
        }
        hostname::get()
            .map_err(|e| RollcallError::Hostname(e.to_string()))?
            .into_string()
            .map_err(|raw| RollcallError::Hostname(format!("not valid UTF-8: {:?}", raw)))
    }

    /// Full listen address; IPv6 literals get brackets
    pub fn listen_addr(&self) -> String {
        match self.bind_addr.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", self.bind_addr, self.port),
        }
    }

    /// Runtime settings for the barrier
    pub fn barrier(&self) -> BarrierConfig {
        BarrierConfig {
            bind_addr: self.listen_addr(),
            marker: self.heartbeat_marker.clone(),
            send_interval: Duration::from_secs(self.send_interval_secs),
            deadline: Duration::from_secs(self.deadline_secs),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            roster_path: None,
            node_name: None,
            bind_addr: default_bind_addr(),
            port: default_port(),
            heartbeat_marker: default_marker(),
            send_interval_secs: default_send_interval(),
            deadline_secs: default_deadline(),
            fail_on_timeout: false,
        }
    }
}
