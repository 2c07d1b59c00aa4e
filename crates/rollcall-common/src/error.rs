//! Common error types for Rollcall components.

use thiserror::Error;

/// Common errors across Rollcall components
#[derive(Debug, Error)]
pub enum RollcallError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Roster file missing or unreadable
    #[error("Roster error: {0}")]
    Roster(String),

    /// Local hostname could not be determined
    #[error("Hostname error: {0}")]
    Hostname(String),

    /// Listening socket could not be bound
    #[error("Bind error on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Peer address could not be resolved
    #[error("Resolve error for {peer}: {reason}")]
    Resolve { peer: String, reason: String },

    /// Datagram could not be sent
    #[error("Send error to {peer}: {source}")]
    Send {
        peer: String,
        #[source]
        source: std::io::Error,
    },

    /// Datagram could not be received
    #[error("Receive error: {0}")]
    Receive(#[source] std::io::Error),
}

impl RollcallError {
    /// Returns true if this error ends the node's run.
    ///
    /// Transient network errors are logged by the loop that hit them and the
    /// next heartbeat tick stands in for a retry.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Resolve { .. } | Self::Send { .. } | Self::Receive(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_errors_are_transient() {
        let resolve = RollcallError::Resolve {
            peer: "n2".to_string(),
            reason: "no addresses".to_string(),
        };
        let recv = RollcallError::Receive(std::io::Error::other("reset"));
        assert!(!resolve.is_fatal());
        assert!(!recv.is_fatal());
    }

    #[test]
    fn test_bind_and_config_errors_are_fatal() {
        let bind = RollcallError::Bind {
            addr: "0.0.0.0:8000".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(bind.is_fatal());
        assert!(RollcallError::Roster("missing".to_string()).is_fatal());
        assert!(bind.to_string().starts_with("Bind error on 0.0.0.0:8000"));
    }
}
