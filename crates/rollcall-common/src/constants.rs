//! Protocol defaults for Rollcall nodes.

/// Well-known UDP port every node listens on
pub const DEFAULT_PORT: u16 = 8000;

/// Default listen address for the heartbeat socket
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

/// Heartbeat payload
pub const HEARTBEAT_MARKER: &str = "HEARTBEAT";

/// Heartbeat send interval (seconds)
pub const SEND_INTERVAL_SECS: u64 = 5;

/// Process-wide deadline (seconds)
pub const DEADLINE_SECS: u64 = 60;

/// Receive buffer size; heartbeats are far smaller
pub const RECV_BUFFER_LEN: usize = 1024;

/// Roster line prefix marking a comment
pub const ROSTER_COMMENT_PREFIX: char = '#';

/// Log message emitted once when the barrier is reached
pub const READY_LINE: &str = "READY";
