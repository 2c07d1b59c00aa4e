//! Heartbeat datagram format.
//!
//! A heartbeat is the bare ASCII marker with no header, version field or
//! trailing newline. Anything else on the port is noise.

/// Encode a heartbeat for the given marker
pub fn encode(marker: &str) -> &[u8] {
    marker.as_bytes()
}

/// True if `payload` is exactly the heartbeat marker
pub fn is_heartbeat(payload: &[u8], marker: &str) -> bool {
    payload == marker.as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HEARTBEAT_MARKER;

    #[test]
    fn test_exact_marker_is_heartbeat() {
        assert!(is_heartbeat(b"HEARTBEAT", HEARTBEAT_MARKER));
        assert!(is_heartbeat(encode(HEARTBEAT_MARKER), HEARTBEAT_MARKER));
    }

    #[test]
    fn test_near_misses_are_rejected() {
        assert!(!is_heartbeat(b"GARBAGE", HEARTBEAT_MARKER));
        assert!(!is_heartbeat(b"HEARTBEAT\n", HEARTBEAT_MARKER));
        assert!(!is_heartbeat(b"heartbeat", HEARTBEAT_MARKER));
        assert!(!is_heartbeat(b"HEARTBEAT_ACK", HEARTBEAT_MARKER));
        assert!(!is_heartbeat(b"", HEARTBEAT_MARKER));
    }
}
