//! Heartbeat listener.
//!
//! Owns the well-known port. Valid heartbeats from registered peers become
//! [`PeerSeen`] events on the tracker queue; everything else is dropped.

use rollcall_common::constants::RECV_BUFFER_LEN;
use rollcall_common::{PeerSeen, RollcallError, wire};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedSender;

use super::registry::PeerRegistry;

/// Receives heartbeats and turns them into peer-seen events
#[derive(Debug)]
pub struct HeartbeatListener {
    socket: UdpSocket,
    registry: Arc<PeerRegistry>,
    marker: String,
}

impl HeartbeatListener {
    /// Bind the listening socket. Failure here is fatal to the run.
    pub async fn bind(
        addr: &str,
        registry: Arc<PeerRegistry>,
        marker: String,
    ) -> Result<Self, RollcallError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| RollcallError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            socket,
            registry,
            marker,
        })
    }

    #[allow(dead_code)]
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive loop. Runs until shutdown or until the tracker goes away.
    pub async fn run(
        self,
        events: UnboundedSender<PeerSeen>,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) {
        let mut buf = vec![0u8; RECV_BUFFER_LEN];

        tracing::info!(
            addr = ?self.socket.local_addr().ok(),
            "👂 Heartbeat listener started"
        );

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, source)) => {
                            let Some(event) = self.handle_datagram(&buf[..len], source).await else {
                                continue;
                            };
                            tracing::debug!(peer = %event.peer, source = %source, "Received heartbeat");
                            if events.send(event).is_err() {
                                tracing::debug!("Tracker queue closed, listener stopping");
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %RollcallError::Receive(e), "Heartbeat receive error");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("👂 Heartbeat listener shutting down");
                    break;
                }
            }
        }
    }

    /// Validate one datagram and identify its sender
    pub async fn handle_datagram(&self, data: &[u8], source: SocketAddr) -> Option<PeerSeen> {
        if !wire::is_heartbeat(data, &self.marker) {
            return None;
        }

        match self.registry.identify(source).await {
            Some(peer) => Some(PeerSeen { peer, source }),
            None => {
                tracing::debug!(source = %source, "Heartbeat from unregistered source");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_common::Peer;
    use rollcall_common::constants::HEARTBEAT_MARKER;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn loopback(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, last))
    }

    async fn registry_with_n2() -> Arc<PeerRegistry> {
        let registry = Arc::new(PeerRegistry::from_peers([Peer::on_port("n2", 8000)]));
        registry.record_addresses("n2", &[loopback(2)]).await;
        registry
    }

    async fn listener(registry: Arc<PeerRegistry>) -> HeartbeatListener {
        HeartbeatListener::bind("127.0.0.1:0", registry, HEARTBEAT_MARKER.to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_heartbeat_from_registered_peer() {
        let listener = listener(registry_with_n2().await).await;
        let source = SocketAddr::new(loopback(2), 50000);

        let event = listener.handle_datagram(b"HEARTBEAT", source).await;
        assert_eq!(
            event,
            Some(PeerSeen {
                peer: "n2".to_string(),
                source
            })
        );
    }

    #[tokio::test]
    async fn test_garbage_is_discarded() {
        let listener = listener(registry_with_n2().await).await;
        let source = SocketAddr::new(loopback(2), 50000);

        assert!(listener.handle_datagram(b"GARBAGE", source).await.is_none());
        assert!(listener.handle_datagram(b"", source).await.is_none());
    }

    #[tokio::test]
    async fn test_unregistered_source_is_discarded() {
        let listener = listener(registry_with_n2().await).await;
        let stranger = SocketAddr::new(loopback(9), 50000);

        assert!(listener.handle_datagram(b"HEARTBEAT", stranger).await.is_none());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let registry = registry_with_n2().await;
        let first = listener(registry.clone()).await;
        let taken = first.local_addr().unwrap().to_string();

        let second =
            HeartbeatListener::bind(&taken, registry, HEARTBEAT_MARKER.to_string()).await;
        let err = tokio_test::assert_err!(second);
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_run_forwards_over_the_wire() {
        let listener = listener(registry_with_n2().await).await;
        let addr = listener.local_addr().unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
        let task = tokio::spawn(listener.run(tx, shutdown_rx));

        // 127.0.0.2 stands in for the n2 host
        let n2 = UdpSocket::bind((loopback(2), 0)).await.unwrap();
        n2.send_to(b"GARBAGE", addr).await.unwrap();
        n2.send_to(b"HEARTBEAT", addr).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no event")
            .unwrap();
        assert_eq!(event.peer, "n2");
        assert_eq!(event.source, n2.local_addr().unwrap());
        assert!(rx.try_recv().is_err());

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("listener did not stop")
            .unwrap();
    }
}
