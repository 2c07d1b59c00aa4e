//! Heartbeat sender.
//!
//! Every tick sends one marker datagram to each registered peer. Delivery is
//! fire-and-forget: a lost heartbeat is covered by the next tick.

use rollcall_common::{Peer, RollcallError, wire};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;

use super::registry::PeerRegistry;

/// Outbound address for a node listening on `listen`.
///
/// The sender uses the listener's address family so an IPv6 deployment also
/// sends over IPv6. Anything that is not an IPv6 socket address gets IPv4.
pub fn sender_bind_addr(listen: &str) -> SocketAddr {
    match listen.parse::<SocketAddr>() {
        Ok(addr) if addr.is_ipv6() => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        _ => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
    }
}

/// Choose the resolved address to send to from a socket of the given family.
///
/// An IPv6 socket prefers an IPv6 result and reaches IPv4-only peers through
/// a mapped address. An IPv4 socket can only use IPv4 results.
pub fn pick_target(addrs: &[SocketAddr], ipv6: bool) -> Option<SocketAddr> {
    let v4 = addrs.iter().find(|a| a.is_ipv4()).copied();
    if !ipv6 {
        return v4;
    }
    addrs.iter().find(|a| a.is_ipv6()).copied().or_else(|| {
        v4.map(|a| match a.ip() {
            IpAddr::V4(ip) => SocketAddr::new(IpAddr::V6(ip.to_ipv6_mapped()), a.port()),
            IpAddr::V6(_) => a,
        })
    })
}

/// Periodic heartbeat broadcaster
#[derive(Debug)]
pub struct HeartbeatSender {
    /// Outbound socket (ephemeral port)
    socket: UdpSocket,
    /// Whether the socket is IPv6
    ipv6: bool,
    /// Where to send
    registry: Arc<PeerRegistry>,
    /// Heartbeat payload
    marker: String,
    /// Tick period
    interval: Duration,
}

impl HeartbeatSender {
    /// Bind the outbound socket, usually on [`sender_bind_addr`]
    pub async fn bind(
        addr: SocketAddr,
        registry: Arc<PeerRegistry>,
        marker: String,
        interval: Duration,
    ) -> Result<Self, RollcallError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| RollcallError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            socket,
            ipv6: addr.is_ipv6(),
            registry,
            marker,
            interval,
        })
    }

    /// Run until shutdown. The first tick fires immediately.
    pub async fn run(&self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval = ?self.interval, "📣 Heartbeat sender started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("📣 Heartbeat sender shutting down");
                    break;
                }
            }
        }
    }

    /// Send one heartbeat to every registered peer. Returns how many were sent.
    pub async fn tick(&self) -> usize {
        let peers = self.registry.list_peers().await;
        let mut sent = 0;

        for peer in &peers {
            match self.beat(peer).await {
                Ok(addr) => {
                    sent += 1;
                    tracing::debug!(peer = %peer.id, addr = %addr, "Sent heartbeat");
                }
                Err(e) => {
                    tracing::warn!(peer = %peer.id, error = %e, "Failed to send heartbeat");
                }
            }
        }

        sent
    }

    async fn beat(&self, peer: &Peer) -> Result<SocketAddr, RollcallError> {
        let target = self.resolve(peer).await?;
        self.socket
            .send_to(wire::encode(&self.marker), target)
            .await
            .map_err(|source| RollcallError::Send {
                peer: peer.id.clone(),
                source,
            })?;
        Ok(target)
    }

    /// Resolve a peer's address and record what it resolved to.
    ///
    /// Resolution runs every tick so a peer whose DNS entry appears late (or
    /// moves) is picked up without a restart.
    async fn resolve(&self, peer: &Peer) -> Result<SocketAddr, RollcallError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(peer.address.as_str())
            .await
            .map_err(|e| RollcallError::Resolve {
                peer: peer.id.clone(),
                reason: e.to_string(),
            })?
            .collect();

        let ips: Vec<_> = addrs.iter().map(|a| a.ip()).collect();
        if self.registry.record_addresses(&peer.id, &ips).await {
            tracing::debug!(peer = %peer.id, addrs = ?ips, "Peer address resolved");
        }

        pick_target(&addrs, self.ipv6).ok_or_else(|| RollcallError::Resolve {
            peer: peer.id.clone(),
            reason: if addrs.is_empty() {
                "no addresses".to_string()
            } else {
                "no IPv4 address".to_string()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_common::constants::HEARTBEAT_MARKER;

    async fn fake_peer() -> (UdpSocket, String) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        (socket, addr)
    }

    async fn recv_text(socket: &UdpSocket) -> String {
        let mut buf = [0u8; 64];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("no heartbeat arrived")
            .unwrap();
        String::from_utf8_lossy(&buf[..len]).to_string()
    }

    #[tokio::test]
    async fn test_tick_sends_marker_to_each_peer() {
        let (peer_a, addr_a) = fake_peer().await;
        let (peer_b, addr_b) = fake_peer().await;
        let registry = Arc::new(PeerRegistry::default());
        registry.add_peer("n2", addr_a).await;
        registry.add_peer("n3", addr_b).await;

        let sender = HeartbeatSender::bind(
            sender_bind_addr("0.0.0.0:8000"),
            registry.clone(),
            HEARTBEAT_MARKER.to_string(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(sender.tick().await, 2);
        assert_eq!(recv_text(&peer_a).await, HEARTBEAT_MARKER);
        assert_eq!(recv_text(&peer_b).await, HEARTBEAT_MARKER);
    }

    #[tokio::test]
    async fn test_tick_records_resolved_addresses() {
        let (_peer, addr) = fake_peer().await;
        let registry = Arc::new(PeerRegistry::default());
        registry.add_peer("n2", addr).await;

        let sender = HeartbeatSender::bind(
            sender_bind_addr("0.0.0.0:8000"),
            registry.clone(),
            HEARTBEAT_MARKER.to_string(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        sender.tick().await;

        let source = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);
        assert_eq!(registry.identify(source).await, Some("n2".to_string()));
    }

    #[tokio::test]
    async fn test_bad_peer_does_not_block_others() {
        let (good, addr) = fake_peer().await;
        let registry = Arc::new(PeerRegistry::default());
        registry.add_peer("broken", "not a socket address").await;
        registry.add_peer("n2", addr).await;

        let sender = HeartbeatSender::bind(
            sender_bind_addr("0.0.0.0:8000"),
            registry.clone(),
            HEARTBEAT_MARKER.to_string(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(sender.tick().await, 1);
        assert_eq!(recv_text(&good).await, HEARTBEAT_MARKER);
    }

    #[test]
    fn test_sender_follows_listener_family() {
        assert!(sender_bind_addr("0.0.0.0:8000").is_ipv4());
        assert!(sender_bind_addr("127.0.0.1:9000").is_ipv4());
        assert!(sender_bind_addr("[::]:8000").is_ipv6());
        assert!(sender_bind_addr("[fe80::1]:8000").is_ipv6());
        assert_eq!(sender_bind_addr("[::]:8000").port(), 0);
    }

    #[test]
    fn test_pick_target_by_family() {
        let v4: SocketAddr = "10.0.0.2:8000".parse().unwrap();
        let v6: SocketAddr = "[fd00::2]:8000".parse().unwrap();

        assert_eq!(pick_target(&[v6, v4], false), Some(v4));
        assert_eq!(pick_target(&[v6], false), None);
        assert_eq!(pick_target(&[v4, v6], true), Some(v6));

        let mapped: SocketAddr = "[::ffff:10.0.0.2]:8000".parse().unwrap();
        assert_eq!(pick_target(&[v4], true), Some(mapped));
        assert_eq!(pick_target(&[], true), None);
    }

    #[tokio::test]
    async fn test_ipv6_only_peer_is_skipped_on_ipv4_socket() {
        let (good, addr) = fake_peer().await;
        let registry = Arc::new(PeerRegistry::default());
        registry.add_peer("v6only", "[::1]:9").await;
        registry.add_peer("n2", addr).await;

        let sender = HeartbeatSender::bind(
            sender_bind_addr("0.0.0.0:8000"),
            registry,
            HEARTBEAT_MARKER.to_string(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(sender.tick().await, 1);
        assert_eq!(recv_text(&good).await, HEARTBEAT_MARKER);
    }

    #[tokio::test]
    async fn test_run_repeats_until_shutdown() {
        let (peer, addr) = fake_peer().await;
        let registry = Arc::new(PeerRegistry::default());
        registry.add_peer("n2", addr).await;

        let sender = HeartbeatSender::bind(
            sender_bind_addr("0.0.0.0:8000"),
            registry,
            HEARTBEAT_MARKER.to_string(),
            Duration::from_millis(20),
        )
        .await
        .unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
        let task = tokio::spawn(async move { sender.run(shutdown_rx).await });

        for _ in 0..3 {
            assert_eq!(recv_text(&peer).await, HEARTBEAT_MARKER);
        }

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("sender did not stop")
            .unwrap();
    }
}
