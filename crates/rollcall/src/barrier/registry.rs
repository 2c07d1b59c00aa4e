//! Peer directory shared by the sender, listener and startup code.
//!
//! Reads hand out copies, never a live view. Besides the roster entries the
//! registry keeps an index from resolved IP address to peer id, filled in by
//! the sender as it resolves addresses, which the listener uses to tell who a
//! datagram came from.

use rollcall_common::{Peer, PeerId};
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Directory {
    peers: HashMap<PeerId, Peer>,
    by_ip: HashMap<IpAddr, PeerId>,
    /// (ip, claimant) pairs already reported as owned by another peer
    contested: HashSet<(IpAddr, PeerId)>,
}

impl Directory {
    fn forget_addresses(&mut self, id: &str) {
        let freed: HashSet<IpAddr> = self
            .by_ip
            .iter()
            .filter(|(_, owner)| owner.as_str() == id)
            .map(|(ip, _)| *ip)
            .collect();
        self.by_ip.retain(|ip, _| !freed.contains(ip));
        self.contested
            .retain(|(ip, claimant)| claimant != id && !freed.contains(ip));
    }

    fn owned_by(&self, id: &str) -> HashSet<IpAddr> {
        self.by_ip
            .iter()
            .filter(|(_, owner)| owner.as_str() == id)
            .map(|(ip, _)| *ip)
            .collect()
    }

    /// True when recording `wanted` for `id` would leave the index as it is
    fn settled(&self, id: &str, wanted: &HashSet<IpAddr>) -> bool {
        let current = self.owned_by(id);
        current.is_subset(wanted)
            && wanted.iter().all(|ip| {
                current.contains(ip) || self.contested.contains(&(*ip, id.to_string()))
            })
    }
}

/// Thread-safe registry of expected peers
#[derive(Debug, Default)]
pub struct PeerRegistry {
    inner: RwLock<Directory>,
}

impl PeerRegistry {
    /// Create a registry pre-filled with peers (later duplicates win)
    pub fn from_peers(peers: impl IntoIterator<Item = Peer>) -> Self {
        let peers = peers.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            inner: RwLock::new(Directory {
                peers,
                ..Default::default()
            }),
        }
    }

    /// Register a peer, replacing any previous entry with the same id
    #[allow(dead_code)]
    pub async fn add_peer(&self, id: impl Into<PeerId>, address: impl Into<String>) {
        let peer = Peer::new(id, address);
        let mut dir = self.inner.write().await;
        let moved = dir
            .peers
            .get(&peer.id)
            .is_some_and(|old| old.address != peer.address);
        if moved {
            dir.forget_addresses(&peer.id);
        }
        tracing::debug!(peer = %peer.id, address = %peer.address, "Peer registered");
        dir.peers.insert(peer.id.clone(), peer);
    }

    /// Remove a peer and its resolved addresses
    #[allow(dead_code)]
    pub async fn remove_peer(&self, id: &str) -> Option<Peer> {
        let mut dir = self.inner.write().await;
        let removed = dir.peers.remove(id);
        if removed.is_some() {
            dir.forget_addresses(id);
            tracing::debug!(peer = %id, "Peer removed");
        }
        removed
    }

    /// Snapshot of all peers, in no particular order
    pub async fn list_peers(&self) -> Vec<Peer> {
        self.inner.read().await.peers.values().cloned().collect()
    }

    /// Look up a peer by id
    #[allow(dead_code)]
    pub async fn lookup(&self, id: &str) -> Option<Peer> {
        self.inner.read().await.peers.get(id).cloned()
    }

    /// Snapshot of registered ids
    pub async fn peer_ids(&self) -> HashSet<PeerId> {
        self.inner.read().await.peers.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.peers.len()
    }

    /// Record the addresses a peer's hostname currently resolves to.
    ///
    /// Returns true if the index changed. An address already owned by another
    /// peer stays with its owner; the clash is logged once. The write lock is
    /// only taken when something differs, so steady-state ticks stay on the
    /// read path.
    pub async fn record_addresses(&self, id: &str, ips: &[IpAddr]) -> bool {
        let wanted: HashSet<IpAddr> = ips.iter().map(|ip| ip.to_canonical()).collect();

        {
            let dir = self.inner.read().await;
            if !dir.peers.contains_key(id) || dir.settled(id, &wanted) {
                return false;
            }
        }

        let mut dir = self.inner.write().await;
        // Removed while we waited for the write lock
        if !dir.peers.contains_key(id) {
            return false;
        }

        let mut changed = false;
        for ip in dir.owned_by(id) {
            if !wanted.contains(&ip) {
                dir.by_ip.remove(&ip);
                changed = true;
            }
        }

        for ip in wanted {
            match dir.by_ip.get(&ip) {
                Some(owner) if owner == id => {}
                Some(owner) => {
                    let owner = owner.clone();
                    if dir.contested.insert((ip, id.to_string())) {
                        tracing::warn!(
                            ip = %ip,
                            owner = %owner,
                            peer = %id,
                            "Address already belongs to another peer, ignoring it for this one"
                        );
                    }
                }
                None => {
                    dir.by_ip.insert(ip, id.to_string());
                    changed = true;
                }
            }
        }
        changed
    }

    /// Map a datagram source to the peer it belongs to
    pub async fn identify(&self, source: SocketAddr) -> Option<PeerId> {
        let ip = source.ip().to_canonical();
        self.inner.read().await.by_ip.get(&ip).cloned()
    }
}
