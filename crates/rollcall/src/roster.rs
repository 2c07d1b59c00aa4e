//! Roster loading.
//!
//! The roster is a plain text file with one peer hostname per line. Blank
//! lines and `#` comments are skipped.

use rollcall_common::constants::ROSTER_COMMENT_PREFIX;
use rollcall_common::{Peer, PeerId, RollcallError, hosts_match};
use std::path::Path;

/// Parse roster text into hostnames, keeping file order and dropping repeats.
///
/// Two lines naming the same host under [`hosts_match`] count once; the
/// first spelling wins.
pub fn parse_roster(text: &str) -> Vec<PeerId> {
    dedupe_hosts(
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with(ROSTER_COMMENT_PREFIX))
            .map(str::to_string),
    )
}

fn dedupe_hosts(hosts: impl IntoIterator<Item = PeerId>) -> Vec<PeerId> {
    let mut unique: Vec<PeerId> = Vec::new();
    for host in hosts {
        if !unique.iter().any(|h| hosts_match(h, &host)) {
            unique.push(host);
        }
    }
    unique
}

/// Read and parse a roster file
pub async fn load_roster(path: &Path) -> Result<Vec<PeerId>, RollcallError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RollcallError::Roster(format!("{}: {}", path.display(), e)))?;
    Ok(parse_roster(&text))
}

/// Peer set for this node: the roster minus every entry naming `local`
#[derive(Debug, Clone)]
pub struct PeerSet {
    pub peers: Vec<Peer>,
    /// Whether the local node appeared in the roster at all
    pub self_listed: bool,
}

impl PeerSet {
    pub fn build(roster: Vec<PeerId>, local: &str, port: u16) -> Self {
        let (own, others): (Vec<_>, Vec<_>) = dedupe_hosts(roster)
            .into_iter()
            .partition(|host| hosts_match(host, local));

        Self {
            peers: others.into_iter().map(|id| Peer::on_port(id, port)).collect(),
            self_listed: !own.is_empty(),
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        self.peers.iter().map(|p| p.id.as_str()).collect()
    }
}
