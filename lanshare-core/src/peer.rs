use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A known peer, tagged by which discovery axis currently attests it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Peer {
    pub username: String,
    pub address: String,
    pub port: u16,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub broadcast_peer: bool,
    pub registry_peer: bool,
}

/// Authoritative in-memory set of known peers.
///
/// All mutators acquire the same lock `snapshot` reads under; the broadcast
/// liveness sweep happens lazily, inside `snapshot`, rather than on a timer
/// of its own.
pub struct PeerTable {
    username: String,
    peer_timeout: Duration,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    peers: HashMap<String, Peer>,
    last_seen_broadcast: HashMap<String, DateTime<Utc>>,
}

impl PeerTable {
    pub fn new(username: impl Into<String>, peer_timeout: Duration) -> Self {
        Self {
            username: username.into(),
            peer_timeout,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Record a broadcast attestation for `username`, creating the row if
    /// it doesn't exist. Self-attestations are ignored by the caller
    /// (the broadcast listener), not here.
    pub fn upsert_broadcast(&self, username: &str, address: &str, port: u16, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.last_seen_broadcast.insert(username.to_string(), now);
        let entry = inner
            .peers
            .entry(username.to_string())
            .or_insert_with(|| Peer {
                username: username.to_string(),
                address: address.to_string(),
                port,
                first_seen: now,
                last_seen: now,
                broadcast_peer: true,
                registry_peer: false,
            });
        entry.address = address.to_string();
        entry.port = port;
        entry.last_seen = now;
        entry.broadcast_peer = true;
    }

    /// Record a registry attestation for `username`.
    pub fn upsert_registry(&self, username: &str, address: &str, port: u16, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        let entry = inner
            .peers
            .entry(username.to_string())
            .or_insert_with(|| Peer {
                username: username.to_string(),
                address: address.to_string(),
                port,
                first_seen: now,
                last_seen: now,
                broadcast_peer: false,
                registry_peer: true,
            });
        entry.address = address.to_string();
        entry.port = port;
        entry.last_seen = now;
        entry.registry_peer = true;
    }

    /// Clear the registry axis for `username`; drops the row if the
    /// broadcast axis is also false.
    ///
    /// Returns `true` if the row existed and was removed as a result.
    pub fn mark_registry_gone(&self, username: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(peer) = inner.peers.get_mut(username) else {
            return false;
        };
        peer.registry_peer = false;
        if !peer.broadcast_peer {
            inner.peers.remove(username);
            inner.last_seen_broadcast.remove(username);
            return true;
        }
        false
    }

    /// Remove `username` unconditionally (used for explicit disconnection
    /// packets, per the broadcast-only departure rule).
    ///
    /// Returns `true` if a row was present and removed.
    pub fn remove(&self, username: &str) -> bool {
        let mut inner = self.inner.lock();
        inner.last_seen_broadcast.remove(username);
        inner.peers.remove(username).is_some()
    }

    /// Remove `username` only if its registry axis is already false
    /// (the disconnection-packet deletion rule, which must not clobber a
    /// peer still attested by the registry).
    ///
    /// Returns `true` if the row was removed.
    pub fn remove_if_broadcast_only(&self, username: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.peers.get(username) {
            Some(peer) if !peer.registry_peer => {
                inner.peers.remove(username);
                inner.last_seen_broadcast.remove(username);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, username: &str) -> bool {
        self.inner.lock().peers.contains_key(username)
    }

    pub fn get(&self, username: &str) -> Option<Peer> {
        self.inner.lock().peers.get(username).cloned()
    }

    /// Sweep the broadcast axis for staleness and return an independent
    /// copy of the resulting table. Rows where both axes end up false are
    /// removed and returned separately so the caller can trigger the
    /// Resource Catalog purge outside the lock.
    pub fn snapshot(&self, now: DateTime<Utc>) -> (HashMap<String, Peer>, Vec<String>) {
        let mut inner = self.inner.lock();
        let timeout = self.peer_timeout;
        let stale: Vec<String> = inner
            .last_seen_broadcast
            .iter()
            .filter(|(_, &seen)| {
                now.signed_duration_since(seen).to_std().unwrap_or_default() > timeout
            })
            .map(|(u, _)| u.clone())
            .collect();

        for username in &stale {
            if let Some(peer) = inner.peers.get_mut(username) {
                peer.broadcast_peer = false;
            }
        }

        let mut removed = Vec::new();
        inner.peers.retain(|username, peer| {
            if !peer.broadcast_peer && !peer.registry_peer {
                removed.push(username.clone());
                false
            } else {
                true
            }
        });
        for username in &removed {
            inner.last_seen_broadcast.remove(username);
        }

        (inner.peers.clone(), removed)
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn broadcast_upsert_creates_row() {
        let table = PeerTable::new("self#0000", StdDuration::from_millis(2000));
        table.upsert_broadcast("a#aaaa", "10.0.0.1", 12345, now());
        let peer = table.get("a#aaaa").unwrap();
        assert!(peer.broadcast_peer);
        assert!(!peer.registry_peer);
    }

    #[test]
    fn both_axes_set_merges_into_one_row() {
        let table = PeerTable::new("self#0000", StdDuration::from_millis(2000));
        let t0 = now();
        table.upsert_broadcast("a#aaaa", "10.0.0.1", 12345, t0);
        table.upsert_registry("a#aaaa", "10.0.0.1", 12345, t0);
        let peer = table.get("a#aaaa").unwrap();
        assert!(peer.broadcast_peer);
        assert!(peer.registry_peer);
    }

    #[test]
    fn registry_gone_alone_removes_row_when_broadcast_already_false() {
        let table = PeerTable::new("self#0000", StdDuration::from_millis(2000));
        table.upsert_registry("a#aaaa", "10.0.0.1", 12345, now());
        assert!(table.mark_registry_gone("a#aaaa"));
        assert!(!table.contains("a#aaaa"));
    }

    #[test]
    fn registry_gone_keeps_row_when_broadcast_still_true() {
        let table = PeerTable::new("self#0000", StdDuration::from_millis(2000));
        let t0 = now();
        table.upsert_broadcast("a#aaaa", "10.0.0.1", 12345, t0);
        table.upsert_registry("a#aaaa", "10.0.0.1", 12345, t0);
        assert!(!table.mark_registry_gone("a#aaaa"));
        let peer = table.get("a#aaaa").unwrap();
        assert!(peer.broadcast_peer);
        assert!(!peer.registry_peer);
    }

    #[test]
    fn snapshot_sweeps_stale_broadcast_only_peers() {
        let table = PeerTable::new("self#0000", StdDuration::from_millis(10));
        let t0 = now();
        table.upsert_broadcast("a#aaaa", "10.0.0.1", 12345, t0);
        let later = t0 + chrono::Duration::milliseconds(50);
        let (peers, removed) = table.snapshot(later);
        assert!(peers.is_empty());
        assert_eq!(removed, vec!["a#aaaa".to_string()]);
    }

    #[test]
    fn snapshot_keeps_registry_only_peers_regardless_of_broadcast_age() {
        let table = PeerTable::new("self#0000", StdDuration::from_millis(10));
        let t0 = now();
        table.upsert_registry("a#aaaa", "10.0.0.1", 12345, t0);
        let later = t0 + chrono::Duration::seconds(5);
        let (peers, removed) = table.snapshot(later);
        assert!(peers.contains_key("a#aaaa"));
        assert!(removed.is_empty());
    }

    #[test]
    fn remove_if_broadcast_only_respects_registry_axis() {
        let table = PeerTable::new("self#0000", StdDuration::from_millis(2000));
        let t0 = now();
        table.upsert_broadcast("a#aaaa", "10.0.0.1", 12345, t0);
        table.upsert_registry("a#aaaa", "10.0.0.1", 12345, t0);
        assert!(!table.remove_if_broadcast_only("a#aaaa"));
        assert!(table.contains("a#aaaa"));

        table.mark_registry_gone("a#aaaa");
        // still broadcast-attested after clearing registry in this branch
        let table2 = PeerTable::new("self#0000", StdDuration::from_millis(2000));
        table2.upsert_broadcast("b#bbbb", "10.0.0.2", 12345, t0);
        assert!(table2.remove_if_broadcast_only("b#bbbb"));
        assert!(!table2.contains("b#bbbb"));
    }
}
