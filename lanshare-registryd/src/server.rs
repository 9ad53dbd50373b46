//! In-memory registry state backing the rendezvous HTTP surface.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::RegistryConfig;

/// A single registered peer. Keyed by `username` in [`RegistryState`];
/// last-write-wins on a duplicate `register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredPeer {
    pub username: String,
    pub address: String,
    pub port: u16,
    pub last_seen: DateTime<Utc>,
}

/// Per-endpoint-guarded map of known peers, plus the process start time for
/// the ambient health endpoint's uptime figure.
pub struct RegistryState {
    peers: Mutex<HashMap<String, RegisteredPeer>>,
    stale_after: Duration,
    started_at: Instant,
}

impl RegistryState {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            stale_after: config.stale_after(),
            started_at: Instant::now(),
        }
    }

    /// `POST /register`. Idempotent; a second call for the same username
    /// overwrites the prior entry.
    pub fn register(&self, username: &str, address: &str, port: u16) {
        let now = Utc::now();
        self.peers.lock().insert(
            username.to_string(),
            RegisteredPeer {
                username: username.to_string(),
                address: address.to_string(),
                port,
                last_seen: now,
            },
        );
        tracing::info!(%username, %address, port, "peer registered");
    }

    /// `POST /unregister`. Unknown usernames are non-fatal.
    pub fn unregister(&self, username: &str) {
        if self.peers.lock().remove(username).is_some() {
            tracing::info!(%username, "peer unregistered");
        }
    }

    /// `POST /heartbeat`. Updates `last_seen`; unknown usernames are
    /// non-fatal, matching `unregister`.
    pub fn heartbeat(&self, username: &str) {
        if let Some(peer) = self.peers.lock().get_mut(username) {
            peer.last_seen = Utc::now();
        }
    }

    /// `GET /peers`. Evicts entries silent longer than `stale_after` before
    /// returning the remainder.
    pub fn list_peers(&self) -> Vec<RegisteredPeer> {
        let now = Utc::now();
        let mut peers = self.peers.lock();
        peers.retain(|username, peer| {
            let age = now.signed_duration_since(peer.last_seen).to_std().unwrap_or_default();
            let alive = age <= self.stale_after;
            if !alive {
                tracing::info!(%username, "evicting stale registry peer");
            }
            alive
        });
        peers.values().cloned().collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
