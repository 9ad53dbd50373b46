use std::collections::HashSet;
use std::net::UdpSocket as StdUdpSocket;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::announce;
use crate::peer::PeerTable;
use crate::resource::ResourceCatalog;

const DEGRADED_AFTER_FAILURES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendezvousState {
    Disconnected,
    Registering,
    Connected,
    Disconnecting,
}

#[derive(Debug, thiserror::Error)]
pub enum RendezvousError {
    #[error("already connected to a rendezvous server")]
    AlreadyConnected,
    #[error("could not determine local address: {0}")]
    NoLocalAddress(std::io::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server rejected registration with status {0}")]
    Rejected(reqwest::StatusCode),
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    address: &'a str,
    port: u16,
}

#[derive(Serialize)]
struct UsernameRequest<'a> {
    username: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryPeer {
    pub username: String,
    pub address: String,
    pub port: u16,
    #[allow(dead_code)]
    pub last_seen: Option<f64>,
}

/// Registers with an HTTP registry, heartbeats, and polls the peer list,
/// feeding the Peer Table with `registry` attestations.
pub struct RendezvousClient {
    http: reqwest::Client,
    username: String,
    port: u16,
    heartbeat_interval: Duration,
    refresh_interval: Duration,
    socket: Arc<UdpSocket>,
    peer_table: Arc<PeerTable>,
    catalog: Arc<ResourceCatalog>,
    state: Mutex<RendezvousState>,
    base_url: Mutex<Option<String>>,
    known_registry_peers: Mutex<HashSet<String>>,
    consecutive_failures: AtomicU32,
    degraded: std::sync::atomic::AtomicBool,
    tasks: Mutex<Vec<CancellationToken>>,
}

impl RendezvousClient {
    pub fn new(
        username: impl Into<String>,
        port: u16,
        http_timeout: Duration,
        heartbeat_interval: Duration,
        refresh_interval: Duration,
        socket: Arc<UdpSocket>,
        peer_table: Arc<PeerTable>,
        catalog: Arc<ResourceCatalog>,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(http_timeout)
                .build()
                .expect("reqwest client configuration is static and valid"),
            username: username.into(),
            port,
            heartbeat_interval,
            refresh_interval,
            socket,
            peer_table,
            catalog,
            state: Mutex::new(RendezvousState::Disconnected),
            base_url: Mutex::new(None),
            known_registry_peers: Mutex::new(HashSet::new()),
            consecutive_failures: AtomicU32::new(0),
            degraded: std::sync::atomic::AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> RendezvousState {
        *self.state.lock()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// `register(url)` in `disconnected`: POST `/register`; on success
    /// enter `connected` and start the heartbeat and peer-refresh loops.
    pub async fn register(
        self: &Arc<Self>,
        url: &str,
        cancel: CancellationToken,
    ) -> Result<(), RendezvousError> {
        if *self.state.lock() != RendezvousState::Disconnected {
            return Err(RendezvousError::AlreadyConnected);
        }
        *self.state.lock() = RendezvousState::Registering;

        let base_url = normalize_url(url);
        let address = local_address().map_err(RendezvousError::NoLocalAddress)?;

        let response = self
            .http
            .post(format!("{base_url}/register"))
            .json(&RegisterRequest {
                username: &self.username,
                address: &address,
                port: self.port,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            *self.state.lock() = RendezvousState::Disconnected;
            return Err(RendezvousError::Rejected(response.status()));
        }

        *self.base_url.lock() = Some(base_url);
        *self.state.lock() = RendezvousState::Connected;
        self.known_registry_peers.lock().clear();
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.degraded.store(false, Ordering::Relaxed);

        let heartbeat_token = cancel.child_token();
        let refresh_token = cancel.child_token();
        self.tasks.lock().push(heartbeat_token.clone());
        self.tasks.lock().push(refresh_token.clone());

        let this = Arc::clone(self);
        tokio::spawn(async move { this.heartbeat_loop(heartbeat_token).await });
        let this = Arc::clone(self);
        tokio::spawn(async move { this.refresh_loop(refresh_token).await });

        Ok(())
    }

    /// `unregister()` in `connected`: stop loops, POST `/unregister`, enter
    /// `disconnected` even on transport failure (best effort).
    pub async fn unregister(&self) {
        if *self.state.lock() != RendezvousState::Connected {
            return;
        }
        *self.state.lock() = RendezvousState::Disconnecting;
        for token in self.tasks.lock().drain(..) {
            token.cancel();
        }

        if let Some(base_url) = self.base_url.lock().clone() {
            let result = self
                .http
                .post(format!("{base_url}/unregister"))
                .json(&UsernameRequest {
                    username: &self.username,
                })
                .send()
                .await;
            if let Err(err) = result {
                tracing::warn!(error = %err, "unregister request failed, proceeding anyway");
            }
        }

        for username in self.known_registry_peers.lock().drain() {
            self.peer_table.mark_registry_gone(&username);
            self.catalog.purge_owner(&username);
        }
        *self.base_url.lock() = None;
        *self.state.lock() = RendezvousState::Disconnected;
    }

    async fn heartbeat_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    let Some(base_url) = self.base_url.lock().clone() else { return };
                    let result = self
                        .http
                        .post(format!("{base_url}/heartbeat"))
                        .json(&UsernameRequest { username: &self.username })
                        .send()
                        .await;
                    if let Err(err) = result {
                        tracing::warn!(error = %err, "heartbeat failed");
                    }
                }
            }
        }
    }

    async fn refresh_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.refresh_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => self.refresh_once().await,
            }
        }
    }

    async fn refresh_once(&self) {
        let Some(base_url) = self.base_url.lock().clone() else {
            return;
        };
        let response = self.http.get(format!("{base_url}/peers")).send().await;
        let peers: Vec<RegistryPeer> = match response {
            Ok(resp) => match resp.json().await {
                Ok(peers) => peers,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to decode /peers response");
                    self.note_failure();
                    return;
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "refresh request failed");
                self.note_failure();
                return;
            }
        };
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.degraded.store(false, Ordering::Relaxed);

        let now = Utc::now();
        let mut seen = HashSet::new();
        for peer in &peers {
            if peer.username == self.username {
                continue;
            }
            seen.insert(peer.username.clone());

            // §4.F.3 — first observation from either discovery axis pushes
            // the full owned catalog to the newcomer, addressed to the
            // registry-supplied (address, port).
            let is_new = !self.peer_table.contains(&peer.username);
            self.peer_table
                .upsert_registry(&peer.username, &peer.address, peer.port, now);
            if is_new {
                if let Some(newcomer) = self.peer_table.get(&peer.username) {
                    announce::newcomer_push(&self.socket, &self.catalog, &newcomer, &self.username).await;
                }
            }
        }

        let mut known = self.known_registry_peers.lock();
        let disappeared: Vec<String> = known.difference(&seen).cloned().collect();
        for username in disappeared {
            self.peer_table.mark_registry_gone(&username);
            // Loss of registry visibility is treated as unreliable contact
            // regardless of the peer's broadcast axis.
            self.catalog.purge_owner(&username);
        }
        *known = seen;
    }

    fn note_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures > DEGRADED_AFTER_FAILURES {
            if !self.degraded.swap(true, Ordering::Relaxed) {
                tracing::warn!("registry connection may be lost after {failures} consecutive failures");
            }
        }
    }
}

fn normalize_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// Determine the local IPv4 address used to reach the outside world by
/// connecting a UDP socket and reading back its local endpoint — no
/// traffic is actually sent.
fn local_address() -> std::io::Result<String> {
    let socket = StdUdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    Ok(socket.local_addr()?.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_url_adds_scheme_when_missing() {
        assert_eq!(normalize_url("registry.lan:9000"), "http://registry.lan:9000");
    }

    #[test]
    fn normalize_url_preserves_explicit_scheme() {
        assert_eq!(normalize_url("https://registry.lan"), "https://registry.lan");
    }

    #[test]
    fn normalize_url_strips_trailing_slash() {
        assert_eq!(normalize_url("http://registry.lan/"), "http://registry.lan");
    }
}
