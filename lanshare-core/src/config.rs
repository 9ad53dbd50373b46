use std::path::PathBuf;
use std::time::Duration;

/// Runtime tunables for an [`crate::engine::Engine`].
///
/// Every field has the default named in the protocol notes; binaries that
/// embed this crate are expected to build a `Config` from their own CLI
/// parsing and pass it straight through.
#[derive(Debug, Clone)]
pub struct Config {
    /// Opaque, globally-unique username (the 4-hex disambiguation suffix is
    /// the caller's responsibility, not this crate's).
    pub username: String,
    /// Primary UDP port shared by presence, resource, and message traffic.
    pub port: u16,
    /// How often the broadcast beaconer sends a presence packet.
    pub broadcast_interval: Duration,
    /// Broadcast axis liveness window: peers silent longer than this are
    /// dropped from the broadcast axis on the next snapshot.
    pub peer_timeout: Duration,
    /// Rendezvous heartbeat cadence.
    pub heartbeat_interval: Duration,
    /// Rendezvous peer-list poll cadence.
    pub refresh_interval: Duration,
    /// Owned-resource mtime scan cadence.
    pub sync_interval: Duration,
    /// Timeout applied to every rendezvous HTTP request.
    pub http_timeout: Duration,
    /// Root directory under which this host's per-user share tree and
    /// catalog file live.
    pub workspace_root: PathBuf,
    /// Optional rendezvous server base URL (e.g. `http://registry.lan:9000`).
    pub registry_url: Option<String>,
}

impl Config {
    /// Port the bulk-transfer collaborator binds.
    pub fn transfer_port(&self) -> u16 {
        self.port + 1
    }

    /// Port the clipboard collaborator binds.
    ///
    /// Kept distinct from [`Config::transfer_port`] — the source this crate
    /// is modeled on overloads `port+1` for both, which the accompanying
    /// design notes call out as an ambiguity to resolve rather than copy.
    pub fn clipboard_port(&self) -> u16 {
        self.port + 2
    }

    /// Per-user directory holding the materialized share tree and the
    /// catalog file for `username`.
    pub fn user_dir(&self, username: &str) -> PathBuf {
        self.workspace_root.join(username)
    }

    /// Path to the persisted resource catalog for `username`.
    pub fn catalog_path(&self, username: &str) -> PathBuf {
        self.user_dir(username).join(".shared_resources.json")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: String::new(),
            port: 12345,
            broadcast_interval: Duration::from_millis(100),
            peer_timeout: Duration::from_millis(2000),
            heartbeat_interval: Duration::from_secs(10),
            refresh_interval: Duration::from_millis(500),
            sync_interval: Duration::from_secs(5),
            http_timeout: Duration::from_secs(5),
            workspace_root: PathBuf::from("shared"),
            registry_url: None,
        }
    }
}
