use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// CLI flags for the standalone rendezvous server.
#[derive(Parser, Debug, Clone)]
#[command(name = "lanshare-registryd", about = "Rendezvous server for cross-subnet LAN peer discovery")]
pub struct RegistryConfig {
    /// Address the HTTP API binds.
    #[arg(long, default_value = "0.0.0.0:9000")]
    pub listen_addr: SocketAddr,

    /// Entries silent longer than this are evicted before serving `/peers`.
    #[arg(long, default_value = "30")]
    pub stale_after_secs: u64,
}

impl RegistryConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}
