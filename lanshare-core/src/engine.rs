use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::announce;
use crate::config::Config;
use crate::demux::Demultiplexer;
use crate::discovery::broadcast::{run_beaconer, run_listener};
use crate::discovery::rendezvous::RendezvousClient;
use crate::discovery::bind_shared_socket;
use crate::message::MessageChannel;
use crate::peer::PeerTable;
use crate::resource::ResourceCatalog;
use crate::transfer::{BulkTransferHandle, NoopTransferHandle};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to bind primary UDP port {port}: {source}")]
    BindFailed { port: u16, source: std::io::Error },
}

const SHUTDOWN_TASK_BUDGET: Duration = Duration::from_secs(1);

/// Owns and runs every long-running task described in the concurrency
/// model: the broadcast beaconer, the UDP listener, the rendezvous
/// heartbeat and peer-refresh loops, and the owned-resource mtime scanner.
pub struct Engine {
    config: Config,
    socket: Arc<tokio::net::UdpSocket>,
    broadcast_addr: SocketAddr,
    peer_table: Arc<PeerTable>,
    catalog: Arc<ResourceCatalog>,
    messages: Arc<MessageChannel>,
    rendezvous: Arc<RendezvousClient>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Binds the primary UDP port and builds every component. The only
    /// startup failure propagated to the launcher is bind failure.
    pub fn new(config: Config, transfer: Arc<dyn BulkTransferHandle>) -> Result<Self, EngineError> {
        Self::with_transfer(config, transfer)
    }

    pub fn with_default_transfer(config: Config) -> Result<Self, EngineError> {
        Self::with_transfer(config, Arc::new(NoopTransferHandle))
    }

    fn with_transfer(config: Config, transfer: Arc<dyn BulkTransferHandle>) -> Result<Self, EngineError> {
        let socket = bind_shared_socket(config.port).map_err(|source| EngineError::BindFailed {
            port: config.port,
            source,
        })?;
        let socket = Arc::new(socket);
        let broadcast_addr: SocketAddr = (Ipv4Addr::BROADCAST, config.port).into();

        let peer_table = Arc::new(PeerTable::new(config.username.clone(), config.peer_timeout));

        let share_root = config.user_dir(&config.username).join("shared");
        let catalog_path = config.catalog_path(&config.username);
        let catalog = Arc::new(ResourceCatalog::new(
            config.username.clone(),
            share_root,
            catalog_path,
            config.port,
            broadcast_addr,
            Arc::clone(&socket),
            Arc::clone(&peer_table),
            transfer,
        ));

        let messages = Arc::new(MessageChannel::new(config.username.clone()));

        let rendezvous = Arc::new(RendezvousClient::new(
            config.username.clone(),
            config.port,
            config.http_timeout,
            config.heartbeat_interval,
            config.refresh_interval,
            Arc::clone(&socket),
            Arc::clone(&peer_table),
            Arc::clone(&catalog),
        ));

        Ok(Self {
            config,
            socket,
            broadcast_addr,
            peer_table,
            catalog,
            messages,
            rendezvous,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    pub fn peer_table(&self) -> &Arc<PeerTable> {
        &self.peer_table
    }

    pub fn catalog(&self) -> &Arc<ResourceCatalog> {
        &self.catalog
    }

    pub fn messages(&self) -> &Arc<MessageChannel> {
        &self.messages
    }

    pub fn rendezvous(&self) -> &Arc<RendezvousClient> {
        &self.rendezvous
    }

    /// `(username, address, clipboard_port)` triples for the clipboard
    /// collaborator — the only peer-table access it needs.
    pub fn peer_snapshot(&self) -> Vec<(String, String, u16)> {
        let (peers, _removed) = self.peer_table.snapshot(chrono::Utc::now());
        peers
            .into_values()
            .map(|peer| (peer.username, peer.address, self.config.clipboard_port()))
            .collect()
    }

    /// Starts every background task. Returns once they are all spawned;
    /// call [`Engine::shutdown`] to stop them.
    pub fn start(&mut self) {
        let demux = Arc::new(Demultiplexer {
            username: self.config.username.clone(),
            port: self.config.port,
            socket: Arc::clone(&self.socket),
            broadcast_addr: self.broadcast_addr,
            peer_table: Arc::clone(&self.peer_table),
            catalog: Arc::clone(&self.catalog),
            messages: Arc::clone(&self.messages),
        });

        self.tasks.push(tokio::spawn(run_beaconer(
            Arc::clone(&self.socket),
            self.broadcast_addr,
            self.config.username.clone(),
            self.config.broadcast_interval,
            self.cancel.child_token(),
        )));

        self.tasks.push(tokio::spawn(run_listener(
            Arc::clone(&self.socket),
            demux,
            self.cancel.child_token(),
        )));

        let catalog = Arc::clone(&self.catalog);
        let sync_interval = self.config.sync_interval;
        let sync_cancel = self.cancel.child_token();
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sync_interval);
            loop {
                tokio::select! {
                    _ = sync_cancel.cancelled() => return,
                    _ = ticker.tick() => catalog.sync_owned().await,
                }
            }
        }));

        // The broadcast-axis liveness sweep is specified as happening
        // "lazily on read" of the peer table, but a long-running daemon
        // needs something driving that read. Poll at the shutdown
        // cancellation granularity so a silent peer disappears promptly
        // and its owned resources are purged without external consumers
        // (e.g. the clipboard collaborator) needing to call snapshot().
        let peer_table = Arc::clone(&self.peer_table);
        let catalog = Arc::clone(&self.catalog);
        let sweep_cancel = self.cancel.child_token();
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(100));
            loop {
                tokio::select! {
                    _ = sweep_cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let (_, removed) = peer_table.snapshot(chrono::Utc::now());
                        for username in removed {
                            announce::revoke_owner_departure(&catalog, &username);
                        }
                    }
                }
            }
        }));

        if let Some(url) = self.config.registry_url.clone() {
            let rendezvous = Arc::clone(&self.rendezvous);
            let register_cancel = self.cancel.child_token();
            tokio::spawn(async move {
                if let Err(err) = rendezvous.register(&url, register_cancel).await {
                    tracing::warn!(error = %err, "initial rendezvous registration failed");
                }
            });
        }
    }

    /// Runs the shutdown sequence: one disconnection broadcast, best-effort
    /// unregister, cancel every task (up to 1s each), persist the catalog.
    pub async fn shutdown(mut self) {
        announce::broadcast_disconnection(&self.socket, self.broadcast_addr, &self.config.username).await;
        self.rendezvous.unregister().await;

        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if tokio::time::timeout(SHUTDOWN_TASK_BUDGET, task).await.is_err() {
                tracing::warn!("a task did not shut down within its budget");
            }
        }

        self.catalog.persist();
    }
}
