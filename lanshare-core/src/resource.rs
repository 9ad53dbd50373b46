use std::collections::{HashMap, HashSet};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

use crate::announce;
use crate::credentials::generate_credential;
use crate::peer::PeerTable;
use crate::transfer::BulkTransferHandle;

/// A file or directory a peer has offered to share.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SharedResource {
    pub resource_id: String,
    pub owner: String,
    pub path: String,
    pub is_directory: bool,
    pub allowed_users: HashSet<String>,
    pub shared_to_all: bool,
    pub timestamp: DateTime<Utc>,
    /// Unix seconds, matching the wire format rather than `DateTime` so
    /// mtime comparisons are a plain numeric `>`.
    pub modified_time: f64,
    pub ftp_password: String,
}

impl SharedResource {
    pub fn can_access(&self, username: &str) -> bool {
        self.owner == username || self.allowed_users.contains(username) || self.shared_to_all
    }
}

#[derive(Serialize, Deserialize, Default)]
struct CatalogFile {
    shared: Vec<SharedResource>,
    received: Vec<SharedResource>,
    downloaded: Vec<String>,
}

#[derive(Default)]
struct CatalogState {
    owned: HashMap<String, SharedResource>,
    received: HashMap<String, SharedResource>,
    downloaded: HashSet<String>,
}

/// Owned/received resource sets, ACL state, download bookkeeping, and
/// persistence to the per-user catalog file.
///
/// The catalog mutex is never held across network I/O or filesystem
/// copies: mutators lock, mutate, clone what they need, unlock, then act.
pub struct ResourceCatalog {
    username: String,
    share_root: PathBuf,
    catalog_path: PathBuf,
    port: u16,
    broadcast_addr: SocketAddr,
    socket: Arc<UdpSocket>,
    peer_table: Arc<PeerTable>,
    transfer: Arc<dyn BulkTransferHandle>,
    state: Mutex<CatalogState>,
}

impl ResourceCatalog {
    pub fn new(
        username: impl Into<String>,
        share_root: PathBuf,
        catalog_path: PathBuf,
        port: u16,
        broadcast_addr: SocketAddr,
        socket: Arc<UdpSocket>,
        peer_table: Arc<PeerTable>,
        transfer: Arc<dyn BulkTransferHandle>,
    ) -> Self {
        let username = username.into();
        let state = load_catalog(&catalog_path)
            .map(|file| CatalogState {
                owned: index_by_id(file.shared),
                received: index_by_id(file.received),
                downloaded: file.downloaded.into_iter().collect(),
            })
            .unwrap_or_default();
        Self {
            username,
            share_root,
            catalog_path,
            port,
            broadcast_addr,
            socket,
            peer_table,
            transfer,
            state: Mutex::new(state),
        }
    }

    pub fn share_root(&self) -> &Path {
        &self.share_root
    }

    /// Force a catalog write, used by the shutdown sequence's final
    /// persistence pass.
    pub fn persist(&self) {
        self.save();
    }

    fn save(&self) {
        let state = self.state.lock();
        let file = CatalogFile {
            shared: state.owned.values().cloned().collect(),
            received: state.received.values().cloned().collect(),
            downloaded: state.downloaded.iter().cloned().collect(),
        };
        drop(state);
        if let Err(err) = write_catalog(&self.catalog_path, &file) {
            tracing::warn!(error = %err, path = %self.catalog_path.display(), "failed to persist resource catalog");
        }
    }

    /// User action: offer `path` for sharing. Idempotent on the absolute
    /// path — calling twice returns the same `resource_id`.
    pub async fn share(&self, path: &Path, shared_to_all: bool) -> Option<SharedResource> {
        let absolute = match fs::canonicalize(path) {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "share: path not found");
                return None;
            }
        };
        let path_str = absolute.to_string_lossy().to_string();

        {
            let state = self.state.lock();
            if let Some(existing) = state.owned.values().find(|r| r.path == path_str) {
                return Some(existing.clone());
            }
        }

        let metadata = match fs::metadata(&absolute) {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "share: cannot stat path");
                return None;
            }
        };
        let is_directory = metadata.is_dir();
        let modified_time = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or_else(|| Utc::now().timestamp() as f64);

        let basename = absolute
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());
        let resource_id = format!("{}_{}_{}", self.username, Utc::now().timestamp(), basename);

        let resource = SharedResource {
            resource_id: resource_id.clone(),
            owner: self.username.clone(),
            path: path_str,
            is_directory,
            allowed_users: HashSet::new(),
            shared_to_all,
            timestamp: Utc::now(),
            modified_time,
            ftp_password: generate_credential(),
        };

        materialize(&self.share_root, &self.username, &absolute, &resource_id, is_directory);

        {
            let mut state = self.state.lock();
            state.owned.insert(resource_id, resource.clone());
        }
        self.save();
        announce::broadcast_announce(&self.socket, self.broadcast_addr, &resource).await;
        Some(resource)
    }

    /// Owner-only ACL edit. Returns `false` if `resource_id` is not owned
    /// locally (an ACL violation returns a boolean, never an error).
    pub async fn update_access(&self, resource_id: &str, username: &str, add: bool) -> bool {
        let updated = {
            let mut state = self.state.lock();
            let Some(resource) = state.owned.get_mut(resource_id) else {
                return false;
            };
            if add {
                resource.allowed_users.insert(username.to_string());
            } else {
                resource.allowed_users.remove(username);
            }
            resource.clone()
        };
        self.save();
        announce::send_access_update(&self.socket, &self.peer_table, resource_id, username, add)
            .await;
        if add {
            announce::broadcast_announce(&self.socket, self.broadcast_addr, &updated).await;
        }
        true
    }

    /// Owner-only flag edit.
    pub async fn set_share_to_all(&self, resource_id: &str, value: bool) -> bool {
        let updated = {
            let mut state = self.state.lock();
            let Some(resource) = state.owned.get_mut(resource_id) else {
                return false;
            };
            resource.shared_to_all = value;
            resource.clone()
        };
        self.save();
        announce::broadcast_announce(&self.socket, self.broadcast_addr, &updated).await;
        true
    }

    /// Handle an inbound `announce` from peer `from`.
    pub async fn handle_announce(&self, incoming: SharedResource, from: SocketAddr) {
        if incoming.owner == self.username {
            return;
        }
        let action = {
            let mut state = self.state.lock();
            match state.received.get(&incoming.resource_id) {
                Some(local) if !incoming.can_access(&self.username) => {
                    state.received.remove(&incoming.resource_id);
                    state.downloaded.remove(&incoming.resource_id);
                    Action::Purge(local.clone())
                }
                Some(local) if incoming.modified_time > local.modified_time => {
                    state.downloaded.remove(&incoming.resource_id);
                    state
                        .received
                        .insert(incoming.resource_id.clone(), incoming.clone());
                    Action::Redownload
                }
                Some(_) => Action::None,
                None if incoming.can_access(&self.username) => {
                    state
                        .received
                        .insert(incoming.resource_id.clone(), incoming.clone());
                    Action::Download
                }
                None => Action::None,
            }
        };
        match action {
            Action::Purge(local) => remove_materialization(&self.share_root, &self.username, &local.resource_id),
            Action::Redownload | Action::Download => {
                self.save();
                self.transfer.request_download(incoming, from);
            }
            Action::None => {}
        }
    }

    /// Handle an inbound `add_access` / `remove_access` targeted at us.
    pub async fn handle_access_update(&self, resource_id: &str, username: &str, add: bool, from: SocketAddr) {
        if username != self.username {
            return;
        }
        let redownload = {
            let mut state = self.state.lock();
            match state.received.get_mut(resource_id) {
                Some(resource) => {
                    if add {
                        resource.allowed_users.insert(username.to_string());
                        true
                    } else {
                        resource.allowed_users.remove(username);
                        if !resource.shared_to_all {
                            let removed = resource.clone();
                            state.received.remove(resource_id);
                            state.downloaded.remove(resource_id);
                            remove_materialization(&self.share_root, &self.username, &removed.resource_id);
                        }
                        false
                    }
                }
                None => false,
            }
        };
        self.save();
        if redownload {
            if let Some(resource) = self.state.lock().received.get(resource_id).cloned() {
                self.transfer.request_download(resource, from);
            }
        }
    }

    /// Remove all received resources owned by `username` (peer-row
    /// deletion and owner-departure revocation both route through here).
    pub fn purge_owner(&self, username: &str) {
        let removed: Vec<SharedResource> = {
            let mut state = self.state.lock();
            let ids: Vec<String> = state
                .received
                .values()
                .filter(|r| r.owner == username)
                .map(|r| r.resource_id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| {
                    state.downloaded.remove(&id);
                    state.received.remove(&id)
                })
                .collect()
        };
        if removed.is_empty() {
            return;
        }
        self.save();
        for resource in removed {
            remove_materialization(&self.share_root, &self.username, &resource.resource_id);
        }
    }

    /// Periodic mtime scan over owned resources; re-broadcasts any that
    /// changed on disk since the last scan.
    pub async fn sync_owned(&self) {
        let changed: Vec<SharedResource> = {
            let mut state = self.state.lock();
            let mut changed = Vec::new();
            for resource in state.owned.values_mut() {
                let Ok(metadata) = fs::metadata(&resource.path) else {
                    continue;
                };
                let Some(mtime) = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs_f64())
                else {
                    continue;
                };
                if mtime > resource.modified_time {
                    resource.modified_time = mtime;
                    changed.push(resource.clone());
                }
            }
            changed
        };
        if changed.is_empty() {
            return;
        }
        self.save();
        for resource in &changed {
            materialize(
                &self.share_root,
                &self.username,
                Path::new(&resource.path),
                &resource.resource_id,
                resource.is_directory,
            );
            announce::broadcast_announce(&self.socket, self.broadcast_addr, resource).await;
        }
    }

    pub fn owned_snapshot(&self) -> Vec<SharedResource> {
        self.state.lock().owned.values().cloned().collect()
    }

    pub fn received_snapshot(&self) -> Vec<SharedResource> {
        self.state.lock().received.values().cloned().collect()
    }
}

enum Action {
    None,
    Download,
    Redownload,
    Purge(SharedResource),
}

fn index_by_id(resources: Vec<SharedResource>) -> HashMap<String, SharedResource> {
    resources
        .into_iter()
        .map(|r| (r.resource_id.clone(), r))
        .collect()
}

fn load_catalog(path: &Path) -> Option<CatalogFile> {
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(file) => Some(file),
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "catalog file is not valid JSON, starting empty");
                None
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            tracing::warn!(error = %err, path = %path.display(), "failed to read catalog file, starting empty");
            None
        }
    }
}

fn write_catalog(path: &Path, file: &CatalogFile) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let serialized = serde_json::to_vec_pretty(file)?;
    fs::write(&tmp_path, serialized)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn materialize(share_root: &Path, username: &str, source: &Path, resource_id: &str, is_directory: bool) {
    let dest_dir = share_root.join(username);
    if let Err(err) = fs::create_dir_all(&dest_dir) {
        tracing::warn!(error = %err, "failed to create share directory");
        return;
    }
    let dest = dest_dir.join(resource_id);
    let _ = fs::remove_file(&dest);
    let _ = fs::remove_dir_all(&dest);

    if is_directory {
        if let Err(err) = copy_dir_recursive(source, &dest) {
            tracing::warn!(error = %err, "failed to materialize shared resource");
        }
        return;
    }

    #[cfg(unix)]
    let symlink_result = std::os::unix::fs::symlink(source, &dest);
    #[cfg(not(unix))]
    let symlink_result: std::io::Result<()> = Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "symlinks unsupported"));

    if symlink_result.is_ok() {
        return;
    }
    if let Err(err) = fs::copy(source, &dest) {
        tracing::warn!(error = %err, "failed to materialize shared resource");
    }
}

fn copy_dir_recursive(source: &Path, dest: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

fn remove_materialization(share_root: &Path, username: &str, resource_id: &str) {
    let dest = share_root.join(username).join(resource_id);
    let _ = fs::remove_file(&dest);
    let _ = fs::remove_dir_all(&dest);
}
