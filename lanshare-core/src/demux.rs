use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::net::UdpSocket;

use crate::announce;
use crate::message::MessageChannel;
use crate::peer::PeerTable;
use crate::protocol::{FileSharePacket, Packet};
use crate::resource::ResourceCatalog;

/// Single UDP endpoint's dispatcher: decodes every inbound datagram and
/// routes it by its top-level `type` tag. Malformed or unknown datagrams
/// are logged and discarded, never propagated.
pub struct Demultiplexer {
    pub username: String,
    pub port: u16,
    pub socket: Arc<UdpSocket>,
    pub broadcast_addr: SocketAddr,
    pub peer_table: Arc<PeerTable>,
    pub catalog: Arc<ResourceCatalog>,
    pub messages: Arc<MessageChannel>,
}

impl Demultiplexer {
    pub async fn handle_datagram(&self, raw: &[u8], from: SocketAddr) {
        let packet: Packet = match serde_json::from_slice(raw) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::warn!(error = %err, %from, "dropping malformed datagram");
                return;
            }
        };

        match packet {
            Packet::Announcement { username, .. } => self.handle_announcement(username, from).await,
            Packet::Disconnection { username, .. } => self.handle_disconnection(&username),
            Packet::FileShare(inner) => self.handle_file_share(inner, from).await,
            Packet::Message { data } => self.messages.receive(data, Utc::now()),
        }
    }

    async fn handle_announcement(&self, username: String, from: SocketAddr) {
        if username == self.username {
            return;
        }
        let is_new = !self.peer_table.contains(&username);
        self.peer_table
            .upsert_broadcast(&username, &from.ip().to_string(), self.port, Utc::now());

        if is_new {
            if let Some(peer) = self.peer_table.get(&username) {
                announce::newcomer_push(&self.socket, &self.catalog, &peer, &self.username).await;
            }
        }
    }

    fn handle_disconnection(&self, username: &str) {
        if self.peer_table.remove_if_broadcast_only(username) {
            announce::revoke_owner_departure(&self.catalog, username);
        }
    }

    async fn handle_file_share(&self, inner: FileSharePacket, from: SocketAddr) {
        match inner {
            FileSharePacket::Announce { data } => self.catalog.handle_announce(data, from).await,
            FileSharePacket::AddAccess { data } => {
                self.catalog
                    .handle_access_update(&data.resource_id, &data.username, true, from)
                    .await;
            }
            FileSharePacket::RemoveAccess { data } => {
                self.catalog
                    .handle_access_update(&data.resource_id, &data.username, false, from)
                    .await;
            }
        }
    }
}
