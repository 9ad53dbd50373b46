use std::net::SocketAddr;

use chrono::Utc;
use tokio::net::UdpSocket;

use crate::peer::{Peer, PeerTable};
use crate::protocol::{AccessUpdate, FileSharePacket, Packet};
use crate::resource::{ResourceCatalog, SharedResource};

async fn send(socket: &UdpSocket, addr: SocketAddr, packet: &Packet) {
    let Ok(payload) = serde_json::to_vec(packet) else {
        tracing::warn!("failed to encode outbound packet");
        return;
    };
    if let Err(err) = socket.send_to(&payload, addr).await {
        tracing::warn!(error = %err, %addr, "failed to send packet");
    }
}

/// §4.F.1 — broadcast announce. No retries, no acks.
pub async fn broadcast_announce(socket: &UdpSocket, broadcast_addr: SocketAddr, resource: &SharedResource) {
    let packet = Packet::FileShare(FileSharePacket::Announce {
        data: resource.clone(),
    });
    send(socket, broadcast_addr, &packet).await;
}

/// §4.F.2 — targeted access update. Dropped silently if the peer is not
/// currently in the table; it will be re-learned on the next announcement.
pub async fn send_access_update(
    socket: &UdpSocket,
    peer_table: &PeerTable,
    resource_id: &str,
    username: &str,
    add: bool,
) {
    let Some(peer) = peer_table.get(username) else {
        return;
    };
    let Ok(addr) = format!("{}:{}", peer.address, peer.port).parse::<SocketAddr>() else {
        return;
    };
    let data = AccessUpdate {
        resource_id: resource_id.to_string(),
        username: username.to_string(),
    };
    let inner = if add {
        FileSharePacket::AddAccess { data }
    } else {
        FileSharePacket::RemoveAccess { data }
    };
    send(socket, addr, &Packet::FileShare(inner)).await;
}

/// §4.F.3 — newcomer push. Sent directly to the newcomer's advertised
/// `(address, port)`, one announcement per owned resource it can access.
pub async fn newcomer_push(
    socket: &UdpSocket,
    catalog: &ResourceCatalog,
    newcomer: &Peer,
    local_username: &str,
) {
    if newcomer.username == local_username {
        return;
    }
    let Ok(addr) = format!("{}:{}", newcomer.address, newcomer.port).parse::<SocketAddr>() else {
        return;
    };
    for resource in catalog.owned_snapshot() {
        if resource.can_access(&newcomer.username) {
            let packet = Packet::FileShare(FileSharePacket::Announce { data: resource });
            send(socket, addr, &packet).await;
        }
    }
}

/// §4.F.4 — revocation on owner departure. Purges every received resource
/// owned by the departed peer and its local materialization.
pub fn revoke_owner_departure(catalog: &ResourceCatalog, username: &str) {
    catalog.purge_owner(username);
}

/// Broadcast a one-shot disconnection notice, used on shutdown.
pub async fn broadcast_disconnection(socket: &UdpSocket, broadcast_addr: SocketAddr, username: &str) {
    let packet = Packet::disconnection(username, Utc::now());
    send(socket, broadcast_addr, &packet).await;
}
