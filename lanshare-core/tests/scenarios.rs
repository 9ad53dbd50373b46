use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lanshare_core::peer::PeerTable;
use lanshare_core::resource::ResourceCatalog;
use lanshare_core::transfer::{BulkTransferHandle, NoopTransferHandle};
use lanshare_core::{conversation_id, MessageChannel};
use tokio::net::UdpSocket;

async fn loopback_pair() -> (UdpSocket, UdpSocket) {
    let a = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let b = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    (a, b)
}

fn catalog(
    username: &str,
    share_root: std::path::PathBuf,
    socket: Arc<UdpSocket>,
    target: std::net::SocketAddr,
    peer_table: Arc<PeerTable>,
) -> ResourceCatalog {
    let catalog_path = share_root.join(username).join(".shared_resources.json");
    ResourceCatalog::new(
        username.to_string(),
        share_root,
        catalog_path,
        target.port(),
        target,
        socket,
        peer_table,
        Arc::new(NoopTransferHandle) as Arc<dyn BulkTransferHandle>,
    )
}

// S1 — discovery and convergence: two peer tables joined by mutual
// broadcast attestation end up with exactly the other peer recorded.
#[test]
fn s1_discovery_and_convergence() {
    let a_table = PeerTable::new("a#aaaa", Duration::from_millis(2000));
    let b_table = PeerTable::new("b#bbbb", Duration::from_millis(2000));
    let now = Utc::now();

    a_table.upsert_broadcast("b#bbbb", "10.0.0.2", 12345, now);
    b_table.upsert_broadcast("a#aaaa", "10.0.0.1", 12345, now);

    let a_peer = a_table.get("b#bbbb").unwrap();
    assert!(a_peer.broadcast_peer);
    assert!(!a_peer.registry_peer);

    let b_peer = b_table.get("a#aaaa").unwrap();
    assert!(b_peer.broadcast_peer);
    assert!(!b_peer.registry_peer);
}

// S2 — dual-axis merge: a peer known via broadcast also gets a registry
// attestation, and losing the broadcast axis alone leaves the row present.
#[test]
fn s2_dual_axis_merge() {
    let table = PeerTable::new("b#bbbb", Duration::from_millis(50));
    let t0 = Utc::now();

    table.upsert_broadcast("a#aaaa", "10.0.0.1", 12345, t0);
    table.upsert_registry("a#aaaa", "10.0.0.1", 9999, t0);

    let peer = table.get("a#aaaa").unwrap();
    assert!(peer.broadcast_peer);
    assert!(peer.registry_peer);

    let later = t0 + chrono::Duration::milliseconds(200);
    let (peers, removed) = table.snapshot(later);
    assert!(removed.is_empty());
    let peer = peers.get("a#aaaa").unwrap();
    assert!(!peer.broadcast_peer);
    assert!(peer.registry_peer);
}

// S3 — share and grant: sharing creates an owned record; granting access
// sends a targeted add_access datagram and a fresh broadcast announcement.
#[tokio::test]
async fn s3_share_and_grant() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("x.txt");
    std::fs::write(&file_path, b"hello").unwrap();

    let (a_socket, b_socket) = loopback_pair().await;
    let b_addr = b_socket.local_addr().unwrap();
    let a_socket = Arc::new(a_socket);
    let peer_table = Arc::new(PeerTable::new("a#aaaa", Duration::from_millis(2000)));
    peer_table.upsert_broadcast("b#bbbb", &b_addr.ip().to_string(), b_addr.port(), Utc::now());

    let share_root = dir.path().join("shared");
    let cat = catalog("a#aaaa", share_root, a_socket, b_addr, Arc::clone(&peer_table));

    let resource = cat.share(&file_path, false).await.expect("share succeeds");
    assert_eq!(cat.owned_snapshot().len(), 1);

    // consume the broadcast-announce datagram sent by share()
    let mut buf = [0u8; 4096];
    let (len, _) = b_socket.recv_from(&mut buf).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
    assert_eq!(json["type"], "file_share");
    assert_eq!(json["action"], "announce");

    let granted = cat.update_access(&resource.resource_id, "b#bbbb", true).await;
    assert!(granted);

    // two datagrams follow: the targeted add_access, then the re-broadcast
    let (len, _) = b_socket.recv_from(&mut buf).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
    assert_eq!(json["action"], "add_access");
    assert_eq!(json["data"]["username"], "b#bbbb");
}

// S4 — revocation: removing access sends remove_access and, applied
// locally on the receiving side, purges the received record.
#[tokio::test]
async fn s4_revocation() {
    let dir = tempfile::tempdir().unwrap();
    let (a_socket, b_socket) = loopback_pair().await;
    let a_addr = a_socket.local_addr().unwrap();
    let b_socket = Arc::new(b_socket);
    let peer_table = Arc::new(PeerTable::new("b#bbbb", Duration::from_millis(2000)));

    let share_root = dir.path().join("shared");
    let cat = catalog("b#bbbb", share_root, b_socket, a_addr, peer_table);

    let resource = lanshare_core::SharedResource {
        resource_id: "a#aaaa_1_x.txt".to_string(),
        owner: "a#aaaa".to_string(),
        path: "/tmp/x.txt".to_string(),
        is_directory: false,
        allowed_users: std::iter::once("b#bbbb".to_string()).collect(),
        shared_to_all: false,
        timestamp: Utc::now(),
        modified_time: 100.0,
        ftp_password: "secret".to_string(),
    };
    cat.handle_announce(resource.clone(), a_addr).await;
    assert_eq!(cat.received_snapshot().len(), 1);

    cat.handle_access_update(&resource.resource_id, "b#bbbb", false, a_addr).await;
    assert!(cat.received_snapshot().is_empty());
}

// S5 — owner departure: once a row is deleted, received resources owned
// by that peer are purged immediately.
#[tokio::test]
async fn s5_owner_departure() {
    let dir = tempfile::tempdir().unwrap();
    let (a_socket, _b_socket) = loopback_pair().await;
    let a_addr = a_socket.local_addr().unwrap();
    let a_socket = Arc::new(a_socket);
    let peer_table = Arc::new(PeerTable::new("b#bbbb", Duration::from_millis(2000)));

    let share_root = dir.path().join("shared");
    let cat = catalog("b#bbbb", share_root, a_socket, a_addr, Arc::clone(&peer_table));

    let resource = lanshare_core::SharedResource {
        resource_id: "a#aaaa_1_x.txt".to_string(),
        owner: "a#aaaa".to_string(),
        path: "/tmp/x.txt".to_string(),
        is_directory: false,
        allowed_users: Default::default(),
        shared_to_all: true,
        timestamp: Utc::now(),
        modified_time: 100.0,
        ftp_password: "secret".to_string(),
    };
    cat.handle_announce(resource, a_addr).await;
    assert_eq!(cat.received_snapshot().len(), 1);

    peer_table.upsert_broadcast("a#aaaa", "10.0.0.1", 12345, Utc::now());
    peer_table.remove("a#aaaa");
    cat.purge_owner("a#aaaa");

    assert!(cat.received_snapshot().is_empty());
}

// S6 — conversation stability: deterministic across processes, symmetric
// in argument order.
#[test]
fn s6_conversation_stability() {
    let id1 = conversation_id("a#aaaa", "b#bbbb");
    let id2 = conversation_id("b#bbbb", "a#aaaa");
    assert_eq!(id1, id2);
    assert_eq!(id1.len(), 5);

    let channel = MessageChannel::new("a#aaaa");
    let message = channel.compose("b#bbbb", "hi", "hello", None, Utc::now());
    assert_eq!(message.conversation_id, id1);
}
