use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::demux::Demultiplexer;
use crate::protocol::Packet;

/// Every `broadcast_interval`, emit a presence packet to `<broadcast>:port`.
/// Send errors are logged and swallowed; the loop never exits voluntarily.
pub async fn run_beaconer(
    socket: Arc<UdpSocket>,
    broadcast_addr: SocketAddr,
    username: String,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("beaconer shutting down");
                return;
            }
            _ = ticker.tick() => {
                let packet = Packet::announcement(&username, Utc::now());
                let Ok(payload) = serde_json::to_vec(&packet) else {
                    continue;
                };
                if let Err(err) = socket.send_to(&payload, broadcast_addr).await {
                    tracing::warn!(error = %err, "beacon send failed");
                }
            }
        }
    }
}

/// Blocks on the shared socket and hands every datagram to the
/// demultiplexer. Receive errors are logged and swallowed.
pub async fn run_listener(socket: Arc<UdpSocket>, demux: Arc<Demultiplexer>, cancel: CancellationToken) {
    let mut buf = [0u8; 65536];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("listener shutting down");
                return;
            }
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, from)) => demux.handle_datagram(&buf[..len], from).await,
                    Err(err) => tracing::warn!(error = %err, "recv_from failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn beacon_packet_round_trips_through_loopback() {
        let a = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let b = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let b_addr = b.local_addr().unwrap();

        let packet = Packet::announcement("a#aaaa", Utc::now());
        let payload = serde_json::to_vec(&packet).unwrap();
        a.send_to(&payload, b_addr).await.unwrap();

        let mut buf = [0u8; 1024];
        let (len, _) = b.recv_from(&mut buf).await.unwrap();
        let decoded: Packet = serde_json::from_slice(&buf[..len]).unwrap();
        match decoded {
            Packet::Announcement { username, .. } => assert_eq!(username, "a#aaaa"),
            other => panic!("unexpected packet: {other:?}"),
        }
    }
}
