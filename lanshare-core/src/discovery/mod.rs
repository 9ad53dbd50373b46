pub mod broadcast;
pub mod rendezvous;

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Bind the single UDP socket shared by the beaconer, the listener, and
/// every outbound announcement — configured for broadcast send/receive and
/// safe rebinding across restarts, the way `tokio::net::UdpSocket` alone
/// cannot express.
pub fn bind_shared_socket(port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(not(windows))]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}
