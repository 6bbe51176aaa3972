use log::warn;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;

use crate::utils::{P2pError, Result};

/// Create a UDP socket bound to the multicast port with SO_REUSEADDR
/// (and SO_REUSEPORT on Unix), joined to the given group.
///
/// Address reuse lets several peers on one host listen on the same
/// multicast port, which is how local testing of discovery works.
pub fn multicast_listener_socket(group: Ipv4Addr, port: u16) -> Result<UdpSocket> {
    let bind_addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into();

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| P2pError::Io(format!("Failed to create socket: {}", e)))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| P2pError::Io(format!("Failed to set reuse_address: {}", e)))?;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    if let Err(e) = socket.set_reuse_port(true) {
        warn!("Could not set SO_REUSEPORT (not critical): {}", e);
    }

    socket
        .bind(&bind_addr.into())
        .map_err(|e| P2pError::Io(format!("Failed to bind to {}: {}", bind_addr, e)))?;

    socket
        .set_nonblocking(true)
        .map_err(|e| P2pError::Io(format!("Failed to set nonblocking: {}", e)))?;

    let socket = UdpSocket::from_std(socket.into())
        .map_err(|e| P2pError::Io(format!("Failed to convert to tokio socket: {}", e)))?;

    socket
        .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
        .map_err(|e| P2pError::Io(format!("Failed to join multicast group {}: {}", group, e)))?;

    Ok(socket)
}

/// Create an unbound-port UDP socket for sending heartbeats to the group.
pub fn multicast_sender_socket(ttl: u32) -> Result<UdpSocket> {
    let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .map_err(|e| P2pError::Io(format!("Failed to bind sender socket: {}", e)))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| P2pError::Io(format!("Failed to set nonblocking: {}", e)))?;

    let socket = UdpSocket::from_std(socket)
        .map_err(|e| P2pError::Io(format!("Failed to convert to tokio socket: {}", e)))?;

    socket
        .set_multicast_ttl_v4(ttl)
        .map_err(|e| P2pError::Io(format!("Failed to set multicast TTL: {}", e)))?;
    // Loopback stays on so peers on the same host hear each other;
    // our own datagrams are filtered by address, not by the socket.
    socket
        .set_multicast_loop_v4(true)
        .map_err(|e| P2pError::Io(format!("Failed to set multicast loopback: {}", e)))?;

    Ok(socket)
}
