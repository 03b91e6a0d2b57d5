//! UDP socket seam and the real multicast socket.

use std::net::{SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info};

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, SocketStep};

/// The datagram operations the engine needs from a socket.
#[async_trait]
pub trait DatagramSocket: Send + Sync + 'static {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> std::io::Result<usize>;

    async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)>;
}

#[async_trait]
impl DatagramSocket for tokio::net::UdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> std::io::Result<usize> {
        tokio::net::UdpSocket::send_to(self, buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        tokio::net::UdpSocket::recv_from(self, buf).await
    }
}

/// Create, bind and join the mDNS group.
///
/// On failure the partially set up socket is dropped, which closes it, and
/// the error names the step that failed.
pub fn open_multicast_socket(
    config: &DiscoveryConfig,
) -> Result<tokio::net::UdpSocket, DiscoveryError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(DiscoveryError::socket(SocketStep::Create))?;

    socket
        .set_reuse_address(true)
        .map_err(DiscoveryError::socket(SocketStep::Configure))?;
    #[cfg(unix)]
    socket
        .set_reuse_port(true)
        .map_err(DiscoveryError::socket(SocketStep::Configure))?;

    let bind: SocketAddrV4 = config.bind_addr();
    socket
        .bind(&SocketAddr::V4(bind).into())
        .map_err(DiscoveryError::socket(SocketStep::Bind))?;
    debug!(addr = %bind, "mDNS socket bound");

    socket
        .join_multicast_v4(&config.group, bind.ip())
        .map_err(DiscoveryError::socket(SocketStep::JoinGroup))?;

    socket
        .set_multicast_loop_v4(config.multicast_loop)
        .map_err(DiscoveryError::socket(SocketStep::Configure))?;
    socket
        .set_multicast_ttl_v4(config.multicast_ttl)
        .map_err(DiscoveryError::socket(SocketStep::Configure))?;
    socket
        .set_nonblocking(true)
        .map_err(DiscoveryError::socket(SocketStep::Configure))?;

    let socket = tokio::net::UdpSocket::from_std(socket.into())
        .map_err(DiscoveryError::socket(SocketStep::Configure))?;
    info!(group = %config.group, port = config.port, "joined mDNS group");
    Ok(socket)
}
