//! UDP socket source

use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{info, trace};

use crate::source::DatagramSource;
use crate::{Result, StreamError};

/// Receives datagrams from any peer on a bound UDP socket.
#[derive(Debug)]
pub struct UdpSource {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpSource {
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| StreamError::io_error(format!("bind udp socket {addr}"), e))?;
        Self::from_tokio(socket)
    }

    /// Wrap a socket bound elsewhere. It is switched to non-blocking mode.
    pub fn from_std(socket: std::net::UdpSocket) -> Result<Self> {
        socket
            .set_nonblocking(true)
            .map_err(|e| StreamError::io_error("set udp socket non-blocking", e))?;
        let socket = UdpSocket::from_std(socket)
            .map_err(|e| StreamError::io_error("register udp socket", e))?;
        Self::from_tokio(socket)
    }

    fn from_tokio(socket: UdpSocket) -> Result<Self> {
        let local_addr = socket
            .local_addr()
            .map_err(|e| StreamError::io_error("read udp socket address", e))?;
        info!(%local_addr, "Listening for datagrams");
        Ok(Self { socket, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait::async_trait]
impl DatagramSource for UdpSource {
    async fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let (len, peer) = self
            .socket
            .recv_from(buf)
            .await
            .map_err(|e| StreamError::io_error("receive datagram", e))?;
        trace!(len, %peer, "Received datagram");
        Ok(Some(len))
    }

    fn describe(&self) -> String {
        format!("udp://{}", self.local_addr)
    }
}
