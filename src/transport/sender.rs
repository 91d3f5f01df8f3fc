//! Non-blocking datagram transmission.
//!
//! The sender never waits on the network. A datagram the socket cannot take
//! right now is dropped and counted, and the rest of its batch is abandoned,
//! because the next scan will carry fresher points anyway.

use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::protocol::{PointEncoder, SequenceCounter};
use crate::stats::{SenderStats, SenderStatsSnapshot, add, bump};
use crate::types::Point;
use crate::{Result, StreamConfig, StreamError};

/// What happened to one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub datagrams_sent: usize,
    pub points_sent: usize,
    /// Points not sent because the socket refused a datagram
    pub points_dropped: usize,
}

impl SendReport {
    pub fn is_complete(&self) -> bool {
        self.points_dropped == 0
    }
}

/// Encodes point batches and sends them over a connected UDP socket.
#[derive(Debug)]
pub struct DatagramSender {
    socket: UdpSocket,
    encoder: PointEncoder,
    sequence: Arc<SequenceCounter>,
    stats: Arc<SenderStats>,
    buffer: Vec<u8>,
}

impl DatagramSender {
    /// Bind an ephemeral port and connect it to `sender.target_addr`
    pub fn connect(config: &StreamConfig) -> Result<Self> {
        config.validate()?;
        let target = resolve(&config.sender.target_addr)?;
        let bind_addr: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(bind_addr)
            .map_err(|e| StreamError::io_error(format!("bind sender socket {bind_addr}"), e))?;
        socket
            .connect(target)
            .map_err(|e| StreamError::io_error(format!("connect to {target}"), e))?;
        info!(%target, "Datagram sender connected");

        Self::from_socket(socket, PointEncoder::from_config(config)?)
    }

    /// Use an already connected socket. It is switched to non-blocking mode.
    pub fn from_socket(socket: UdpSocket, encoder: PointEncoder) -> Result<Self> {
        socket
            .set_nonblocking(true)
            .map_err(|e| StreamError::io_error("set sender socket non-blocking", e))?;
        Ok(Self {
            socket,
            encoder,
            sequence: Arc::new(SequenceCounter::new()),
            stats: Arc::new(SenderStats::new()),
            buffer: Vec::new(),
        })
    }

    /// Draw sequence numbers from a counter shared with other senders
    pub fn with_sequence(mut self, sequence: Arc<SequenceCounter>) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(|e| StreamError::io_error("read sender address", e))
    }

    pub fn encoder(&self) -> &PointEncoder {
        &self.encoder
    }

    /// Send one scan's points, all stamped with `device_ts_ns`.
    ///
    /// Returns an error only for a batch over the ceiling or an unexpected
    /// socket failure. A full send buffer is reported through the returned
    /// [`SendReport`] and the counters, never as an error.
    pub fn send_points(&mut self, device_ts_ns: u64, points: &[Point]) -> Result<SendReport> {
        let mut report = SendReport::default();
        if self.encoder.plan_batch(points.len())? == 0 {
            return Ok(report);
        }

        for segment in self.encoder.segments(points) {
            let seq = self.encoder.next_sequence(&self.sequence);
            self.encoder.encode_datagram_into(device_ts_ns, seq, segment, &mut self.buffer)?;

            match self.socket.send(&self.buffer) {
                Ok(sent) => {
                    bump(&self.stats.tx_packets);
                    add(&self.stats.tx_points, segment.len());
                    add(&self.stats.tx_bytes, sent);
                    report.datagrams_sent += 1;
                    report.points_sent += segment.len();
                }
                Err(e) if is_transient(e.kind()) => {
                    let remaining = points.len() - report.points_sent;
                    bump(&self.stats.dropped_packets);
                    if e.kind() == ErrorKind::WouldBlock {
                        bump(&self.stats.send_would_block);
                    }
                    add(&self.stats.points_dropped, remaining);
                    report.points_dropped = remaining;
                    debug!(seq, remaining, error = %e, "Send buffer full, abandoning batch");
                    return Ok(report);
                }
                Err(e) => {
                    bump(&self.stats.send_errors);
                    warn!(seq, error = %e, "Datagram send failed");
                    return Err(StreamError::io_error("send datagram", e));
                }
            }
        }

        trace!(datagrams = report.datagrams_sent, points = report.points_sent, "Sent batch");
        Ok(report)
    }

    pub fn stats(&self) -> SenderStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> Arc<SenderStats> {
        Arc::clone(&self.stats)
    }
}

// A connected UDP socket reports an ICMP port-unreachable from an earlier
// datagram as ConnectionRefused on a later send.
fn is_transient(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::ConnectionRefused)
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|e| StreamError::io_error(format!("resolve {addr}"), e))?
        .next()
        .ok_or_else(|| StreamError::config_error(format!("address {addr} resolved to nothing")))
}
