//! Datagram source implementations

pub mod replay;
pub mod udp;

pub use replay::ReplaySource;
pub use udp::UdpSource;
