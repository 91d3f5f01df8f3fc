//! The LIVR wire protocol.
//!
//! A datagram is a 27 byte header followed by up to 105 thirteen-byte point
//! records (at the default 1400 byte datagram size), optionally protected by
//! a CRC-32. See [`wire`] for the exact layout.
//!
//! ```rust
//! use livr::{PacketDecoder, Point, PointEncoder, ProtocolConfig, SequenceCounter};
//!
//! # fn main() -> livr::Result<()> {
//! let config = ProtocolConfig::default();
//! let encoder = PointEncoder::new(&config)?;
//! let decoder = PacketDecoder::new(&config);
//! let sequence = SequenceCounter::new();
//!
//! let scan = vec![Point::new(1.0, 2.0, 0.5, 80); 250];
//! let datagrams = encoder.encode_batch(1_000_000, &scan, &sequence)?;
//! assert_eq!(datagrams.len(), 3);
//!
//! let packet = decoder.decode(&datagrams[0]).expect("valid datagram");
//! assert_eq!(packet.point_count(), 105);
//! # Ok(())
//! # }
//! ```

pub mod checksum;
mod decoder;
mod encoder;
pub mod wire;

pub use decoder::{PacketDecoder, Rejection};
pub use encoder::{PointEncoder, SequenceCounter};
