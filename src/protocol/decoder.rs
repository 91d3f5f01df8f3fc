//! Datagram validation and decoding.

use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

use super::checksum::datagram_checksum;
use super::wire::{self, CHECKSUM_UNSET, HEADER_SIZE, MAGIC, PacketHeader, POINT_SIZE, VERSION};
use crate::ProtocolConfig;
use crate::stats::{DecoderStats, DecoderStatsSnapshot, bump};
use crate::types::DecodedPacket;

/// Why a datagram was not accepted.
///
/// Checks run in declaration order and the first failure wins, so each
/// datagram is counted under exactly one reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("datagram of {len} bytes is shorter than the {HEADER_SIZE} byte header")]
    TooShort { len: usize },

    #[error("bad magic {found:#010x}")]
    BadMagic { found: u32 },

    #[error("unsupported wire version {found}")]
    BadVersion { found: u8 },

    #[error("point count {count} outside 1..={max}")]
    InvalidPointCount { count: u16, max: usize },

    #[error("datagram is {actual} bytes, header implies {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("checksum mismatch: received {received:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { received: u32, computed: u32 },
}

/// Stateless datagram decoder.
///
/// Holds no per-stream state beyond its counters, so one decoder can serve
/// any number of sensors. Counters sit behind an `Arc` and can be read from
/// another thread through [`stats_handle`](Self::stats_handle).
#[derive(Debug, Clone)]
pub struct PacketDecoder {
    max_points: usize,
    verify_checksum: bool,
    stats: Arc<DecoderStats>,
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new(&ProtocolConfig::default())
    }
}

impl PacketDecoder {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            max_points: config.max_points_per_datagram(),
            verify_checksum: config.checksum,
            stats: Arc::new(DecoderStats::new()),
        }
    }

    /// Share an existing counter set instead of starting a new one
    pub fn with_stats(mut self, stats: Arc<DecoderStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn max_points_per_datagram(&self) -> usize {
        self.max_points
    }

    /// Validate `datagram` and decode its points.
    ///
    /// Never panics on malformed input. A checksum of zero is accepted
    /// without verification, as is any checksum when verification is off.
    pub fn decode(&self, datagram: &[u8]) -> Result<DecodedPacket, Rejection> {
        bump(&self.stats.total_packets);

        match self.validate(datagram) {
            Ok(header) => {
                let points = datagram[HEADER_SIZE..]
                    .chunks_exact(POINT_SIZE)
                    .filter_map(wire::read_point)
                    .collect();
                bump(&self.stats.valid_packets);
                Ok(DecodedPacket {
                    device_ts_ns: header.device_ts_ns,
                    seq: header.seq,
                    sensor_id: header.sensor_id,
                    flags: header.flags,
                    checksum: header.checksum,
                    points,
                })
            }
            Err(rejection) => {
                self.count(&rejection);
                trace!(len = datagram.len(), %rejection, "Rejected datagram");
                Err(rejection)
            }
        }
    }

    fn validate(&self, datagram: &[u8]) -> Result<PacketHeader, Rejection> {
        let header =
            PacketHeader::decode(datagram).ok_or(Rejection::TooShort { len: datagram.len() })?;

        if header.magic != MAGIC {
            return Err(Rejection::BadMagic { found: header.magic });
        }
        if header.version != VERSION {
            return Err(Rejection::BadVersion { found: header.version });
        }
        let count = usize::from(header.point_count);
        if count == 0 || count > self.max_points {
            return Err(Rejection::InvalidPointCount {
                count: header.point_count,
                max: self.max_points,
            });
        }
        let expected = header.datagram_len();
        if datagram.len() != expected {
            return Err(Rejection::LengthMismatch { expected, actual: datagram.len() });
        }
        if self.verify_checksum && header.checksum != CHECKSUM_UNSET {
            let computed = datagram_checksum(datagram);
            if computed != header.checksum {
                return Err(Rejection::ChecksumMismatch { received: header.checksum, computed });
            }
        }
        Ok(header)
    }

    fn count(&self, rejection: &Rejection) {
        let counter = match rejection {
            Rejection::TooShort { .. } => &self.stats.too_short,
            Rejection::BadMagic { .. } => &self.stats.bad_magic,
            Rejection::BadVersion { .. } => &self.stats.bad_version,
            Rejection::InvalidPointCount { .. } => &self.stats.invalid_point_count,
            Rejection::LengthMismatch { .. } => &self.stats.length_mismatch,
            Rejection::ChecksumMismatch { .. } => &self.stats.checksum_failures,
        };
        bump(counter);
    }

    pub fn stats(&self) -> DecoderStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> Arc<DecoderStats> {
        Arc::clone(&self.stats)
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire::offsets;
    use crate::test_utils::{encode_packet, synthetic_points};
    use proptest::prelude::*;

    fn valid_datagram(points: usize) -> Vec<u8> {
        encode_packet(1_000, 7, &synthetic_points(points, 1), true)
    }

    #[test]
    fn decodes_valid_datagram() {
        let decoder = PacketDecoder::default();
        let points = synthetic_points(105, 3);
        let datagram = encode_packet(42_000_000, 9, &points, true);

        let packet = decoder.decode(&datagram).unwrap();
        assert_eq!(packet.device_ts_ns, 42_000_000);
        assert_eq!(packet.seq, 9);
        assert_eq!(packet.points, points);
        assert!(packet.is_checksummed());

        let stats = decoder.stats();
        assert_eq!((stats.total_packets, stats.valid_packets), (1, 1));
    }

    #[test]
    fn short_datagram_is_rejected_first() {
        let decoder = PacketDecoder::default();
        // Garbage everywhere; length is checked before anything else.
        assert_eq!(decoder.decode(&[0xFF; 10]), Err(Rejection::TooShort { len: 10 }));
        assert_eq!(decoder.decode(&[]), Err(Rejection::TooShort { len: 0 }));
        assert_eq!(decoder.stats().too_short, 2);
    }

    #[test]
    fn validation_order_is_fixed() {
        let decoder = PacketDecoder::default();
        let mut datagram = valid_datagram(4);

        // Bad magic and bad version together: magic wins.
        datagram[offsets::MAGIC] ^= 0xFF;
        datagram[offsets::VERSION] = 9;
        assert!(matches!(decoder.decode(&datagram), Err(Rejection::BadMagic { .. })));

        datagram[offsets::MAGIC] ^= 0xFF;
        // Bad version and wrong length: version wins.
        datagram.push(0);
        assert_eq!(decoder.decode(&datagram), Err(Rejection::BadVersion { found: 9 }));

        datagram[offsets::VERSION] = VERSION;
        assert_eq!(
            decoder.decode(&datagram),
            Err(Rejection::LengthMismatch { expected: wire::datagram_len(4), actual: wire::datagram_len(4) + 1 })
        );

        let stats = decoder.stats();
        assert_eq!(stats.bad_magic, 1);
        assert_eq!(stats.bad_version, 1);
        assert_eq!(stats.length_mismatch, 1);
        assert_eq!(stats.invalid_packets(), 3);
        assert_eq!(stats.valid_packets, 0);
    }

    #[test]
    fn point_count_bounds() {
        let decoder = PacketDecoder::default();

        let mut zero = valid_datagram(1);
        zero[offsets::POINT_COUNT..offsets::FLAGS].copy_from_slice(&0u16.to_le_bytes());
        assert_eq!(decoder.decode(&zero), Err(Rejection::InvalidPointCount { count: 0, max: 105 }));

        let mut over = valid_datagram(1);
        over[offsets::POINT_COUNT..offsets::FLAGS].copy_from_slice(&106u16.to_le_bytes());
        assert_eq!(decoder.decode(&over), Err(Rejection::InvalidPointCount { count: 106, max: 105 }));

        assert_eq!(decoder.stats().invalid_point_count, 2);
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let decoder = PacketDecoder::default();
        let mut datagram = valid_datagram(3);
        let last = datagram.len() - 1;
        datagram[last] ^= 0x01;

        assert!(matches!(decoder.decode(&datagram), Err(Rejection::ChecksumMismatch { .. })));
        assert_eq!(decoder.stats().checksum_failures, 1);
    }

    #[test]
    fn zero_checksum_skips_verification() {
        let decoder = PacketDecoder::default();
        let mut datagram = encode_packet(5, 1, &synthetic_points(2, 0), false);
        datagram[HEADER_SIZE] ^= 0xFF;
        assert!(decoder.decode(&datagram).is_ok());
    }

    #[test]
    fn verification_can_be_disabled() {
        let config = ProtocolConfig { checksum: false, ..ProtocolConfig::default() };
        let decoder = PacketDecoder::new(&config);
        let mut datagram = valid_datagram(2);
        datagram[HEADER_SIZE + 1] ^= 0x10;
        assert!(decoder.decode(&datagram).is_ok());
    }

    #[test]
    fn shared_stats_handle() {
        let stats = Arc::new(DecoderStats::new());
        let decoder = PacketDecoder::default().with_stats(Arc::clone(&stats));
        decoder.decode(&valid_datagram(1)).unwrap();
        assert_eq!(stats.snapshot().valid_packets, 1);

        decoder.reset_stats();
        assert_eq!(stats.snapshot(), DecoderStatsSnapshot::default());
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..2048)) {
            let decoder = PacketDecoder::default();
            let _ = decoder.decode(&bytes);
            let stats = decoder.stats();
            prop_assert_eq!(stats.total_packets, 1);
            prop_assert_eq!(stats.valid_packets + stats.invalid_packets(), 1);
        }

        #[test]
        fn header_bit_flips_are_caught(byte in 0usize..offsets::CHECKSUM, bit in 0u8..8) {
            let decoder = PacketDecoder::default();
            let mut datagram = valid_datagram(5);
            datagram[byte] ^= 1 << bit;
            prop_assert!(decoder.decode(&datagram).is_err());
        }
    }
}
