//! Byte layout of a LIVR datagram.
//!
//! ```text
//! offset  size  field
//!      0     4  magic         0x4C495652 ("LIVR")
//!      4     1  version       1
//!      5     8  device_ts_ns  u64
//!     13     4  seq           u32, wraps
//!     17     2  point_count   u16
//!     19     2  flags         u16, reserved
//!     21     2  sensor_id     u16
//!     23     4  checksum      u32, 0 = not computed
//!     27  13*n  points        x f32, y f32, z f32, intensity u8
//! ```
//!
//! Every multi-byte field is little-endian and read individually; nothing here
//! reinterprets memory as a struct, so there is no padding or alignment to
//! get wrong.

use crate::types::Point;

/// Identifies a LIVR datagram, "LIVR" in ASCII
pub const MAGIC: u32 = 0x4C49_5652;

/// The only wire version understood
pub const VERSION: u8 = 1;

pub const HEADER_SIZE: usize = 27;
pub const POINT_SIZE: usize = 13;

/// Datagram size that stays under a 1500 byte Ethernet MTU with headroom
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 1400;

/// Points that fit in a [`DEFAULT_MAX_DATAGRAM_SIZE`] datagram
pub const DEFAULT_MAX_POINTS_PER_DATAGRAM: usize =
    (DEFAULT_MAX_DATAGRAM_SIZE - HEADER_SIZE) / POINT_SIZE;

/// Largest payload a single UDP datagram can carry over IPv4
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Checksum field value meaning "not computed"
pub const CHECKSUM_UNSET: u32 = 0;

/// Field offsets within the header
pub mod offsets {
    pub const MAGIC: usize = 0;
    pub const VERSION: usize = 4;
    pub const DEVICE_TS: usize = 5;
    pub const SEQ: usize = 13;
    pub const POINT_COUNT: usize = 17;
    pub const FLAGS: usize = 19;
    pub const SENSOR_ID: usize = 21;
    pub const CHECKSUM: usize = 23;
}

/// Point capacity of a datagram limited to `max_datagram_size` bytes.
///
/// Capped at `u16::MAX` because that is all the count field can express.
pub fn points_per_datagram(max_datagram_size: usize) -> usize {
    (max_datagram_size.saturating_sub(HEADER_SIZE) / POINT_SIZE).min(usize::from(u16::MAX))
}

/// Total datagram length for `point_count` points
pub const fn datagram_len(point_count: usize) -> usize {
    HEADER_SIZE + point_count * POINT_SIZE
}

/// Fixed-size datagram header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u8,
    pub device_ts_ns: u64,
    pub seq: u32,
    pub point_count: u16,
    pub flags: u16,
    pub sensor_id: u16,
    pub checksum: u32,
}

impl PacketHeader {
    /// Header for the current wire version with no checksum, flags or sensor id
    pub fn new(device_ts_ns: u64, seq: u32, point_count: u16) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            device_ts_ns,
            seq,
            point_count,
            flags: 0,
            sensor_id: 0,
            checksum: CHECKSUM_UNSET,
        }
    }

    pub fn with_sensor_id(mut self, sensor_id: u16) -> Self {
        self.sensor_id = sensor_id;
        self
    }

    /// Length of the datagram this header describes
    pub fn datagram_len(&self) -> usize {
        datagram_len(usize::from(self.point_count))
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[offsets::MAGIC..offsets::VERSION].copy_from_slice(&self.magic.to_le_bytes());
        buf[offsets::VERSION] = self.version;
        buf[offsets::DEVICE_TS..offsets::SEQ].copy_from_slice(&self.device_ts_ns.to_le_bytes());
        buf[offsets::SEQ..offsets::POINT_COUNT].copy_from_slice(&self.seq.to_le_bytes());
        buf[offsets::POINT_COUNT..offsets::FLAGS].copy_from_slice(&self.point_count.to_le_bytes());
        buf[offsets::FLAGS..offsets::SENSOR_ID].copy_from_slice(&self.flags.to_le_bytes());
        buf[offsets::SENSOR_ID..offsets::CHECKSUM].copy_from_slice(&self.sensor_id.to_le_bytes());
        buf[offsets::CHECKSUM..HEADER_SIZE].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Append the encoded header to `out`
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.encode());
    }

    /// Read a header from the start of `data`.
    ///
    /// Only the length is checked; field validation is the decoder's job.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: read_u32_le(data, offsets::MAGIC)?,
            version: data[offsets::VERSION],
            device_ts_ns: read_u64_le(data, offsets::DEVICE_TS)?,
            seq: read_u32_le(data, offsets::SEQ)?,
            point_count: read_u16_le(data, offsets::POINT_COUNT)?,
            flags: read_u16_le(data, offsets::FLAGS)?,
            sensor_id: read_u16_le(data, offsets::SENSOR_ID)?,
            checksum: read_u32_le(data, offsets::CHECKSUM)?,
        })
    }
}

/// Append one 13-byte point record to `out`
pub fn write_point(point: &Point, out: &mut Vec<u8>) {
    out.extend_from_slice(&point.x.to_le_bytes());
    out.extend_from_slice(&point.y.to_le_bytes());
    out.extend_from_slice(&point.z.to_le_bytes());
    out.push(point.intensity);
}

/// Read one point record from the start of `record`
pub fn read_point(record: &[u8]) -> Option<Point> {
    Some(Point {
        x: read_f32_le(record, 0)?,
        y: read_f32_le(record, 4)?,
        z: read_f32_le(record, 8)?,
        intensity: *record.get(12)?,
    })
}

fn read_u16_le(data: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes(data.get(offset..offset + 2)?.try_into().ok()?))
}

fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(data.get(offset..offset + 4)?.try_into().ok()?))
}

fn read_u64_le(data: &[u8], offset: usize) -> Option<u64> {
    Some(u64::from_le_bytes(data.get(offset..offset + 8)?.try_into().ok()?))
}

fn read_f32_le(data: &[u8], offset: usize) -> Option<f32> {
    Some(f32::from_le_bytes(data.get(offset..offset + 4)?.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_capacity() {
        assert_eq!(DEFAULT_MAX_POINTS_PER_DATAGRAM, 105);
        assert_eq!(points_per_datagram(DEFAULT_MAX_DATAGRAM_SIZE), 105);
        assert_eq!(datagram_len(105), 1392);
        assert_eq!(points_per_datagram(HEADER_SIZE + POINT_SIZE - 1), 0);
        assert_eq!(points_per_datagram(MAX_UDP_PAYLOAD), 5036);
    }

    #[test]
    fn header_layout_is_bit_exact() {
        let header = PacketHeader {
            checksum: 0xAABB_CCDD,
            flags: 0x0102,
            ..PacketHeader::new(0x1122_3344_5566_7788, 0xDEAD_BEEF, 105).with_sensor_id(7)
        };
        let bytes = header.encode();

        assert_eq!(&bytes[0..4], b"RVIL");
        assert_eq!(bytes[4], 1);
        assert_eq!(&bytes[5..13], &[0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);
        assert_eq!(&bytes[13..17], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(&bytes[17..19], &[105, 0]);
        assert_eq!(&bytes[19..21], &[0x02, 0x01]);
        assert_eq!(&bytes[21..23], &[7, 0]);
        assert_eq!(&bytes[23..27], &[0xDD, 0xCC, 0xBB, 0xAA]);

        assert_eq!(PacketHeader::decode(&bytes), Some(header));
    }

    #[test]
    fn point_layout_is_bit_exact() {
        let mut out = Vec::new();
        write_point(&Point::new(1.0, -2.5, 0.0, 200), &mut out);
        assert_eq!(out.len(), POINT_SIZE);
        assert_eq!(&out[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&out[4..8], &(-2.5f32).to_le_bytes());
        assert_eq!(&out[8..12], &0.0f32.to_le_bytes());
        assert_eq!(out[12], 200);
        assert_eq!(read_point(&out), Some(Point::new(1.0, -2.5, 0.0, 200)));
    }

    #[test]
    fn truncated_input_yields_none() {
        let bytes = PacketHeader::new(1, 2, 3).encode();
        assert_eq!(PacketHeader::decode(&bytes[..HEADER_SIZE - 1]), None);
        assert_eq!(read_point(&[0u8; POINT_SIZE - 1]), None);
    }
}
