//! Decoded datagram contents

use super::Point;

/// Contents of one validated datagram.
///
/// Owned by whoever called the decoder; nothing in the decoder refers back to
/// it once returned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedPacket {
    /// Device acquisition time in nanoseconds
    pub device_ts_ns: u64,

    /// Per-datagram sequence number (wraps at 2^32)
    pub seq: u32,

    /// Originating sensor, 0 for the primary sensor
    pub sensor_id: u16,

    /// Reserved flag bits as received
    pub flags: u16,

    /// Checksum field as received, 0 when the sender did not compute one
    pub checksum: u32,

    pub points: Vec<Point>,
}

impl DecodedPacket {
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Coordinates of every point, in wire order
    pub fn xyz(&self) -> impl ExactSizeIterator<Item = [f32; 3]> + '_ {
        self.points.iter().map(Point::xyz)
    }

    /// Whether the sender filled in the checksum field
    pub fn is_checksummed(&self) -> bool {
        self.checksum != 0
    }
}
