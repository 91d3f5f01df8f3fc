//! Reconstructed scan frames

use std::fmt;
use std::time::Duration;

/// A bounded window of points assembled from consecutive datagrams.
///
/// The point buffer is moved out of the accumulator when the frame closes, so
/// a `Frame` is always exclusively owned by its consumer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    /// Points in arrival order
    pub points: Vec<[f32; 3]>,

    /// Device timestamp of the packet that opened the frame
    pub start_ts_ns: u64,

    /// Device timestamp of the last packet appended
    pub end_ts_ns: u64,

    /// Sequence number of the packet that opened the frame
    pub seq_first: u32,

    /// Sequence number of the last packet appended
    pub seq_last: u32,

    /// Number of packets whose points made it into the frame
    pub packet_count: u32,
}

impl Frame {
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Device-time span between the first and last packet
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.end_ts_ns.saturating_sub(self.start_ts_ns))
    }

    pub fn duration_s(&self) -> f64 {
        self.duration().as_secs_f64()
    }

    /// Points as one contiguous row-major `x0 y0 z0 x1 y1 z1 ...` slice
    pub fn xyz_flat(&self) -> &[f32] {
        self.points.as_flattened()
    }

    /// Consume the frame, returning its point buffer
    pub fn into_points(self) -> Vec<[f32; 3]> {
        self.points
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame(pts={}, pkts={}, dur={:.3}s, seq={}-{})",
            self.point_count(),
            self.packet_count,
            self.duration_s(),
            self.seq_first,
            self.seq_last
        )
    }
}
