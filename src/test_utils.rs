//! Deterministic point and datagram generators for tests and benchmarks.
//!
//! Datagrams are assembled directly from the wire layout rather than through
//! [`PointEncoder`](crate::PointEncoder), so decoder tests do not depend on
//! the encoder being right.

#![cfg(any(test, feature = "benchmark"))]

use crate::protocol::checksum::datagram_checksum;
use crate::protocol::wire::{self, PacketHeader};
use crate::types::Point;

/// `count` points on a slowly rising spiral, varied by `seed`.
///
/// Coordinates are exactly representable, so comparisons after a wire round
/// trip can use `==`.
pub fn synthetic_points(count: usize, seed: u32) -> Vec<Point> {
    (0..count)
        .map(|i| {
            let step = (i as u32).wrapping_add(seed.wrapping_mul(31));
            let angle = (step % 360) as f32;
            let radius = 1.0 + (step % 64) as f32 * 0.25;
            Point::new(
                radius * (angle * 0.5).round(),
                -radius * (angle * 0.25).round(),
                (step % 16) as f32 * 0.125,
                (step % 256) as u8,
            )
        })
        .collect()
}

/// Flat `x y z` buffer for `count` synthetic points
pub fn synthetic_xyz(count: usize, seed: u32) -> Vec<f32> {
    synthetic_points(count, seed).iter().flat_map(Point::xyz).collect()
}

/// One datagram carrying `points`, optionally checksummed.
///
/// No capacity checks: tests use this to build datagrams the encoder would
/// refuse to produce.
pub fn encode_packet(device_ts_ns: u64, seq: u32, points: &[Point], checksum: bool) -> Vec<u8> {
    let header = PacketHeader::new(device_ts_ns, seq, points.len() as u16);
    let mut datagram = Vec::with_capacity(wire::datagram_len(points.len()));
    header.write_to(&mut datagram);
    for point in points {
        wire::write_point(point, &mut datagram);
    }
    if checksum {
        let crc = datagram_checksum(&datagram);
        datagram[wire::offsets::CHECKSUM..wire::HEADER_SIZE].copy_from_slice(&crc.to_le_bytes());
    }
    datagram
}

/// A train of `packets` checksummed datagrams, `step_ns` apart in device
/// time, with consecutive sequence numbers starting at `first_seq`.
pub fn packet_train(
    packets: usize,
    first_seq: u32,
    start_ts_ns: u64,
    step_ns: u64,
    points_per_packet: usize,
) -> Vec<Vec<u8>> {
    (0..packets)
        .map(|i| {
            let points = synthetic_points(points_per_packet, i as u32);
            encode_packet(
                start_ts_ns + step_ns * i as u64,
                first_seq.wrapping_add(i as u32),
                &points,
                true,
            )
        })
        .collect()
}
