//! Point batch encoding and segmentation.

use std::slice::Chunks;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{trace, warn};

use super::checksum::datagram_checksum;
use super::wire::{self, HEADER_SIZE, PacketHeader, offsets};
use crate::config::DEFAULT_MAX_BATCH_POINTS;
use crate::stats::{EncoderStats, EncoderStatsSnapshot, add, bump};
use crate::types::Point;
use crate::{ProtocolConfig, Result, StreamConfig, StreamError};

/// Per-stream datagram sequence source.
///
/// Owned by whoever owns the stream, not by the encoder, so several encoders
/// or sender threads can draw from one sequence. Wraps at 2^32.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU32);

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(first: u32) -> Self {
        Self(AtomicU32::new(first))
    }

    /// Take the next sequence number
    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// The number the next call to [`next`](Self::next) will return
    pub fn peek(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Turns point batches into wire datagrams.
///
/// A batch is split into `ceil(n / capacity)` datagrams. All of them carry the
/// batch timestamp and each draws its own sequence number. Batches above the
/// configured ceiling are refused whole rather than truncated.
#[derive(Debug, Clone)]
pub struct PointEncoder {
    max_points: usize,
    max_batch_points: usize,
    checksum: bool,
    sensor_id: u16,
    stats: Arc<EncoderStats>,
}

impl PointEncoder {
    pub fn new(config: &ProtocolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            max_points: config.max_points_per_datagram(),
            max_batch_points: DEFAULT_MAX_BATCH_POINTS,
            checksum: config.checksum,
            sensor_id: config.sensor_id,
            stats: Arc::new(EncoderStats::new()),
        })
    }

    /// Encoder using the protocol section and the sender's batch ceiling
    pub fn from_config(config: &StreamConfig) -> Result<Self> {
        Ok(Self::new(&config.protocol)?.with_batch_ceiling(config.sender.max_batch_points))
    }

    pub fn with_sensor_id(mut self, sensor_id: u16) -> Self {
        self.sensor_id = sensor_id;
        self
    }

    pub fn with_batch_ceiling(mut self, max_batch_points: usize) -> Self {
        self.max_batch_points = max_batch_points;
        self
    }

    pub fn max_points_per_datagram(&self) -> usize {
        self.max_points
    }

    pub fn max_batch_points(&self) -> usize {
        self.max_batch_points
    }

    /// Datagrams needed for `point_count` points
    pub fn datagram_count(&self, point_count: usize) -> usize {
        point_count.div_ceil(self.max_points)
    }

    /// Split a batch into per-datagram slices
    pub fn segments<'a>(&self, points: &'a [Point]) -> Chunks<'a, Point> {
        points.chunks(self.max_points)
    }

    /// Account for a batch about to be encoded and return its datagram count.
    ///
    /// An empty batch yields zero datagrams and is not counted. A batch over
    /// the ceiling is counted as dropped and refused.
    pub(crate) fn plan_batch(&self, point_count: usize) -> Result<usize> {
        if point_count == 0 {
            return Ok(0);
        }
        if point_count > self.max_batch_points {
            bump(&self.stats.oversized_batches);
            add(&self.stats.points_dropped_cap, point_count);
            warn!(
                points = point_count,
                limit = self.max_batch_points,
                "Refusing oversized point batch"
            );
            return Err(StreamError::BatchTooLarge {
                points: point_count,
                limit: self.max_batch_points,
            });
        }

        let datagrams = self.datagram_count(point_count);
        bump(&self.stats.batches);
        if datagrams > 1 {
            bump(&self.stats.segmented_batches);
            add(&self.stats.segmented_datagrams, datagrams);
        }
        Ok(datagrams)
    }

    /// Draw a sequence number, noting when the counter wraps
    pub(crate) fn next_sequence(&self, sequence: &SequenceCounter) -> u32 {
        let seq = sequence.next();
        if seq == u32::MAX {
            bump(&self.stats.seq_wraps);
        }
        seq
    }

    /// Encode one datagram into `out`, replacing its contents.
    ///
    /// `points` must fit in a single datagram.
    pub fn encode_datagram_into(
        &self,
        device_ts_ns: u64,
        seq: u32,
        points: &[Point],
        out: &mut Vec<u8>,
    ) -> Result<()> {
        if points.is_empty() || points.len() > self.max_points {
            return Err(StreamError::InvalidPointCount { count: points.len(), max: self.max_points });
        }

        // max_points never exceeds u16::MAX
        let header = PacketHeader::new(device_ts_ns, seq, points.len() as u16)
            .with_sensor_id(self.sensor_id);

        out.clear();
        out.reserve(wire::datagram_len(points.len()));
        header.write_to(out);
        for point in points {
            wire::write_point(point, out);
        }

        if self.checksum {
            let crc = datagram_checksum(out);
            if let Some(field) = out.get_mut(offsets::CHECKSUM..HEADER_SIZE) {
                field.copy_from_slice(&crc.to_le_bytes());
            }
        }

        bump(&self.stats.datagrams);
        add(&self.stats.points, points.len());
        add(&self.stats.bytes, out.len());
        Ok(())
    }

    pub fn encode_datagram(&self, device_ts_ns: u64, seq: u32, points: &[Point]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_datagram_into(device_ts_ns, seq, points, &mut out)?;
        Ok(out)
    }

    /// Encode a whole batch, drawing one sequence number per datagram.
    ///
    /// Returns no datagrams for an empty batch.
    pub fn encode_batch(
        &self,
        device_ts_ns: u64,
        points: &[Point],
        sequence: &SequenceCounter,
    ) -> Result<Vec<Vec<u8>>> {
        let count = self.plan_batch(points.len())?;
        let mut datagrams = Vec::with_capacity(count);
        for segment in self.segments(points) {
            let seq = self.next_sequence(sequence);
            datagrams.push(self.encode_datagram(device_ts_ns, seq, segment)?);
        }
        trace!(points = points.len(), datagrams = datagrams.len(), "Encoded batch");
        Ok(datagrams)
    }

    pub fn stats(&self) -> EncoderStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> Arc<EncoderStats> {
        Arc::clone(&self.stats)
    }
}
