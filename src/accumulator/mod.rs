//! Frame reconstruction from a lossy, reordered packet stream.
//!
//! [`FrameAccumulator`] groups packets into fixed windows of device time.
//! The first packet after Idle anchors a window; packets inside it are
//! appended; the first packet at or past its end closes it and anchors the
//! next window. Packets older than the open window are late and dropped.
//!
//! ```rust
//! use livr::{FrameAccumulator, FrameConfig};
//!
//! # fn main() -> livr::Result<()> {
//! let mut accumulator = FrameAccumulator::new(&FrameConfig { period_s: 0.1, max_frame_points: 1000 })?;
//! let xyz = [0.0f32; 3 * 50];
//!
//! for (seq, ts_ms) in [(1, 0), (2, 20), (3, 50), (4, 95)] {
//!     assert!(accumulator.add_packet(ts_ms * 1_000_000, &xyz, seq)?.is_none());
//! }
//! let frame = accumulator.add_packet(120_000_000, &xyz, 5)?.expect("window expired");
//! assert_eq!(frame.point_count(), 200);
//! assert_eq!((frame.seq_first, frame.seq_last), (1, 4));
//! # Ok(())
//! # }
//! ```

mod batch;
mod sequence;

pub use batch::{BatchAdapter, BatchOutcome, ElementFault, StatsObserver};
pub use sequence::{REORDER_WINDOW, SequenceEvent, SequenceTracker};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::profiling::ProfileCollector;
use crate::stats::{AccumulatorStats, AccumulatorStatsSnapshot, add, bump};
use crate::types::{DecodedPacket, Frame};
use crate::{FrameConfig, Result, StreamError};

const POINT_BYTES: usize = std::mem::size_of::<[f32; 3]>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenFrame {
    start_ts_ns: u64,
    end_ts_ns: u64,
    seq_first: u32,
    seq_last: u32,
    packet_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Idle,
    Open(OpenFrame),
}

/// Device-time windowed frame builder.
///
/// Not thread-safe; one accumulator serves one stream on one task. Its
/// counters are shared through [`stats_handle`](Self::stats_handle) and can be
/// read from anywhere.
#[derive(Debug)]
pub struct FrameAccumulator {
    period_ns: u64,
    capacity: usize,
    points: Vec<[f32; 3]>,
    state: FrameState,
    sequence: SequenceTracker,
    stats: Arc<AccumulatorStats>,
    profiler: Option<Arc<ProfileCollector>>,
}

impl FrameAccumulator {
    pub fn new(config: &FrameConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            period_s = config.period_s,
            max_frame_points = config.max_frame_points,
            "Created frame accumulator"
        );
        Ok(Self::with_valid_config(config))
    }

    // Caller has validated `config`
    fn with_valid_config(config: &FrameConfig) -> Self {
        Self {
            period_ns: config.period_ns(),
            capacity: config.max_frame_points,
            points: Vec::with_capacity(config.max_frame_points),
            state: FrameState::Idle,
            sequence: SequenceTracker::new(),
            stats: Arc::new(AccumulatorStats::new()),
            profiler: None,
        }
    }

    /// Share an existing counter set instead of starting a new one
    pub fn with_stats(mut self, stats: Arc<AccumulatorStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_profiler(mut self, profiler: Arc<ProfileCollector>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    pub fn period(&self) -> Duration {
        Duration::from_nanos(self.period_ns)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, FrameState::Open(_))
    }

    /// Points held by the open frame, 0 when Idle
    pub fn open_point_count(&self) -> usize {
        self.points.len()
    }

    /// Add one packet given as a flat `x y z` buffer.
    ///
    /// Returns the frame this packet closed, if any. A buffer whose length is
    /// not a multiple of three is refused before any state changes.
    pub fn add_packet(&mut self, device_ts_ns: u64, xyz: &[f32], seq: u32) -> Result<Option<Frame>> {
        if xyz.len() % 3 != 0 {
            return Err(StreamError::MalformedPoints { len: xyz.len() });
        }
        let points = xyz.chunks_exact(3).map(|c| [c[0], c[1], c[2]]);
        Ok(self.ingest(device_ts_ns, seq, points))
    }

    pub fn add_points(&mut self, device_ts_ns: u64, points: &[[f32; 3]], seq: u32) -> Option<Frame> {
        self.ingest(device_ts_ns, seq, points.iter().copied())
    }

    pub fn add_decoded(&mut self, packet: &DecodedPacket) -> Option<Frame> {
        self.ingest(packet.device_ts_ns, packet.seq, packet.xyz())
    }

    /// Close the open frame now, as if its window had expired
    pub fn flush(&mut self) -> Option<Frame> {
        let frame = self.close();
        if let Some(frame) = &frame {
            debug!(%frame, "Flushed frame");
        }
        frame
    }

    /// Drop any open frame and forget the last sequence number.
    ///
    /// Counters are left alone; reset them through
    /// [`reset_stats`](Self::reset_stats).
    pub fn reset(&mut self) {
        self.points.clear();
        self.state = FrameState::Idle;
        self.sequence.reset();
        debug!("Accumulator reset");
    }

    pub fn stats(&self) -> AccumulatorStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> Arc<AccumulatorStats> {
        Arc::clone(&self.stats)
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    fn ingest<I>(&mut self, device_ts_ns: u64, seq: u32, points: I) -> Option<Frame>
    where
        I: ExactSizeIterator<Item = [f32; 3]>,
    {
        let completed = match self.state {
            FrameState::Idle => {
                self.open(device_ts_ns, seq);
                None
            }
            FrameState::Open(frame) if device_ts_ns < frame.start_ts_ns => {
                bump(&self.stats.late_packets);
                trace!(
                    seq,
                    ts = device_ts_ns,
                    frame_start = frame.start_ts_ns,
                    "Dropped late packet"
                );
                return None;
            }
            FrameState::Open(frame) if device_ts_ns - frame.start_ts_ns >= self.period_ns => {
                let closed = self.close();
                self.open(device_ts_ns, seq);
                closed
            }
            FrameState::Open(_) => None,
        };

        self.append(device_ts_ns, seq, points);
        completed
    }

    fn open(&mut self, device_ts_ns: u64, seq: u32) {
        self.state = FrameState::Open(OpenFrame {
            start_ts_ns: device_ts_ns,
            end_ts_ns: device_ts_ns,
            seq_first: seq,
            seq_last: seq,
            packet_count: 0,
        });
    }

    fn append<I>(&mut self, device_ts_ns: u64, seq: u32, points: I)
    where
        I: ExactSizeIterator<Item = [f32; 3]>,
    {
        let started = self.profiler.as_ref().map(|_| Instant::now());
        self.track_sequence(seq);

        let FrameState::Open(frame) = &mut self.state else {
            return;
        };

        let count = points.len();
        let copied = if self.points.len() + count > self.capacity {
            bump(&self.stats.overflow_packets);
            debug!(
                seq,
                points = count,
                held = self.points.len(),
                capacity = self.capacity,
                "Frame full, dropped packet"
            );
            0
        } else {
            self.points.extend(points);
            frame.end_ts_ns = device_ts_ns;
            frame.seq_last = seq;
            frame.packet_count += 1;
            bump(&self.stats.packets_added);
            add(&self.stats.points_added, count);
            count * POINT_BYTES
        };

        if let (Some(profiler), Some(started)) = (&self.profiler, started) {
            profiler.record_append(started.elapsed(), copied);
        }
    }

    fn track_sequence(&mut self, seq: u32) {
        match self.sequence.observe(seq) {
            SequenceEvent::First | SequenceEvent::InOrder => {}
            SequenceEvent::Gap { missing } => {
                bump(&self.stats.seq_gaps);
                trace!(seq, missing, "Sequence gap");
            }
            SequenceEvent::Reorder { behind } => {
                bump(&self.stats.seq_reorders);
                trace!(seq, behind, "Sequence reorder");
            }
            SequenceEvent::Duplicate => {
                bump(&self.stats.seq_duplicates);
                trace!(seq, "Duplicate sequence");
            }
            SequenceEvent::Wrap => {
                bump(&self.stats.seq_wraps);
                debug!(seq, "Sequence jumped backwards, treating as wrap");
            }
        }
    }

    fn close(&mut self) -> Option<Frame> {
        let FrameState::Open(open) = std::mem::replace(&mut self.state, FrameState::Idle) else {
            return None;
        };
        let started = self.profiler.as_ref().map(|_| Instant::now());

        if self.points.is_empty() {
            bump(&self.stats.empty_frames);
            trace!(seq_first = open.seq_first, "Discarded empty frame");
            return None;
        }

        let points = std::mem::replace(&mut self.points, Vec::with_capacity(self.capacity));
        bump(&self.stats.frames_built);
        let frame = Frame {
            points,
            start_ts_ns: open.start_ts_ns,
            end_ts_ns: open.end_ts_ns,
            seq_first: open.seq_first,
            seq_last: open.seq_last,
            packet_count: open.packet_count,
        };
        trace!(%frame, "Closed frame");

        if let (Some(profiler), Some(started)) = (&self.profiler, started) {
            profiler.record_close(started.elapsed());
        }
        Some(frame)
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::with_valid_config(&FrameConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{encode_packet, synthetic_points, synthetic_xyz};
    use crate::{PacketDecoder, ProtocolConfig};
    use proptest::prelude::*;

    const MS: u64 = 1_000_000;

    fn accumulator(period_s: f64, max_frame_points: usize) -> FrameAccumulator {
        FrameAccumulator::new(&FrameConfig { period_s, max_frame_points }).unwrap()
    }

    #[test]
    fn default_matches_default_config() {
        let from_default = FrameAccumulator::default();
        let from_config = FrameAccumulator::new(&FrameConfig::default()).unwrap();
        assert_eq!(from_default.period(), from_config.period());
        assert_eq!(from_default.capacity(), from_config.capacity());
        assert_eq!(from_default.period(), Duration::from_millis(100));
        assert!(!from_default.is_open());
        assert_eq!(from_default.stats(), AccumulatorStatsSnapshot::default());
    }

    #[test]
    fn reference_scenario() {
        let mut acc = accumulator(0.1, 120_000);
        let xyz = synthetic_xyz(50, 0);

        for (seq, ts) in [(1, 0), (2, 20 * MS), (3, 50 * MS), (4, 95 * MS)] {
            assert!(acc.add_packet(ts, &xyz, seq).unwrap().is_none());
        }
        let frame = acc.add_packet(120 * MS, &xyz, 5).unwrap().unwrap();

        assert_eq!(frame.point_count(), 200);
        assert_eq!(frame.packet_count, 4);
        assert_eq!((frame.seq_first, frame.seq_last), (1, 4));
        assert_eq!((frame.start_ts_ns, frame.end_ts_ns), (0, 95 * MS));

        assert!(acc.is_open());
        assert_eq!(acc.open_point_count(), 50);

        let stats = acc.stats();
        assert_eq!(stats.frames_built, 1);
        assert_eq!(stats.packets_added, 5);
        assert_eq!(stats.points_added, 250);
        assert_eq!(stats.seq_gaps, 0);
    }

    #[test]
    fn late_packet_is_idempotent() {
        let mut acc = accumulator(0.1, 1000);
        let xyz = synthetic_xyz(10, 0);
        acc.add_packet(50 * MS, &xyz, 1).unwrap();
        let before = acc.stats();

        assert!(acc.add_packet(10 * MS, &xyz, 7).unwrap().is_none());

        let after = acc.stats();
        assert_eq!(after.late_packets, 1);
        assert_eq!(AccumulatorStatsSnapshot { late_packets: 0, ..after }, before);
        assert_eq!(acc.open_point_count(), 10);

        // seq 7 was never recorded, so 2 is in order
        acc.add_packet(60 * MS, &xyz, 2).unwrap();
        assert_eq!(acc.stats().seq_gaps, 0);
    }

    #[test]
    fn overflow_drops_packet_but_keeps_frame() {
        let mut acc = accumulator(0.1, 100);
        acc.add_packet(0, &synthetic_xyz(60, 0), 1).unwrap();
        acc.add_packet(MS, &synthetic_xyz(60, 1), 2).unwrap();
        acc.add_packet(2 * MS, &synthetic_xyz(40, 2), 3).unwrap();

        let frame = acc.flush().unwrap();
        assert_eq!(frame.point_count(), 100);
        assert_eq!(frame.packet_count, 2);
        assert_eq!(frame.seq_last, 3);
        assert_eq!(acc.stats().overflow_packets, 1);
        assert!(frame.point_count() <= acc.capacity());
    }

    #[test]
    fn overflowed_packet_still_advances_sequence() {
        let mut acc = accumulator(0.1, 10);
        acc.add_packet(0, &synthetic_xyz(10, 0), 1).unwrap();
        acc.add_packet(MS, &synthetic_xyz(5, 0), 2).unwrap();
        acc.add_packet(2 * MS, &synthetic_xyz(0, 0), 3).unwrap();
        assert_eq!(acc.stats().seq_gaps, 0);
        assert_eq!(acc.stats().overflow_packets, 1);
    }

    #[test]
    fn flush_when_idle_is_none() {
        let mut acc = accumulator(0.1, 10);
        assert!(acc.flush().is_none());
        assert!(!acc.is_open());
    }

    #[test]
    fn flush_closes_open_frame() {
        let mut acc = accumulator(0.1, 1000);
        acc.add_packet(5, &synthetic_xyz(3, 0), 9).unwrap();
        let frame = acc.flush().unwrap();
        assert_eq!(frame.point_count(), 3);
        assert!(!acc.is_open());
        assert!(acc.flush().is_none());
    }

    #[test]
    fn empty_frame_is_not_emitted() {
        let mut acc = accumulator(0.1, 10);
        // First packet alone exceeds capacity: frame opens with no points.
        acc.add_packet(0, &synthetic_xyz(11, 0), 1).unwrap();
        assert!(acc.add_packet(200 * MS, &synthetic_xyz(2, 0), 2).unwrap().is_none());
        let stats = acc.stats();
        assert_eq!(stats.empty_frames, 1);
        assert_eq!(stats.frames_built, 0);
        assert_eq!(acc.open_point_count(), 2);
    }

    #[test]
    fn malformed_buffer_leaves_state_untouched() {
        let mut acc = accumulator(0.1, 10);
        let err = acc.add_packet(0, &[1.0, 2.0], 1).unwrap_err();
        assert!(matches!(err, StreamError::MalformedPoints { len: 2 }));
        assert!(!acc.is_open());
        assert_eq!(acc.stats(), AccumulatorStatsSnapshot::default());
    }

    #[test]
    fn gap_tracking_spans_frames() {
        let mut acc = accumulator(0.1, 1000);
        let xyz = synthetic_xyz(1, 0);
        acc.add_packet(0, &xyz, 1).unwrap();
        // Opens a new frame and skips 2..4
        acc.add_packet(150 * MS, &xyz, 5).unwrap();
        acc.add_packet(160 * MS, &xyz, 4).unwrap();

        let stats = acc.stats();
        assert_eq!(stats.seq_gaps, 1);
        assert_eq!(stats.seq_reorders, 1);
        assert_eq!(stats.frames_built, 1);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut acc = accumulator(0.1, 1000);
        acc.add_packet(0, &synthetic_xyz(4, 0), 10).unwrap();
        acc.reset();
        assert!(!acc.is_open());
        assert_eq!(acc.open_point_count(), 0);
        assert!(acc.flush().is_none());

        // last sequence forgotten: 50 is a first sighting, not a gap
        acc.add_packet(0, &synthetic_xyz(4, 0), 50).unwrap();
        assert_eq!(acc.stats().seq_gaps, 0);
        assert_eq!(acc.stats().packets_added, 2);
    }

    #[test]
    fn window_boundary_is_exclusive() {
        let mut acc = accumulator(0.1, 1000);
        let xyz = synthetic_xyz(1, 0);
        acc.add_packet(0, &xyz, 1).unwrap();
        assert!(acc.add_packet(100 * MS - 1, &xyz, 2).unwrap().is_none());
        let frame = acc.add_packet(100 * MS, &xyz, 3).unwrap().unwrap();
        assert_eq!(frame.packet_count, 2);
    }

    #[test]
    fn decoded_packets_feed_the_same_path() {
        let decoder = PacketDecoder::new(&ProtocolConfig::default());
        let mut acc = FrameAccumulator::default();
        for seq in 0..3u32 {
            let points = synthetic_points(20, seq);
            let packet = decoder.decode(&encode_packet(u64::from(seq) * 30 * MS, seq, &points, true)).unwrap();
            assert!(acc.add_decoded(&packet).is_none());
        }
        let frame = acc.flush().unwrap();
        assert_eq!(frame.point_count(), 60);
        assert_eq!(frame.points[20], synthetic_points(20, 1)[0].xyz());
    }

    #[test]
    fn profiler_sees_appends_and_closes() {
        let profiler = Arc::new(ProfileCollector::new());
        let mut acc = accumulator(0.1, 1000).with_profiler(Arc::clone(&profiler));
        acc.add_points(0, &[[1.0, 2.0, 3.0]; 4], 1);
        acc.add_points(MS, &[[1.0, 2.0, 3.0]; 4], 2);
        acc.flush();

        let report = profiler.report();
        assert_eq!(report.append_calls, 2);
        assert_eq!(report.copy_bytes, 8 * 12);
        assert_eq!(report.close_calls, 1);
    }

    prop_compose! {
        fn arb_packets()(
            packets in prop::collection::vec((0u64..1_000, 0usize..40, 0u32..50), 1..120)
        ) -> Vec<(u64, usize, u32)> {
            packets
        }
    }

    proptest! {
        #[test]
        fn frames_respect_window_and_capacity(packets in arb_packets(), capacity in 1usize..300) {
            let mut acc = accumulator(0.1, capacity);
            let mut frames = Vec::new();
            for (ts_ms, count, seq) in packets {
                if let Some(frame) = acc.add_packet(ts_ms * MS, &synthetic_xyz(count, seq), seq).unwrap() {
                    frames.push(frame);
                }
            }
            frames.extend(acc.flush());

            for frame in &frames {
                prop_assert!(frame.point_count() > 0);
                prop_assert!(frame.point_count() <= capacity);
                prop_assert!(frame.end_ts_ns >= frame.start_ts_ns);
                prop_assert!(frame.end_ts_ns - frame.start_ts_ns < 100 * MS);
            }
            let emitted: usize = frames.iter().map(Frame::point_count).sum();
            prop_assert_eq!(emitted as u64, acc.stats().points_added);
        }
    }
}
