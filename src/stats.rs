//! Counter sets for every pipeline stage.
//!
//! Counters are relaxed atomics so observer threads can read them while the
//! processing task is running. Reading goes through [`snapshot`], which
//! returns a plain `Copy` struct; a concurrent [`reset`] zeroes the set as a
//! unit and a snapshot never sees half of it zeroed.
//!
//! Counting is write-only from the pipeline's point of view: nothing branches
//! on a counter value.
//!
//! [`snapshot`]: DecoderStats::snapshot
//! [`reset`]: DecoderStats::reset

use serde::Serialize;
use std::fmt;
use std::hint;
use std::sync::atomic::{AtomicU64, Ordering, fence};

/// Sequence-lock epoch. Odd while a reset is in progress.
#[derive(Debug, Default)]
struct ResetEpoch(AtomicU64);

impl ResetEpoch {
    fn write(&self, zero: impl FnOnce()) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            if current % 2 == 1 {
                hint::spin_loop();
                current = self.0.load(Ordering::Relaxed);
                continue;
            }
            match self.0.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        fence(Ordering::Release);
        zero();
        self.0.store(current + 2, Ordering::Release);
    }

    fn read<T>(&self, load: impl Fn() -> T) -> T {
        loop {
            let before = self.0.load(Ordering::Acquire);
            if before % 2 == 0 {
                let value = load();
                fence(Ordering::Acquire);
                if self.0.load(Ordering::Relaxed) == before {
                    return value;
                }
            }
            hint::spin_loop();
        }
    }
}

#[inline]
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn add(counter: &AtomicU64, n: usize) {
    counter.fetch_add(n as u64, Ordering::Relaxed);
}

macro_rules! counter_set {
    (
        $(#[$meta:meta])*
        $name:ident => $snapshot:ident {
            $( $(#[$field_meta:meta])* $field:ident ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Default)]
        pub struct $name {
            epoch: ResetEpoch,
            $( pub(crate) $field: AtomicU64, )+
        }

        #[doc = concat!("Point-in-time copy of [`", stringify!($name), "`].")]
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
        pub struct $snapshot {
            $( $(#[$field_meta])* pub $field: u64, )+
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn snapshot(&self) -> $snapshot {
                self.epoch.read(|| $snapshot {
                    $( $field: self.$field.load(Ordering::Relaxed), )+
                })
            }

            /// Zero every counter in the set at once
            pub fn reset(&self) {
                self.epoch.write(|| {
                    $( self.$field.store(0, Ordering::Relaxed); )+
                });
            }
        }
    };
}

counter_set! {
    /// Outcome counters for [`PacketDecoder`](crate::PacketDecoder).
    DecoderStats => DecoderStatsSnapshot {
        /// Every datagram offered to the decoder
        total_packets,
        valid_packets,
        /// Shorter than a header
        too_short,
        bad_magic,
        bad_version,
        /// Point count of zero or above the datagram capacity
        invalid_point_count,
        length_mismatch,
        checksum_failures,
    }
}

counter_set! {
    /// Counters for [`FrameAccumulator`](crate::FrameAccumulator) and the batch adapter.
    AccumulatorStats => AccumulatorStatsSnapshot {
        frames_built,
        packets_added,
        points_added,
        /// Packets older than the open frame's start, dropped
        late_packets,
        /// Forward jumps in sequence, one per event
        seq_gaps,
        /// Backward steps within the reorder window
        seq_reorders,
        /// Backward jumps too large to be a reorder
        seq_wraps,
        /// Repeated sequence numbers
        seq_duplicates,
        /// Packets whose points did not fit in the open frame, dropped
        overflow_packets,
        /// Frames closed with no points, not emitted
        empty_frames,
        /// Batch elements rejected for a malformed point buffer
        malformed_elements,
    }
}

counter_set! {
    /// Counters for [`PointEncoder`](crate::PointEncoder).
    EncoderStats => EncoderStatsSnapshot {
        batches,
        datagrams,
        points,
        bytes,
        /// Batches that needed more than one datagram
        segmented_batches,
        /// Datagrams produced by segmented batches
        segmented_datagrams,
        /// Batches refused for exceeding the point ceiling
        oversized_batches,
        /// Points in refused batches
        points_dropped_cap,
        /// Times the sequence counter wrapped past `u32::MAX`
        seq_wraps,
    }
}

counter_set! {
    /// Transmit counters for [`DatagramSender`](crate::DatagramSender).
    SenderStats => SenderStatsSnapshot {
        tx_packets,
        tx_points,
        tx_bytes,
        /// Datagrams not sent because the socket could not take them
        dropped_packets,
        /// Of the drops, those caused by a full send buffer
        send_would_block,
        /// Points in dropped datagrams and the rest of their batch
        points_dropped,
        /// Send failures other than a full buffer
        send_errors,
    }
}

impl DecoderStatsSnapshot {
    pub fn invalid_packets(&self) -> u64 {
        self.too_short
            + self.bad_magic
            + self.bad_version
            + self.invalid_point_count
            + self.length_mismatch
            + self.checksum_failures
    }
}

impl fmt::Display for DecoderStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DecoderStats(total={}, valid={}, invalid={}, crc_fail={})",
            self.total_packets,
            self.valid_packets,
            self.invalid_packets(),
            self.checksum_failures
        )
    }
}

impl fmt::Display for AccumulatorStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AccumulatorStats(frames={}, packets={}, points={}, late={}, gaps={}, reorders={}, overflow={})",
            self.frames_built,
            self.packets_added,
            self.points_added,
            self.late_packets,
            self.seq_gaps,
            self.seq_reorders,
            self.overflow_packets
        )
    }
}

impl fmt::Display for SenderStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SenderStats(tx={}, points={}, bytes={}, dropped={}, eagain={})",
            self.tx_packets,
            self.tx_points,
            self.tx_bytes,
            self.dropped_packets,
            self.send_would_block
        )
    }
}

/// Everything a receive pipeline publishes after each closed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub decoder: DecoderStatsSnapshot,
    pub accumulator: AccumulatorStatsSnapshot,

    /// Frames handed to the consumer channel
    pub frames_delivered: u64,

    /// Frames discarded because the consumer channel was full
    pub frames_dropped: u64,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} delivered={} dropped={}",
            self.decoder, self.accumulator, self.frames_delivered, self.frames_dropped
        )
    }
}
