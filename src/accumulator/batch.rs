//! Batched entry point into the frame accumulator.
//!
//! Callers that cross an expensive boundary per call (an FFI layer, a lock, a
//! channel) hand over many packets at once. Each element still takes the
//! single-packet path in order, so the frames produced are exactly those that
//! element-by-element calls would have produced.

use tokio::sync::watch;
use tracing::{debug, warn};

use super::FrameAccumulator;
use crate::stats::{AccumulatorStatsSnapshot, bump};
use crate::types::{DecodedPacket, Frame};
use crate::{Result, StreamError};

/// Receives accumulator counters after each batch.
pub trait StatsObserver: Send {
    fn publish(&mut self, stats: &AccumulatorStatsSnapshot);
}

impl StatsObserver for watch::Sender<AccumulatorStatsSnapshot> {
    fn publish(&mut self, stats: &AccumulatorStatsSnapshot) {
        self.send_replace(*stats);
    }
}

impl<F> StatsObserver for F
where
    F: FnMut(&AccumulatorStatsSnapshot) + Send,
{
    fn publish(&mut self, stats: &AccumulatorStatsSnapshot) {
        self(stats)
    }
}

/// A batch element that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementFault {
    /// Position of the element in the batch
    pub index: usize,
    pub reason: String,
}

/// Result of one batch call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Frames closed during the batch, in order
    pub frames: Vec<Frame>,

    /// Elements skipped for malformed input
    pub faults: Vec<ElementFault>,

    /// Counters as they stood when the batch finished
    pub stats: AccumulatorStatsSnapshot,
}

/// Owns a [`FrameAccumulator`] and feeds it whole batches.
pub struct BatchAdapter {
    accumulator: FrameAccumulator,
    observer: Option<Box<dyn StatsObserver>>,
}

impl std::fmt::Debug for BatchAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchAdapter")
            .field("accumulator", &self.accumulator)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl BatchAdapter {
    pub fn new(accumulator: FrameAccumulator) -> Self {
        Self { accumulator, observer: None }
    }

    /// Publish counters to `observer` once at the end of every non-empty batch
    pub fn with_observer(mut self, observer: impl StatsObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Add packets given as parallel timestamp, point buffer and sequence slices.
    ///
    /// The three slices must have equal length; that is checked before any
    /// element is processed. An element with a malformed point buffer is
    /// skipped and reported in [`BatchOutcome::faults`] while the rest of the
    /// batch proceeds.
    pub fn add_packets_batch(
        &mut self,
        timestamps: &[u64],
        point_buffers: &[&[f32]],
        sequences: &[u32],
    ) -> Result<BatchOutcome> {
        if timestamps.len() != point_buffers.len() || timestamps.len() != sequences.len() {
            return Err(StreamError::BatchShape {
                timestamps: timestamps.len(),
                point_buffers: point_buffers.len(),
                sequences: sequences.len(),
            });
        }
        if timestamps.is_empty() {
            return Ok(self.outcome(Vec::new(), Vec::new()));
        }

        let mut frames = Vec::new();
        let mut faults = Vec::new();
        let elements = timestamps.iter().zip(point_buffers).zip(sequences);
        for (index, ((&ts, &xyz), &seq)) in elements.enumerate() {
            match self.accumulator.add_packet(ts, xyz, seq) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {}
                Err(e) => {
                    bump(&self.accumulator.stats.malformed_elements);
                    warn!(index, seq, error = %e, "Skipped malformed batch element");
                    faults.push(ElementFault { index, reason: e.to_string() });
                }
            }
        }

        debug!(
            elements = timestamps.len(),
            frames = frames.len(),
            faults = faults.len(),
            "Processed packet batch"
        );
        self.publish();
        Ok(self.outcome(frames, faults))
    }

    /// Add already decoded packets in order
    pub fn add_decoded_batch(&mut self, packets: &[DecodedPacket]) -> BatchOutcome {
        if packets.is_empty() {
            return self.outcome(Vec::new(), Vec::new());
        }
        let frames: Vec<Frame> =
            packets.iter().filter_map(|p| self.accumulator.add_decoded(p)).collect();
        self.publish();
        self.outcome(frames, Vec::new())
    }

    pub fn flush(&mut self) -> Option<Frame> {
        let frame = self.accumulator.flush();
        self.publish();
        frame
    }

    pub fn reset(&mut self) {
        self.accumulator.reset();
    }

    pub fn accumulator(&self) -> &FrameAccumulator {
        &self.accumulator
    }

    pub fn into_inner(self) -> FrameAccumulator {
        self.accumulator
    }

    fn publish(&mut self) {
        if let Some(observer) = self.observer.as_mut() {
            observer.publish(&self.accumulator.stats());
        }
    }

    fn outcome(&self, frames: Vec<Frame>, faults: Vec<ElementFault>) -> BatchOutcome {
        BatchOutcome { frames, faults, stats: self.accumulator.stats() }
    }
}
