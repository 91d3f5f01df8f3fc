//! Sequence continuity tracking.

/// Backward steps shorter than this are reorders; longer ones are treated as
/// the sender's counter wrapping or restarting.
pub const REORDER_WINDOW: u32 = 1000;

/// How a sequence number relates to the one seen before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    /// Nothing seen yet
    First,
    /// Exactly one past the last
    InOrder,
    /// Forward jump. `missing` is how many numbers were skipped.
    Gap { missing: u32 },
    /// Backward step within [`REORDER_WINDOW`]
    Reorder { behind: u32 },
    /// Same number again
    Duplicate,
    /// Backward jump of at least [`REORDER_WINDOW`]
    Wrap,
}

/// Remembers the last sequence number and classifies each new one.
///
/// A gap is counted once per event no matter how many numbers it skips, and a
/// step from `u32::MAX` to `0` is in order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceTracker {
    last: Option<u32>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<u32> {
        self.last
    }

    /// Classify `seq` and remember it as the latest
    pub fn observe(&mut self, seq: u32) -> SequenceEvent {
        let event = match self.last {
            None => SequenceEvent::First,
            Some(last) if seq == last.wrapping_add(1) => SequenceEvent::InOrder,
            Some(last) if seq > last => SequenceEvent::Gap { missing: seq - last - 1 },
            Some(last) if seq == last => SequenceEvent::Duplicate,
            Some(last) if last - seq < REORDER_WINDOW => SequenceEvent::Reorder { behind: last - seq },
            Some(_) => SequenceEvent::Wrap,
        };
        self.last = Some(seq);
        event
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
