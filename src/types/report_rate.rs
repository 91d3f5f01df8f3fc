//! Sampling rate for statistics observers

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often a statistics stream yields.
///
/// Statistics change once per closed frame, so the natural publish rate is the
/// frame rate. Observers that only refresh a dashboard can ask for less.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportRate {
    /// Yield every published update
    EveryUpdate,

    /// Yield the latest update at most this many times per second.
    /// Rates at or above the publish rate behave like `EveryUpdate`.
    AtMost(u32),
}

impl ReportRate {
    /// Resolve against the rate updates are published at
    pub fn resolve(self, publish_hz: f64) -> Self {
        match self {
            ReportRate::AtMost(0) => ReportRate::EveryUpdate,
            ReportRate::AtMost(hz) if f64::from(hz) >= publish_hz => ReportRate::EveryUpdate,
            other => other,
        }
    }

    /// Sampling period, or `None` when every update should be delivered
    pub fn sample_period(self, publish_hz: f64) -> Option<Duration> {
        match self.resolve(publish_hz) {
            ReportRate::EveryUpdate => None,
            ReportRate::AtMost(hz) => Some(Duration::from_secs_f64(1.0 / f64::from(hz))),
        }
    }
}
