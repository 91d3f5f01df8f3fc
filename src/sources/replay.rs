//! Replay of captured datagrams

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::source::DatagramSource;
use crate::Result;

/// Feeds a fixed list of datagrams to a pipeline, then ends.
///
/// Without a rate the datagrams are released as fast as the pipeline takes
/// them. Frame boundaries depend only on device timestamps, so pacing changes
/// latency but not the frames produced.
#[derive(Debug)]
pub struct ReplaySource {
    datagrams: VecDeque<Vec<u8>>,
    total: usize,
    period: Option<Duration>,
    pacing: Option<Interval>,
}

impl ReplaySource {
    pub fn new(datagrams: impl IntoIterator<Item = Vec<u8>>) -> Self {
        let datagrams: VecDeque<Vec<u8>> = datagrams.into_iter().collect();
        let total = datagrams.len();
        info!(datagrams = total, "Prepared datagram replay");
        Self { datagrams, total, period: None, pacing: None }
    }

    /// Release at most `datagrams_per_second`, clamped to 1..=1_000_000
    pub fn with_rate(mut self, datagrams_per_second: f64) -> Self {
        let rate = datagrams_per_second.clamp(1.0, 1_000_000.0);
        self.period = Some(Duration::from_secs_f64(1.0 / rate));
        self.pacing = None;
        debug!(rate, "Replay pacing set");
        self
    }

    pub fn remaining(&self) -> usize {
        self.datagrams.len()
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

#[async_trait::async_trait]
impl DatagramSource for ReplaySource {
    async fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let Some(datagram) = self.datagrams.pop_front() else {
            debug!("Reached end of replay");
            return Ok(None);
        };

        if let Some(period) = self.period {
            // Created on first use so construction does not need a runtime.
            let pacing = self.pacing.get_or_insert_with(|| {
                let mut pacing = interval(period);
                pacing.set_missed_tick_behavior(MissedTickBehavior::Delay);
                pacing
            });
            pacing.tick().await;
        }

        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        trace!(
            "Replay datagram {}/{}: {} bytes",
            self.total - self.datagrams.len(),
            self.total,
            len
        );
        Ok(Some(len))
    }

    fn describe(&self) -> String {
        format!("replay://{} datagrams", self.total)
    }
}
