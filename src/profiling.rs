//! Opt-in timing for the frame accumulator.
//!
//! Attach a collector with
//! [`FrameAccumulator::with_profiler`](crate::FrameAccumulator::with_profiler).
//! Without one the accumulator takes no timestamps at all.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::stats::{add, bump};

#[derive(Debug, Default)]
pub struct ProfileCollector {
    append_calls: AtomicU64,
    append_ns: AtomicU64,
    close_calls: AtomicU64,
    close_ns: AtomicU64,
    copy_calls: AtomicU64,
    copy_bytes: AtomicU64,
}

/// Aggregated timings from a [`ProfileCollector`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProfileReport {
    pub append_calls: u64,
    pub append_total: Duration,
    pub close_calls: u64,
    pub close_total: Duration,
    pub copy_calls: u64,
    pub copy_bytes: u64,
}

impl ProfileCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_append(&self, elapsed: Duration, bytes_copied: usize) {
        bump(&self.append_calls);
        add(&self.append_ns, elapsed.as_nanos() as usize);
        if bytes_copied > 0 {
            bump(&self.copy_calls);
            add(&self.copy_bytes, bytes_copied);
        }
    }

    pub(crate) fn record_close(&self, elapsed: Duration) {
        bump(&self.close_calls);
        add(&self.close_ns, elapsed.as_nanos() as usize);
    }

    pub fn report(&self) -> ProfileReport {
        ProfileReport {
            append_calls: self.append_calls.load(Ordering::Relaxed),
            append_total: Duration::from_nanos(self.append_ns.load(Ordering::Relaxed)),
            close_calls: self.close_calls.load(Ordering::Relaxed),
            close_total: Duration::from_nanos(self.close_ns.load(Ordering::Relaxed)),
            copy_calls: self.copy_calls.load(Ordering::Relaxed),
            copy_bytes: self.copy_bytes.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.append_calls,
            &self.append_ns,
            &self.close_calls,
            &self.close_ns,
            &self.copy_calls,
            &self.copy_bytes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl ProfileReport {
    pub fn mean_append(&self) -> Option<Duration> {
        mean(self.append_total, self.append_calls)
    }

    pub fn mean_close(&self) -> Option<Duration> {
        mean(self.close_total, self.close_calls)
    }

    /// Copy throughput in MiB/s over the time spent appending
    pub fn copy_throughput_mib_s(&self) -> Option<f64> {
        let secs = self.append_total.as_secs_f64();
        (secs > 0.0).then(|| self.copy_bytes as f64 / (1024.0 * 1024.0) / secs)
    }
}

fn mean(total: Duration, calls: u64) -> Option<Duration> {
    (calls > 0).then(|| Duration::from_nanos((total.as_nanos() / u128::from(calls)) as u64))
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "append: {} calls, {:?} total", self.append_calls, self.append_total)?;
        if let Some(avg) = self.mean_append() {
            writeln!(f, "  mean {avg:?}")?;
        }
        writeln!(f, "close: {} calls, {:?} total", self.close_calls, self.close_total)?;
        if let Some(avg) = self.mean_close() {
            writeln!(f, "  mean {avg:?}")?;
        }
        write!(f, "copies: {} calls, {} bytes", self.copy_calls, self.copy_bytes)?;
        if let Some(rate) = self.copy_throughput_mib_s() {
            write!(f, " ({rate:.1} MiB/s)")?;
        }
        Ok(())
    }
}
