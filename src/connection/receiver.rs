//! Receiver connection

use futures::stream::BoxStream;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{ReceiverStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::driver::Driver;
use crate::source::DatagramSource;
use crate::sources::UdpSource;
use crate::stats::{AccumulatorStats, DecoderStats, PipelineStats};
use crate::stream::SampleExt;
use crate::types::{Frame, ReportRate};
use crate::{Result, StreamConfig, StreamError};

/// A running receive pipeline.
///
/// Frames come out in order through [`frames`](Self::frames) or
/// [`next_frame`](Self::next_frame). Counters can be polled, streamed, or
/// read live while the pipeline runs. Dropping the connection stops the
/// receive task.
pub struct ReceiverConnection {
    frames: Option<mpsc::Receiver<Frame>>,
    stats: watch::Receiver<PipelineStats>,
    decoder_stats: Arc<DecoderStats>,
    accumulator_stats: Arc<AccumulatorStats>,
    source: String,
    local_addr: Option<SocketAddr>,
    publish_hz: f64,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ReceiverConnection {
    /// Bind `receiver.bind_addr` and start receiving.
    pub async fn listen(config: &StreamConfig) -> Result<Self> {
        config.validate()?;
        let source = UdpSource::bind(&config.receiver.bind_addr).await?;
        let local_addr = source.local_addr();
        let mut connection = Self::from_source(source, config)?;
        connection.local_addr = Some(local_addr);
        Ok(connection)
    }

    /// Start a pipeline over any datagram source.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_source<S>(source: S, config: &StreamConfig) -> Result<Self>
    where
        S: DatagramSource,
    {
        let name = source.describe();
        let channels = Driver::spawn(source, config)?;
        info!(source = %name, period_s = config.frame.period_s, "Receiver connection opened");

        Ok(Self {
            frames: Some(channels.frames),
            stats: channels.stats,
            decoder_stats: channels.decoder_stats,
            accumulator_stats: channels.accumulator_stats,
            source: name,
            local_addr: None,
            publish_hz: config.frame.frame_rate_hz(),
            cancel: channels.cancel,
            task: Some(channels.task),
        })
    }

    /// Take the frame stream. It can be taken once.
    pub fn frames(&mut self) -> Result<ReceiverStream<Frame>> {
        let frames =
            self.frames.take().ok_or_else(|| StreamError::closed("frame stream already taken"))?;
        Ok(ReceiverStream::new(frames))
    }

    /// Next frame, or `None` once the pipeline has stopped and drained.
    ///
    /// Also `None` after [`frames`](Self::frames) has taken the stream.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.frames.as_mut()?.recv().await
    }

    /// Like [`next_frame`](Self::next_frame) with a deadline
    pub async fn next_frame_timeout(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        tokio::time::timeout(timeout, self.next_frame())
            .await
            .map_err(|_| StreamError::Timeout { duration: timeout })
    }

    /// Counters as published after each frame, sampled at `rate`.
    ///
    /// The first item is the current value.
    pub fn stats_updates(&self, rate: ReportRate) -> BoxStream<'static, PipelineStats> {
        let updates = WatchStream::new(self.stats.clone());
        match rate.sample_period(self.publish_hz) {
            None => updates.boxed(),
            Some(period) => updates.sample_every(period).boxed(),
        }
    }

    /// Counters as of the last closed frame
    pub fn current_stats(&self) -> PipelineStats {
        *self.stats.borrow()
    }

    /// Decoder and accumulator counters read right now.
    ///
    /// Frame delivery counts are only updated when a frame closes, so those two
    /// fields come from the last publish.
    pub fn live_stats(&self) -> PipelineStats {
        PipelineStats {
            decoder: self.decoder_stats.snapshot(),
            accumulator: self.accumulator_stats.snapshot(),
            ..self.current_stats()
        }
    }

    /// Zero the decoder and accumulator counters
    pub fn reset_stats(&self) {
        self.decoder_stats.reset();
        self.accumulator_stats.reset();
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Bound address when listening on UDP
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop receiving and wait for the task to finish.
    ///
    /// The open frame is flushed into the frame channel first, so it can
    /// still be read afterwards.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.await.map_err(|e| StreamError::closed(format!("receive task failed: {e}")))?;
        }
        debug!(source = %self.source, "Receiver connection shut down");
        Ok(())
    }
}

impl Drop for ReceiverConnection {
    fn drop(&mut self) {
        debug!("Dropping receiver connection");
        self.cancel.cancel();
    }
}
