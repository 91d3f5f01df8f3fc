//! Driver spawns and manages the receive task

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::accumulator::FrameAccumulator;
use crate::protocol::PacketDecoder;
use crate::source::DatagramSource;
use crate::stats::{AccumulatorStats, DecoderStats, PipelineStats};
use crate::types::Frame;
use crate::{Result, StreamConfig};

/// Consecutive source errors tolerated before the task gives up
const MAX_SOURCE_ERRORS: u32 = 10;

/// Result of spawning the receive task
pub struct DriverChannels {
    /// Completed frames, in order. Ends when the task stops.
    pub frames: mpsc::Receiver<Frame>,
    /// Counters, republished after every closed frame and at shutdown
    pub stats: watch::Receiver<PipelineStats>,
    /// Live decoder counters
    pub decoder_stats: Arc<DecoderStats>,
    /// Live accumulator counters
    pub accumulator_stats: Arc<AccumulatorStats>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

/// Spawns the task that turns a datagram source into frames.
///
/// The task owns the source, decoder and accumulator, so packets are
/// processed strictly in arrival order and nothing on the hot path is shared.
pub struct Driver;

impl Driver {
    /// Spawn the receive task for `source`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S>(source: S, config: &StreamConfig) -> Result<DriverChannels>
    where
        S: DatagramSource,
    {
        config.validate()?;

        let decoder = PacketDecoder::new(&config.protocol);
        let accumulator = FrameAccumulator::new(&config.frame)?;
        let decoder_stats = decoder.stats_handle();
        let accumulator_stats = accumulator.stats_handle();

        let (frame_tx, frame_rx) = mpsc::channel(config.receiver.frame_channel_capacity);
        let (stats_tx, stats_rx) = watch::channel(PipelineStats::default());
        let cancel = CancellationToken::new();

        let pipeline = Pipeline {
            decoder,
            accumulator,
            frames: frame_tx,
            stats: stats_tx,
            delivered: 0,
            dropped: 0,
        };
        let task = tokio::spawn(pipeline.run(
            source,
            config.receiver.recv_buffer_size,
            cancel.clone(),
        ));

        Ok(DriverChannels {
            frames: frame_rx,
            stats: stats_rx,
            decoder_stats,
            accumulator_stats,
            cancel,
            task,
        })
    }
}

struct Pipeline {
    decoder: PacketDecoder,
    accumulator: FrameAccumulator,
    frames: mpsc::Sender<Frame>,
    stats: watch::Sender<PipelineStats>,
    delivered: u64,
    dropped: u64,
}

impl Pipeline {
    async fn run<S>(mut self, mut source: S, buffer_size: usize, cancel: CancellationToken)
    where
        S: DatagramSource,
    {
        info!(source = %source.describe(), "Receive task started");
        let mut buf = vec![0u8; buffer_size];
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Receive task cancelled");
                    break;
                }
                result = source.recv(&mut buf) => result,
            };

            match result {
                Ok(Some(len)) => {
                    error_count = 0;
                    if !self.ingest(&buf[..len]) {
                        debug!("Frame receiver dropped, shutting down");
                        return;
                    }
                }
                Ok(None) => {
                    info!("Source ended");
                    break;
                }
                Err(e) => {
                    error_count += 1;
                    warn!("Source error ({}/{}): {}", error_count, MAX_SOURCE_ERRORS, e);

                    if error_count >= MAX_SOURCE_ERRORS {
                        error!("Too many source errors, shutting down");
                        break;
                    }

                    // Exponential backoff: 100ms, 200ms, ... capped at 1.6s
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        if let Some(frame) = self.accumulator.flush() {
            self.deliver(frame);
        }
        self.publish();
        info!(delivered = self.delivered, dropped = self.dropped, "Receive task ended");
    }

    /// Returns false once nobody is listening for frames
    fn ingest(&mut self, datagram: &[u8]) -> bool {
        let Ok(packet) = self.decoder.decode(datagram) else {
            return true;
        };
        let Some(frame) = self.accumulator.add_decoded(&packet) else {
            return true;
        };
        let open = self.deliver(frame);
        self.publish();
        open
    }

    fn deliver(&mut self, frame: Frame) -> bool {
        match self.frames.try_send(frame) {
            Ok(()) => {
                self.delivered += 1;
                true
            }
            Err(TrySendError::Full(frame)) => {
                self.dropped += 1;
                warn!(%frame, "Frame consumer lagging, dropped frame");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn publish(&self) {
        let stats = PipelineStats {
            decoder: self.decoder.stats(),
            accumulator: self.accumulator.stats(),
            frames_delivered: self.delivered,
            frames_dropped: self.dropped,
        };
        trace!(%stats, "Publishing stats");
        self.stats.send_replace(stats);
    }
}
