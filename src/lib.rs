//! LiDAR point streaming over UDP with frame reconstruction.
//!
//! `livr` moves LiDAR returns from a sensor-side producer to a SLAM consumer
//! over an unreliable link:
//!
//! - **Wire protocol**: MTU-safe datagrams of at most 105 points with a 27
//!   byte header and optional CRC-32 ([`protocol`])
//! - **Encoding**: batches are segmented across datagrams, each with its own
//!   sequence number ([`PointEncoder`], [`DatagramSender`])
//! - **Decoding**: ordered validation with a counter per rejection reason
//!   ([`PacketDecoder`])
//! - **Frames**: packets are regrouped into fixed windows of device time,
//!   counting late, lost, reordered and overflowing packets along the way
//!   ([`FrameAccumulator`], [`BatchAdapter`])
//!
//! Delivery is best effort. Nothing is retransmitted and frames near a loss
//! are simply smaller.
//!
//! # Quick Start
//!
//! ## Receiving frames
//!
//! ```rust,no_run
//! use livr::{Livr, StreamConfig};
//!
//! #[tokio::main]
//! async fn main() -> livr::Result<()> {
//!     let config = StreamConfig::from_file("livr.yaml")?;
//!     let mut connection = Livr::listen(&config).await?;
//!
//!     while let Some(frame) = connection.next_frame().await {
//!         println!("{frame}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Sending points
//!
//! ```rust,no_run
//! use livr::{Livr, Point, StreamConfig};
//!
//! # fn main() -> livr::Result<()> {
//! let mut sender = Livr::sender(&StreamConfig::default())?;
//! let scan = vec![Point::new(1.0, 0.5, 0.2, 90); 600];
//! let report = sender.send_points(1_700_000_000_000_000_000, &scan)?;
//! assert!(report.datagrams_sent <= 6);
//! # Ok(())
//! # }
//! ```

// Core types and error handling
pub mod config;
mod error;
pub mod profiling;
pub mod stats;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire protocol and frame reconstruction
pub mod accumulator;
pub mod protocol;

// Stream-based receive architecture
pub mod connection;
pub mod driver;
pub mod source;
pub mod sources;
pub mod stream;
pub mod transport;

// Core exports
pub use config::{FrameConfig, ProtocolConfig, ReceiverConfig, SenderConfig, StreamConfig};
pub use error::*;
pub use stats::{
    AccumulatorStats, AccumulatorStatsSnapshot, DecoderStats, DecoderStatsSnapshot, EncoderStats,
    EncoderStatsSnapshot, PipelineStats, SenderStats, SenderStatsSnapshot,
};
pub use types::*;

pub use accumulator::{BatchAdapter, BatchOutcome, ElementFault, FrameAccumulator, StatsObserver};
pub use profiling::{ProfileCollector, ProfileReport};
pub use protocol::{PacketDecoder, PointEncoder, Rejection, SequenceCounter};

// Main API exports
pub use connection::ReceiverConnection;
pub use source::DatagramSource;
pub use sources::{ReplaySource, UdpSource};
pub use transport::{DatagramSender, SendReport};

/// Unified entry point for both ends of a link.
///
/// # Examples
///
/// ## Live UDP
/// ```rust,no_run
/// use livr::{Livr, StreamConfig};
///
/// #[tokio::main]
/// async fn main() -> livr::Result<()> {
///     let connection = Livr::listen(&StreamConfig::default()).await?;
///     // Use connection...
///     Ok(())
/// }
/// ```
///
/// ## Captured datagrams
/// ```rust,no_run
/// use livr::{Livr, StreamConfig};
///
/// #[tokio::main]
/// async fn main() -> livr::Result<()> {
///     let captured: Vec<Vec<u8>> = Vec::new();
///     let connection = Livr::replay(captured, &StreamConfig::default())?;
///     // Use connection...
///     Ok(())
/// }
/// ```
pub struct Livr;

impl Livr {
    /// Listen for datagrams on `receiver.bind_addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is inconsistent or the address
    /// cannot be bound.
    pub async fn listen(config: &StreamConfig) -> Result<ReceiverConnection> {
        ReceiverConnection::listen(config).await
    }

    /// Run the receive pipeline over previously captured datagrams.
    ///
    /// Frames are identical to what live reception of the same datagrams in
    /// the same order would produce. Must be called from within a tokio
    /// runtime.
    pub fn replay(
        datagrams: impl IntoIterator<Item = Vec<u8>>,
        config: &StreamConfig,
    ) -> Result<ReceiverConnection> {
        ReceiverConnection::from_source(ReplaySource::new(datagrams), config)
    }

    /// Connect a sender to `sender.target_addr`.
    pub fn sender(config: &StreamConfig) -> Result<DatagramSender> {
        DatagramSender::connect(config)
    }
}
