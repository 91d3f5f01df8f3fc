//! Error types for point streaming.
//!
//! Decode rejections are not errors in this sense: a malformed datagram is an
//! expected event on a lossy link, so [`PacketDecoder`](crate::PacketDecoder)
//! reports it as a [`Rejection`](crate::Rejection) and counts it. Everything
//! that should reach the caller as a failure goes through [`StreamError`].
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use livr::StreamError;
//!
//! let error = StreamError::io_error("bind udp socket", std::io::ErrorKind::AddrInUse.into());
//! if !error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```
//!
//! ## Helper Constructors
//!
//! ```rust
//! use livr::StreamError;
//!
//! let config = StreamError::config_error("frame.period_s must be positive");
//! let parse = StreamError::parse_error("stream config", "expected a mapping");
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for streaming operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for streaming operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("I/O error during {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Batch shape mismatch: {timestamps} timestamps, {point_buffers} point buffers, {sequences} sequences"
    )]
    BatchShape { timestamps: usize, point_buffers: usize, sequences: usize },

    #[error("Malformed point buffer: {len} floats is not a whole number of xyz triples")]
    MalformedPoints { len: usize },

    #[error("Batch of {points} points exceeds the {limit} point ceiling")]
    BatchTooLarge { points: usize, limit: usize },

    #[error("Invalid point count {count} for one datagram (valid range 1..={max})")]
    InvalidPointCount { count: usize, max: usize },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Stream closed: {reason}")]
    Closed { reason: String },
}

impl StreamError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
            ),
            StreamError::Timeout { .. } => true,
            StreamError::Config { .. } => false,
            StreamError::Parse { .. } => false,
            StreamError::BatchShape { .. } => false,
            StreamError::MalformedPoints { .. } => false,
            StreamError::BatchTooLarge { .. } => false,
            StreamError::InvalidPointCount { .. } => false,
            StreamError::Closed { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::Config { .. } => vec![
                "Check the datagram size leaves room for the header and one point",
                "Use a positive frame period and frame capacity",
                "Make the receive buffer at least as large as a datagram",
            ],
            StreamError::Parse { .. } => vec![
                "Check the configuration file is valid YAML",
                "Verify key names against the documented configuration",
            ],
            StreamError::Io { .. } => vec![
                "Check the address is not already bound by another process",
                "Verify the network interface is up",
                "Retry after a short backoff for transient errors",
            ],
            StreamError::BatchShape { .. } => vec![
                "Pass one timestamp and one sequence number per point buffer",
            ],
            StreamError::MalformedPoints { .. } => vec![
                "Supply points as flat x, y, z triples",
                "Check the producer did not truncate the buffer",
            ],
            StreamError::BatchTooLarge { .. } => vec![
                "Decimate or range-gate points before encoding",
                "Split the scan into several batches",
                "Raise sender.max_batch_points if the link can carry it",
            ],
            StreamError::InvalidPointCount { .. } => vec![
                "Segment the batch with PointEncoder::encode_batch",
                "Never encode an empty datagram",
            ],
            StreamError::Timeout { .. } => vec![
                "Increase timeout duration",
                "Verify the sender is transmitting to this address",
            ],
            StreamError::Closed { .. } => vec![
                "Create a new connection",
                "Check the receive task did not stop on repeated source errors",
            ],
        }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(reason: impl Into<String>) -> Self {
        StreamError::Config { reason: reason.into() }
    }

    /// Helper constructor for parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        StreamError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for I/O errors with the failing operation named.
    pub fn io_error(operation: impl Into<String>, source: std::io::Error) -> Self {
        StreamError::Io { operation: operation.into(), source }
    }

    /// Helper constructor for closed-stream errors.
    pub fn closed(reason: impl Into<String>) -> Self {
        StreamError::Closed { reason: reason.into() }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Io { operation: "<unknown>".to_string(), source: err }
    }
}
