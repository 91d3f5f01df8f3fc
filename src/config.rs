//! Stream configuration.
//!
//! One [`StreamConfig`] describes both ends of a link. Every section has
//! defaults, so a YAML file only needs the keys it changes:
//!
//! ```yaml
//! frame:
//!   period_s: 0.05
//! receiver:
//!   bind_addr: "0.0.0.0:7000"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::protocol::wire::{self, DEFAULT_MAX_DATAGRAM_SIZE, HEADER_SIZE, MAX_UDP_PAYLOAD, POINT_SIZE};
use crate::{Result, StreamError};

/// Batch ceiling matching the sender's fixed filtered-point buffer
pub const DEFAULT_MAX_BATCH_POINTS: usize = 2048;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub protocol: ProtocolConfig,
    pub frame: FrameConfig,
    pub receiver: ReceiverConfig,
    pub sender: SenderConfig,
}

/// Wire-level settings shared by encoder and decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Upper bound on a datagram's size in bytes
    pub max_datagram_size: usize,

    /// Compute checksums when sending and verify them when receiving
    pub checksum: bool,

    /// Sensor id stamped into every datagram sent
    pub sensor_id: u16,
}

/// Frame reconstruction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Device-time window of one frame, in seconds
    pub period_s: f64,

    /// Capacity of the frame buffer in points
    pub max_frame_points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub bind_addr: String,

    /// Bytes reserved for each received datagram
    pub recv_buffer_size: usize,

    /// Frames buffered between the receive task and the consumer
    pub frame_channel_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub target_addr: String,

    /// Largest batch accepted for one scan, larger batches are refused
    pub max_batch_points: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self { max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE, checksum: true, sensor_id: 0 }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { period_s: 0.1, max_frame_points: 120_000 }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9999".to_string(),
            recv_buffer_size: 2048,
            frame_channel_capacity: 8,
        }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self { target_addr: "127.0.0.1:9999".to_string(), max_batch_points: DEFAULT_MAX_BATCH_POINTS }
    }
}

impl ProtocolConfig {
    pub fn max_points_per_datagram(&self) -> usize {
        wire::points_per_datagram(self.max_datagram_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_datagram_size < HEADER_SIZE + POINT_SIZE {
            return Err(StreamError::config_error(format!(
                "protocol.max_datagram_size {} leaves no room for a {} byte header and one {} byte point",
                self.max_datagram_size, HEADER_SIZE, POINT_SIZE
            )));
        }
        if self.max_datagram_size > MAX_UDP_PAYLOAD {
            return Err(StreamError::config_error(format!(
                "protocol.max_datagram_size {} exceeds the UDP payload limit {}",
                self.max_datagram_size, MAX_UDP_PAYLOAD
            )));
        }
        Ok(())
    }
}

impl FrameConfig {
    /// Frame period in device-clock nanoseconds
    pub fn period_ns(&self) -> u64 {
        (self.period_s * 1e9).round() as u64
    }

    /// Frames per second implied by the period
    pub fn frame_rate_hz(&self) -> f64 {
        1.0 / self.period_s
    }

    pub fn validate(&self) -> Result<()> {
        if !self.period_s.is_finite() || self.period_s <= 0.0 || self.period_ns() == 0 {
            return Err(StreamError::config_error(format!(
                "frame.period_s must be a positive number of seconds, got {}",
                self.period_s
            )));
        }
        if self.max_frame_points == 0 {
            return Err(StreamError::config_error("frame.max_frame_points must be at least 1"));
        }
        Ok(())
    }
}

impl StreamConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: StreamConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| StreamError::parse_error("stream config", e.to_string()))?;
        config.validate()?;
        debug!(?config, "Loaded stream config");
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| StreamError::io_error(format!("read config {}", path.display()), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml_ng::to_string(self)
            .map_err(|e| StreamError::parse_error("stream config", e.to_string()))
    }

    /// Check the sections against each other as well as individually
    pub fn validate(&self) -> Result<()> {
        self.protocol.validate()?;
        self.frame.validate()?;

        if self.receiver.recv_buffer_size < self.protocol.max_datagram_size {
            return Err(StreamError::config_error(format!(
                "receiver.recv_buffer_size {} is smaller than protocol.max_datagram_size {}",
                self.receiver.recv_buffer_size, self.protocol.max_datagram_size
            )));
        }
        if self.receiver.frame_channel_capacity == 0 {
            return Err(StreamError::config_error(
                "receiver.frame_channel_capacity must be at least 1",
            ));
        }
        if self.sender.max_batch_points == 0 {
            return Err(StreamError::config_error("sender.max_batch_points must be at least 1"));
        }
        Ok(())
    }
}
