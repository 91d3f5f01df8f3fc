//! Plain data carried between the pipeline stages.
//!
//! - [`Point`] is one LiDAR return as it travels on the wire
//! - [`DecodedPacket`] is the validated contents of one datagram
//! - [`Frame`] is the accumulator's output, a device-time window of points
//! - [`ReportRate`] controls how often statistics observers are woken

mod frame;
mod packet;
mod point;
mod report_rate;

pub use frame::Frame;
pub use packet::DecodedPacket;
pub use point::Point;
pub use report_rate::ReportRate;
