//! Sending side of the link.

mod sender;

pub use sender::{DatagramSender, SendReport};
