//! Consumer-facing handle on a running receive pipeline

mod receiver;

pub use receiver::ReceiverConnection;
