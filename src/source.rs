//! Source trait for incoming datagrams

use crate::Result;

/// Anything that yields raw datagrams to a receive pipeline.
///
/// Sources handle their own timing: a UDP source waits on the socket, a
/// replay source paces captured datagrams or releases them immediately.
#[async_trait::async_trait]
pub trait DatagramSource: Send + 'static {
    /// Wait for the next datagram and copy it into `buf`.
    ///
    /// Returns:
    /// - `Ok(Some(len))` - a datagram of `len` bytes is at the start of `buf`
    /// - `Ok(None)` - the source is exhausted
    /// - `Err(e)` - receive failed; the caller decides whether to retry
    ///
    /// A datagram longer than `buf` is truncated. The decoder rejects the
    /// result on length, so callers size `buf` for the largest valid datagram.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>>;

    /// Short human-readable name, e.g. `udp://0.0.0.0:9999`
    fn describe(&self) -> String;
}
