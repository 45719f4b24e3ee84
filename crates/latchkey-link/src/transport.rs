//! Transport abstraction.
//!
//! The core needs exactly two things from a physical link: a way to send
//! bytes and a stream of link events (inbound frames plus connection
//! lifecycle). Pairing, service discovery and reconnection policy live in
//! the embedding application.

use bytes::Bytes;
use latchkey_core::Result;
use tokio::sync::mpsc;

/// Event emitted by a transport implementation.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// The physical session is established and writable.
    Connected,
    /// The physical session dropped. The queue clears all pending and
    /// in-flight commands when it sees this.
    Disconnected,
    /// One inbound notification, raw bytes as received.
    Frame(Bytes),
}

/// Byte-level writer for the half-duplex link.
///
/// Implementations deliver each buffer as a single write (one GATT
/// write-with-response in the BLE case). Inbound traffic travels separately
/// through a [`LinkEvent`] channel handed to
/// [`CommandQueue::spawn`](crate::CommandQueue::spawn).
pub trait Transport: Send + 'static {
    /// Transmit one frame.
    ///
    /// # Errors
    /// Returns `Error::Transport` if the link is down or the write failed.
    fn write(&mut self, frame: Bytes) -> impl Future<Output = Result<()>> + Send;
}

/// Channel pair used to feed link events to the queue.
///
/// Unbounded on purpose: notifications must never be dropped for
/// backpressure, and the device paces itself far below any realistic
/// consumer.
#[must_use]
pub fn link_channel() -> (
    mpsc::UnboundedSender<LinkEvent>,
    mpsc::UnboundedReceiver<LinkEvent>,
) {
    mpsc::unbounded_channel()
}
