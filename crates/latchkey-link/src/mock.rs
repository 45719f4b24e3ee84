//! Mock transport for testing and development.
//!
//! Simulates the lockbox link without hardware: captures every written
//! frame, optionally answers writes from a script, and lets tests inject
//! arbitrary link events through a handle.

use crate::transport::{LinkEvent, Transport, link_channel};
use bytes::Bytes;
use latchkey_core::{Error, Result};
use latchkey_protocol::Frame;
use std::collections::VecDeque;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::mpsc;

#[derive(Default)]
struct Shared {
    /// One entry per expected write; each entry is the set of frames the
    /// device pushes back for that write. Consumed front to back.
    script: Mutex<VecDeque<Vec<Frame>>>,
    fail_writes: AtomicBool,
}

/// Mock implementation of [`Transport`].
///
/// Created together with a [`MockTransportHandle`] and the link-event
/// receiver to hand to [`CommandQueue::spawn`](crate::CommandQueue::spawn):
///
/// ```
/// use latchkey_link::{CommandQueue, mock::MockTransport};
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() {
/// let (transport, handle, events) = MockTransport::new();
/// let queue = CommandQueue::spawn(transport, events);
/// # drop((queue, handle));
/// # }
/// ```
pub struct MockTransport {
    shared: Arc<Shared>,
    writes: mpsc::UnboundedSender<Bytes>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl MockTransport {
    /// Create a mock link: the transport, its controlling handle, and the
    /// event receiver for the queue.
    #[must_use]
    pub fn new() -> (
        Self,
        MockTransportHandle,
        mpsc::UnboundedReceiver<LinkEvent>,
    ) {
        let (events_tx, events_rx) = link_channel();
        let (writes_tx, writes_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let transport = Self {
            shared: Arc::clone(&shared),
            writes: writes_tx,
            events: events_tx.clone(),
        };
        let handle = MockTransportHandle {
            shared,
            writes: writes_rx,
            events: events_tx,
        };
        (transport, handle, events_rx)
    }
}

impl Transport for MockTransport {
    fn write(&mut self, frame: Bytes) -> impl Future<Output = Result<()>> + Send {
        let shared = Arc::clone(&self.shared);
        let writes = self.writes.clone();
        let events = self.events.clone();
        async move {
            if shared.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::Transport("mock write failure".into()));
            }

            let _ = writes.send(frame);

            // Scripted device: answer this write with the next reply set.
            let replies = shared
                .script
                .lock()
                .expect("script lock")
                .pop_front()
                .unwrap_or_default();
            for reply in replies {
                let _ = events.send(LinkEvent::Frame(reply.to_bytes()));
            }
            Ok(())
        }
    }
}

/// Controlling handle for a [`MockTransport`].
pub struct MockTransportHandle {
    shared: Arc<Shared>,
    writes: mpsc::UnboundedReceiver<Bytes>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl MockTransportHandle {
    /// Script the device's answer to the next unanswered write. Calls
    /// accumulate: the first write consumes the first script entry, and so
    /// on. Writes beyond the script get no answer (timeout paths).
    pub fn reply_with(&self, frames: Vec<Frame>) {
        self.shared
            .script
            .lock()
            .expect("script lock")
            .push_back(frames);
    }

    /// Script an unanswered write.
    pub fn swallow_next_write(&self) {
        self.reply_with(Vec::new());
    }

    /// Make subsequent writes fail with a transport error.
    pub fn fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Inject an unsolicited inbound frame.
    pub fn push_frame(&self, frame: &Frame) {
        let _ = self.events.send(LinkEvent::Frame(frame.to_bytes()));
    }

    /// Inject raw inbound bytes (may be unparsable on purpose).
    pub fn push_bytes(&self, bytes: &[u8]) {
        let _ = self
            .events
            .send(LinkEvent::Frame(Bytes::copy_from_slice(bytes)));
    }

    /// Inject a connection lifecycle event.
    pub fn push_event(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }

    /// Await the next frame written to the link.
    pub async fn next_write(&mut self) -> Option<Frame> {
        let bytes = self.writes.recv().await?;
        Frame::decode(&bytes)
    }

    /// Drain whatever writes have happened so far, without waiting.
    pub fn drain_writes(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Ok(bytes) = self.writes.try_recv() {
            if let Some(frame) = Frame::decode(&bytes) {
                out.push(frame);
            }
        }
        out
    }
}
