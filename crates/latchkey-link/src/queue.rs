//! The serializing command queue.
//!
//! All queue state lives inside one worker task; the public handle only
//! sends control messages, so every state transition happens in a single
//! place and can be reasoned about (and tested) sequentially.

use crate::transport::{LinkEvent, Transport};
use latchkey_core::{
    DeviceErrorKind, Error, Result,
    constants::{DEFAULT_COMMAND_TIMEOUT_MS, INTER_COMMAND_DELAY_MS},
};
use latchkey_protocol::{
    Frame,
    command::Command,
    opcode::{device_error_kind, is_generic_error, is_response_to},
};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, sleep_until};

/// Decision a custom classifier takes for an inbound frame relative to the
/// in-flight command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Settle the command with this frame (or the accumulated sequence).
    Finish,
    /// Append to the accumulation buffer and re-arm the sliding timeout.
    Continue,
    /// Not ours; leave the frame to passive subscribers.
    Ignore,
}

/// Caller-supplied response classifier, replacing the opcode-table default.
pub type MatchStrategy = Box<dyn FnMut(&Frame) -> MatchOutcome + Send>;

/// Per-command options.
pub struct SendOptions {
    /// Deadline for the (first) matching response. Also the sliding window
    /// between frames of a streamed response.
    pub timeout: Duration,
    /// Settle immediately after a successful write; install no timeout.
    pub fire_and_forget: bool,
    /// Custom classifier. When set it fully replaces the default matching,
    /// including device-error handling.
    pub strategy: Option<MatchStrategy>,
}

impl SendOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn fire_and_forget(mut self) -> Self {
        self.fire_and_forget = true;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: impl FnMut(&Frame) -> MatchOutcome + Send + 'static) -> Self {
        self.strategy = Some(Box::new(strategy));
        self
    }
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            fire_and_forget: false,
            strategy: None,
        }
    }
}

impl std::fmt::Debug for SendOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendOptions")
            .field("timeout", &self.timeout)
            .field("fire_and_forget", &self.fire_and_forget)
            .field("strategy", &self.strategy.as_ref().map(|_| "custom"))
            .finish()
    }
}

/// What a settled command resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Fire-and-forget: the write succeeded, nothing was awaited.
    Sent,
    /// The single matching frame.
    Single(Frame),
    /// Accumulated frames of a streamed response, in arrival order.
    Stream(Vec<Frame>),
}

impl Response {
    /// The settling frame, if there is exactly one.
    #[must_use]
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            Response::Single(frame) => Some(frame),
            _ => None,
        }
    }

    /// All frames carried by this response.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        match self {
            Response::Sent => &[],
            Response::Single(frame) => std::slice::from_ref(frame),
            Response::Stream(frames) => frames,
        }
    }
}

struct Pending {
    frame: Frame,
    options: SendOptions,
    reply: oneshot::Sender<Result<Response>>,
}

struct InFlight {
    pending: Pending,
    accumulated: Vec<Frame>,
}

enum Msg {
    Send(Pending),
    Inbound(Frame),
    Clear,
}

/// Serializes commands over a half-duplex link.
///
/// Exactly one command is in flight at any time; a fixed inter-command delay
/// separates consecutive transmissions. Inbound frames are matched against
/// the in-flight command only — anything classified [`MatchOutcome::Ignore`]
/// (or arriving while nothing is in flight) is forwarded unmodified to
/// passive subscribers and never misattributed.
///
/// # Cancellation
///
/// [`CommandQueue::clear`] (and a transport [`LinkEvent::Disconnected`])
/// discards all pending and in-flight entries. Their callers resolve with a
/// transport-cancellation error; correlate it with the disconnect signal.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    control: mpsc::UnboundedSender<Msg>,
    passive: broadcast::Sender<Frame>,
}

impl CommandQueue {
    /// Spawn the queue worker over a transport and its event stream.
    #[must_use]
    pub fn spawn<T: Transport>(
        transport: T,
        events: mpsc::UnboundedReceiver<LinkEvent>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (passive_tx, _) = broadcast::channel(64);
        let worker = Worker {
            transport,
            control: control_rx,
            events,
            events_open: true,
            passive: passive_tx.clone(),
            queue: VecDeque::new(),
            inflight: None,
            deadline: None,
            not_before: Instant::now(),
        };
        tokio::spawn(worker.run());
        Self {
            control: control_tx,
            passive: passive_tx,
        }
    }

    /// Enqueue a command and await its correlated response.
    ///
    /// # Errors
    /// - `Error::Timeout` if no matching response arrived in time
    /// - `Error::Device` if the device answered with an error opcode
    ///   (default matching only)
    /// - `Error::Transport` if the write failed, the queue was cleared, or
    ///   the link dropped
    pub async fn send(&self, command: &impl Command, options: SendOptions) -> Result<Response> {
        self.send_frame(command.encode()?, options).await
    }

    /// Enqueue an already-encoded frame. See [`CommandQueue::send`].
    pub async fn send_frame(&self, frame: Frame, options: SendOptions) -> Result<Response> {
        let (reply, rx) = oneshot::channel();
        self.control
            .send(Msg::Send(Pending {
                frame,
                options,
                reply,
            }))
            .map_err(|_| Error::Transport("command queue stopped".into()))?;
        rx.await
            .map_err(|_| Error::Transport("command queue cleared".into()))?
    }

    /// Feed one decoded inbound frame (for integrations not using the
    /// [`LinkEvent`] channel).
    pub fn handle_frame(&self, frame: Frame) {
        let _ = self.control.send(Msg::Inbound(frame));
    }

    /// Discard all pending and in-flight commands.
    pub fn clear(&self) {
        let _ = self.control.send(Msg::Clear);
    }

    /// Subscribe to frames not consumed by the in-flight command.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.passive.subscribe()
    }
}

struct Worker<T: Transport> {
    transport: T,
    control: mpsc::UnboundedReceiver<Msg>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    events_open: bool,
    passive: broadcast::Sender<Frame>,
    queue: VecDeque<Pending>,
    inflight: Option<InFlight>,
    deadline: Option<Instant>,
    not_before: Instant,
}

impl<T: Transport> Worker<T> {
    async fn run(mut self) {
        let inter_delay = Duration::from_millis(INTER_COMMAND_DELAY_MS);

        loop {
            let can_dispatch = self.inflight.is_none() && !self.queue.is_empty();
            let dispatch_at = self.not_before;
            let deadline = self.deadline;

            tokio::select! {
                msg = self.control.recv() => match msg {
                    Some(Msg::Send(pending)) => self.queue.push_back(pending),
                    Some(Msg::Inbound(frame)) => self.on_frame(frame),
                    Some(Msg::Clear) => self.clear_all(),
                    // Every handle dropped; nothing can reach us anymore.
                    None => return,
                },
                event = self.events.recv(), if self.events_open => match event {
                    Some(LinkEvent::Frame(bytes)) => match Frame::decode(&bytes) {
                        Some(frame) => {
                            if !frame.checksum_valid() {
                                tracing::warn!(%frame, "inbound frame failed checksum");
                            }
                            self.on_frame(frame);
                        }
                        None => tracing::warn!(len = bytes.len(), "unparsable inbound bytes"),
                    },
                    Some(LinkEvent::Connected) => {
                        tracing::debug!("link connected");
                    }
                    Some(LinkEvent::Disconnected) => {
                        tracing::info!("link disconnected, clearing queue");
                        self.clear_all();
                    }
                    // Transport gone; keep serving the control side so
                    // callers get deterministic errors.
                    None => {
                        self.events_open = false;
                        self.clear_all();
                    }
                },
                () = sleep_until(dispatch_at), if can_dispatch => {
                    self.dispatch(inter_delay).await;
                }
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_timeout(inter_delay);
                }
            }
        }
    }

    /// Transmit the next queued command. Called only while idle.
    async fn dispatch(&mut self, inter_delay: Duration) {
        let Some(pending) = self.queue.pop_front() else {
            return;
        };

        let opcode = pending.frame.opcode();
        tracing::debug!(opcode = format!("0x{opcode:02X}"), "transmitting command");

        match self.transport.write(pending.frame.to_bytes()).await {
            Ok(()) => {
                if pending.options.fire_and_forget {
                    let _ = pending.reply.send(Ok(Response::Sent));
                    self.not_before = Instant::now() + inter_delay;
                } else {
                    self.deadline = Some(Instant::now() + pending.options.timeout);
                    self.inflight = Some(InFlight {
                        pending,
                        accumulated: Vec::new(),
                    });
                }
            }
            Err(err) => {
                tracing::warn!(opcode = format!("0x{opcode:02X}"), %err, "write failed");
                let _ = pending.reply.send(Err(err));
                self.not_before = Instant::now() + inter_delay;
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) {
        let outcome = {
            let Some(inflight) = self.inflight.as_mut() else {
                // Nothing in flight: purely a passive notification.
                let _ = self.passive.send(frame);
                return;
            };
            match inflight.pending.options.strategy.as_mut() {
                Some(strategy) => strategy(&frame),
                None => {
                    if is_response_to(inflight.pending.frame.opcode(), frame.opcode()) {
                        MatchOutcome::Finish
                    } else {
                        MatchOutcome::Ignore
                    }
                }
            }
        };

        match outcome {
            MatchOutcome::Finish => {
                if let Some(inflight) = self.inflight.take() {
                    self.deadline = None;
                    self.not_before =
                        Instant::now() + Duration::from_millis(INTER_COMMAND_DELAY_MS);
                    let (reply, result) = settle(inflight, frame);
                    let _ = reply.send(result);
                }
            }
            MatchOutcome::Continue => {
                // Sliding timeout: a stream stays alive as long as frames
                // keep arriving inside the window.
                if let Some(inflight) = self.inflight.as_mut() {
                    self.deadline = Some(Instant::now() + inflight.pending.options.timeout);
                    inflight.accumulated.push(frame);
                }
            }
            MatchOutcome::Ignore => {
                let _ = self.passive.send(frame);
            }
        }
    }

    fn on_timeout(&mut self, inter_delay: Duration) {
        self.deadline = None;
        if let Some(inflight) = self.inflight.take() {
            let opcode = inflight.pending.frame.opcode();
            tracing::warn!(opcode = format!("0x{opcode:02X}"), "command timed out");
            let _ = inflight.pending.reply.send(Err(Error::Timeout { opcode }));
            self.not_before = Instant::now() + inter_delay;
        }
    }

    /// Drop everything; callers observe the cleared-queue transport error.
    fn clear_all(&mut self) {
        self.deadline = None;
        self.inflight = None;
        self.queue.clear();
    }
}

/// Settle an in-flight command with its finishing frame.
///
/// Default matching rejects with the mapped device error when the settling
/// frame is an error opcode; custom strategies resolve with whatever they
/// finished on.
fn settle(
    inflight: InFlight,
    frame: Frame,
) -> (oneshot::Sender<Result<Response>>, Result<Response>) {
    let InFlight {
        pending,
        mut accumulated,
    } = inflight;

    if pending.options.strategy.is_none() {
        if let Some(kind) = device_error_kind(frame.opcode()) {
            return (pending.reply, Err(Error::Device(kind)));
        }
        if is_generic_error(frame.opcode()) {
            let kind = DeviceErrorKind::Unknown(frame.opcode());
            return (pending.reply, Err(Error::Device(kind)));
        }
    }

    let response = if accumulated.is_empty() {
        Response::Single(frame)
    } else {
        accumulated.push(frame);
        Response::Stream(accumulated)
    };
    (pending.reply, Ok(response))
}
