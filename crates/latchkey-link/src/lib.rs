//! Link layer: transport abstraction and the serializing command queue.
//!
//! The lockbox link is half-duplex and allows exactly one outstanding
//! command; [`CommandQueue`] is the single point of mutual exclusion over
//! it. Commands are matched to their asynchronous responses through the
//! protocol's opcode tables or a caller-supplied classifier, frames nobody
//! claimed fan out to passive subscribers, and severing the transport clears
//! everything in flight.
//!
//! Timing (command deadline, sliding stream timeout, inter-command delay)
//! runs on tokio's clock, so tests drive it deterministically with
//! `tokio::time::pause`.

pub mod mock;
pub mod queue;
pub mod transport;

pub use queue::{CommandQueue, MatchOutcome, Response, SendOptions};
pub use transport::{LinkEvent, Transport};
