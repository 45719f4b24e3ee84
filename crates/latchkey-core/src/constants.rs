//! Protocol and timing constants shared across the Latchkey workspace.
//!
//! # Wire format
//!
//! Every frame exchanged with the lockbox has the shape:
//!
//! ```text
//! [opcode:1][length:1][payload:N][checksum:1]
//! ```
//!
//! The checksum is the additive 8-bit-truncated sum of all preceding bytes.
//! The length byte holds the payload length for all opcodes except one
//! counter notification that stores the *total frame length* instead — see
//! `latchkey_protocol::opcode::length_is_total`. Decoders therefore never
//! trust the length byte for payload boundaries.

// ============================================================================
// Frame structure
// ============================================================================

/// Bytes before the payload: opcode + length.
pub const FRAME_HEADER_LEN: usize = 2;

/// Trailing checksum byte.
pub const FRAME_CHECKSUM_LEN: usize = 1;

/// Shortest buffer that can be decoded at all (opcode + length).
///
/// Anything shorter is not a frame; the decoder returns `None`.
pub const MIN_FRAME_LEN: usize = 2;

// ============================================================================
// Access codes and credentials
// ============================================================================

/// Minimum digits in an access code.
pub const MIN_CODE_LENGTH: usize = 4;

/// Maximum digits in an access code.
pub const MAX_CODE_LENGTH: usize = 6;

/// On-wire width of an access code field; shorter codes are NUL-padded.
pub const CODE_WIRE_LENGTH: usize = 6;

/// Exact length of the device configuration key (ASCII characters).
///
/// The key authorizes every provisioning command. Commands that need it are
/// rejected locally with a validation error if the key has the wrong length,
/// before any frame is written to the link.
pub const CONFIG_KEY_LENGTH: usize = 8;

// ============================================================================
// Log events
// ============================================================================

/// Leading bytes of every history payload: 24-bit big-endian age in seconds.
pub const LOG_AGE_LEN: usize = 3;

// ============================================================================
// Timing
// ============================================================================

/// Default deadline for a command awaiting its matching response.
///
/// # Value: 5000ms
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5000;

/// Fixed delay between any two commands on the link.
///
/// The firmware drops frames that arrive too soon after it has answered the
/// previous command; the queue waits this long after every settle before
/// transmitting the next request.
///
/// # Value: 250ms
pub const INTER_COMMAND_DELAY_MS: u64 = 250;

/// Cooldown after a failed provisioning task before the engine evaluates the
/// next eligible task. Gives the device time to flush late responses.
///
/// # Value: 2000ms
pub const TASK_FAILURE_COOLDOWN_MS: u64 = 2000;

/// Priority assigned to tasks that do not specify one (lower = more urgent).
pub const DEFAULT_TASK_PRIORITY: u8 = 10;

/// Priority of auto-inserted prerequisite tasks (always runs first).
pub const URGENT_TASK_PRIORITY: u8 = 0;
