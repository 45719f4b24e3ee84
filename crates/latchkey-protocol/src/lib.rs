//! Wire protocol for the Latchkey lockbox.
//!
//! This crate is sans-io: it turns commands into frames, frames into typed
//! events, and knows nothing about transports or timing.
//!
//! # Wire format
//!
//! ```text
//! [opcode:1][length:1][payload:N][checksum:1]
//! ```
//!
//! The checksum is the additive 8-bit-truncated sum of all preceding bytes.
//! The opcode byte-space is shared between outbound commands, inbound
//! notifications and inbound error codes. One counter notification stores the
//! total frame length in the length byte instead of the payload length, so
//! [`Frame::decode`] slices the payload from the actual buffer and never
//! trusts the declared length for boundaries.
//!
//! # Example
//!
//! ```
//! use latchkey_core::CodeValue;
//! use latchkey_protocol::{Frame, command::{Command, OpenDoor}, event::DeviceEvent};
//!
//! # fn main() -> latchkey_core::Result<()> {
//! let open = OpenDoor::new(CodeValue::new("1234")?);
//! let frame = open.encode()?;
//! assert_eq!(frame.as_bytes(), &[0x01, 0x04, 0x31, 0x32, 0x33, 0x34, 0xCF]);
//!
//! let reply = Frame::decode(&[0x81, 0x00, 0x81]).expect("valid frame");
//! let event = DeviceEvent::decode(&reply, &Default::default());
//! assert!(matches!(event, DeviceEvent::CodeCheck { accepted: true }));
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod event;
pub mod frame;
pub mod opcode;

pub use frame::Frame;
pub use opcode::Opcode;
