//! Outbound command builders.
//!
//! Each command is a small struct validating its inputs at construction and
//! encoding itself into a [`Frame`]. Payload layouts:
//!
//! | Command | Payload |
//! |---|---|
//! | OpenDoor | PIN digits, unpadded |
//! | CreateMasterCode | key(8) + code(6, NUL-padded) + index(1) |
//! | CreateSingleUseCode / CreateMultiUseCode / ReactivateCode | key(8) + code(6) |
//! | DeleteMasterCode | key(8) + index(1) |
//! | DeleteSingleUseCode / DeleteMultiUseCode | key(8) + code(6) |
//! | SetConfiguration | key(8) + option(1) + enabled(1) |
//! | NfcScanStart | key(8) |
//! | NfcRegister / NfcUnregister | key(8) + uid_len(1) + uid |
//! | status / count / log / system commands | empty |

mod codes;
mod door;
mod logs;
mod nfc;
mod system;

pub use codes::{
    CountCodes, CreateMasterCode, CreateMultiUseCode, CreateSingleUseCode, DeleteMasterCode,
    DeleteMultiUseCode, DeleteSingleUseCode, ReactivateCode,
};
pub use door::{AskDoorStatus, OpenDoor};
pub use logs::{GetLogsCount, RequestLogs};
pub use nfc::{MAX_TAG_UID_LEN, MIN_TAG_UID_LEN, NfcRegister, NfcScanStart, NfcUnregister};
pub use system::{Reboot, SetConfiguration, TestBattery};

use crate::{Frame, Opcode};
use latchkey_core::Result;

/// A request the application can transmit to the lockbox.
///
/// Implementations validate their inputs at construction, so `payload` is
/// infallible; `encode` only fails if a payload cannot fit in a frame.
pub trait Command {
    /// Opcode transmitted in the frame header.
    fn opcode(&self) -> Opcode;

    /// Payload bytes, excluding opcode, length and checksum.
    fn payload(&self) -> Vec<u8>;

    /// Encode the full frame ready for transmission.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the payload exceeds the frame size.
    fn encode(&self) -> Result<Frame> {
        Frame::encode(self.opcode().as_u8(), &self.payload())
    }
}
