//! Door commands.

use super::Command;
use crate::Opcode;
use latchkey_core::CodeValue;

/// Unlock the door with an access code.
///
/// Unlike the provisioning commands this needs no configuration key; the
/// PIN travels unpadded. The device answers valid-code or invalid-code.
#[derive(Debug, Clone)]
pub struct OpenDoor {
    code: CodeValue,
}

impl OpenDoor {
    #[must_use]
    pub fn new(code: CodeValue) -> Self {
        Self { code }
    }
}

impl Command for OpenDoor {
    fn opcode(&self) -> Opcode {
        Opcode::OpenDoor
    }

    fn payload(&self) -> Vec<u8> {
        self.code.as_str().as_bytes().to_vec()
    }
}

/// Poll the current door state (answered with the pull door-status frame).
#[derive(Debug, Clone, Default)]
pub struct AskDoorStatus;

impl Command for AskDoorStatus {
    fn opcode(&self) -> Opcode {
        Opcode::AskDoorStatus
    }

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}
