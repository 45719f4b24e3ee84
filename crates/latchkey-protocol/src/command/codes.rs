//! Access-code management commands.
//!
//! All of these require the device configuration key and answer with the
//! generic operation success/error notifications.

use super::Command;
use crate::Opcode;
use latchkey_core::{CodeIndex, CodeValue, ConfigKey};

/// Store a master code at a fixed on-device slot.
///
/// The device has no atomic "replace": writing to an occupied slot is
/// undefined. Callers delete the slot first (the provisioning engine inserts
/// that prerequisite automatically).
#[derive(Debug, Clone)]
pub struct CreateMasterCode {
    key: ConfigKey,
    index: CodeIndex,
    code: CodeValue,
}

impl CreateMasterCode {
    #[must_use]
    pub fn new(key: ConfigKey, index: CodeIndex, code: CodeValue) -> Self {
        Self { key, index, code }
    }
}

impl Command for CreateMasterCode {
    fn opcode(&self) -> Opcode {
        Opcode::CreateMasterCode
    }

    fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(15);
        out.extend_from_slice(self.key.as_bytes());
        out.extend_from_slice(&self.code.wire_bytes());
        out.push(self.index.as_u8());
        out
    }
}

/// Store a single-use delivery code.
#[derive(Debug, Clone)]
pub struct CreateSingleUseCode {
    key: ConfigKey,
    code: CodeValue,
}

impl CreateSingleUseCode {
    #[must_use]
    pub fn new(key: ConfigKey, code: CodeValue) -> Self {
        Self { key, code }
    }
}

impl Command for CreateSingleUseCode {
    fn opcode(&self) -> Opcode {
        Opcode::CreateSingleUseCode
    }

    fn payload(&self) -> Vec<u8> {
        key_and_code(&self.key, &self.code)
    }
}

/// Store a multi-use code.
#[derive(Debug, Clone)]
pub struct CreateMultiUseCode {
    key: ConfigKey,
    code: CodeValue,
}

impl CreateMultiUseCode {
    #[must_use]
    pub fn new(key: ConfigKey, code: CodeValue) -> Self {
        Self { key, code }
    }
}

impl Command for CreateMultiUseCode {
    fn opcode(&self) -> Opcode {
        Opcode::CreateMultiUseCode
    }

    fn payload(&self) -> Vec<u8> {
        key_and_code(&self.key, &self.code)
    }
}

/// Delete the master code stored at a slot.
#[derive(Debug, Clone)]
pub struct DeleteMasterCode {
    key: ConfigKey,
    index: CodeIndex,
}

impl DeleteMasterCode {
    #[must_use]
    pub fn new(key: ConfigKey, index: CodeIndex) -> Self {
        Self { key, index }
    }
}

impl Command for DeleteMasterCode {
    fn opcode(&self) -> Opcode {
        Opcode::DeleteMasterCode
    }

    fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(9);
        out.extend_from_slice(self.key.as_bytes());
        out.push(self.index.as_u8());
        out
    }
}

/// Delete a single-use code by value.
#[derive(Debug, Clone)]
pub struct DeleteSingleUseCode {
    key: ConfigKey,
    code: CodeValue,
}

impl DeleteSingleUseCode {
    #[must_use]
    pub fn new(key: ConfigKey, code: CodeValue) -> Self {
        Self { key, code }
    }
}

impl Command for DeleteSingleUseCode {
    fn opcode(&self) -> Opcode {
        Opcode::DeleteSingleUseCode
    }

    fn payload(&self) -> Vec<u8> {
        key_and_code(&self.key, &self.code)
    }
}

/// Delete a multi-use code by value.
#[derive(Debug, Clone)]
pub struct DeleteMultiUseCode {
    key: ConfigKey,
    code: CodeValue,
}

impl DeleteMultiUseCode {
    #[must_use]
    pub fn new(key: ConfigKey, code: CodeValue) -> Self {
        Self { key, code }
    }
}

impl Command for DeleteMultiUseCode {
    fn opcode(&self) -> Opcode {
        Opcode::DeleteMultiUseCode
    }

    fn payload(&self) -> Vec<u8> {
        key_and_code(&self.key, &self.code)
    }
}

/// Re-enable a consumed single/multi-use code.
#[derive(Debug, Clone)]
pub struct ReactivateCode {
    key: ConfigKey,
    code: CodeValue,
}

impl ReactivateCode {
    #[must_use]
    pub fn new(key: ConfigKey, code: CodeValue) -> Self {
        Self { key, code }
    }
}

impl Command for ReactivateCode {
    fn opcode(&self) -> Opcode {
        Opcode::ReactivateCode
    }

    fn payload(&self) -> Vec<u8> {
        key_and_code(&self.key, &self.code)
    }
}

/// Ask the device how many codes it currently stores.
///
/// Answers with the codes-count notification (or, on some firmware, a logs
/// count — the matching table accepts both).
#[derive(Debug, Clone, Default)]
pub struct CountCodes;

impl Command for CountCodes {
    fn opcode(&self) -> Opcode {
        Opcode::CountCodes
    }

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

fn key_and_code(key: &ConfigKey, code: &CodeValue) -> Vec<u8> {
    let mut out = Vec::with_capacity(14);
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(&code.wire_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchkey_core::Result;

    fn key() -> ConfigKey {
        ConfigKey::new("AABBCCDD").unwrap()
    }

    fn hex(bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_create_master_code_exact_bytes() -> Result<()> {
        let cmd = CreateMasterCode::new(key(), CodeIndex::new(1), CodeValue::new("1234")?);
        let frame = cmd.encode()?;
        assert_eq!(
            hex(frame.as_bytes()),
            "11 0F 41 41 42 42 43 43 44 44 31 32 33 34 00 00 01 FF"
        );
        Ok(())
    }

    #[test]
    fn test_create_single_use_exact_bytes() -> Result<()> {
        let cmd = CreateSingleUseCode::new(key(), CodeValue::new("1234")?);
        let frame = cmd.encode()?;
        assert_eq!(
            hex(frame.as_bytes()),
            "12 0E 41 41 42 42 43 43 44 44 31 32 33 34 00 00 FE"
        );
        Ok(())
    }

    #[test]
    fn test_create_multi_use_exact_bytes() -> Result<()> {
        let cmd = CreateMultiUseCode::new(key(), CodeValue::new("1234")?);
        let frame = cmd.encode()?;
        assert_eq!(
            hex(frame.as_bytes()),
            "13 0E 41 41 42 42 43 43 44 44 31 32 33 34 00 00 FF"
        );
        Ok(())
    }

    #[test]
    fn test_delete_master_exact_bytes() -> Result<()> {
        let cmd = DeleteMasterCode::new(key(), CodeIndex::new(1));
        let frame = cmd.encode()?;
        assert_eq!(hex(frame.as_bytes()), "0C 09 41 41 42 42 43 43 44 44 01 2A");
        Ok(())
    }

    #[test]
    fn test_delete_single_use_exact_bytes() -> Result<()> {
        let cmd = DeleteSingleUseCode::new(key(), CodeValue::new("1234")?);
        let frame = cmd.encode()?;
        assert_eq!(
            hex(frame.as_bytes()),
            "0D 0E 41 41 42 42 43 43 44 44 31 32 33 34 00 00 F9"
        );
        Ok(())
    }

    #[test]
    fn test_delete_multi_use_exact_bytes() -> Result<()> {
        let cmd = DeleteMultiUseCode::new(key(), CodeValue::new("1234")?);
        let frame = cmd.encode()?;
        assert_eq!(
            hex(frame.as_bytes()),
            "0E 0E 41 41 42 42 43 43 44 44 31 32 33 34 00 00 FA"
        );
        Ok(())
    }

    #[test]
    fn test_count_codes_empty_payload() -> Result<()> {
        let frame = CountCodes.encode()?;
        assert_eq!(frame.as_bytes(), &[0x14, 0x00, 0x14]);
        Ok(())
    }
}
