//! NFC tag registration commands.

use super::Command;
use crate::Opcode;
use latchkey_core::{ConfigKey, Error, Result};

/// Minimum NFC tag UID length in bytes (per ISO 14443).
pub const MIN_TAG_UID_LEN: usize = 4;

/// Maximum NFC tag UID length in bytes (per ISO 14443).
pub const MAX_TAG_UID_LEN: usize = 10;

fn validate_uid(uid: &[u8]) -> Result<()> {
    if !(MIN_TAG_UID_LEN..=MAX_TAG_UID_LEN).contains(&uid.len()) {
        return Err(Error::Validation(format!(
            "tag UID must be {MIN_TAG_UID_LEN}-{MAX_TAG_UID_LEN} bytes, got {}",
            uid.len()
        )));
    }
    Ok(())
}

/// Put the device into tag-registration scan mode.
///
/// The device acknowledges the scan start, then later pushes a scan-result
/// notification (or a timeout / already-registered notification) when a tag
/// is presented.
#[derive(Debug, Clone)]
pub struct NfcScanStart {
    key: ConfigKey,
}

impl NfcScanStart {
    #[must_use]
    pub fn new(key: ConfigKey) -> Self {
        Self { key }
    }
}

impl Command for NfcScanStart {
    fn opcode(&self) -> Opcode {
        Opcode::NfcScanStart
    }

    fn payload(&self) -> Vec<u8> {
        self.key.as_bytes().to_vec()
    }
}

/// Register a scanned tag UID.
#[derive(Debug, Clone)]
pub struct NfcRegister {
    key: ConfigKey,
    uid: Vec<u8>,
}

impl NfcRegister {
    /// # Errors
    /// Returns `Error::Validation` if the UID length is outside 4-10 bytes.
    pub fn new(key: ConfigKey, uid: Vec<u8>) -> Result<Self> {
        validate_uid(&uid)?;
        Ok(Self { key, uid })
    }
}

impl Command for NfcRegister {
    fn opcode(&self) -> Opcode {
        Opcode::NfcRegister
    }

    fn payload(&self) -> Vec<u8> {
        key_and_uid(&self.key, &self.uid)
    }
}

/// Remove a registered tag UID.
#[derive(Debug, Clone)]
pub struct NfcUnregister {
    key: ConfigKey,
    uid: Vec<u8>,
}

impl NfcUnregister {
    /// # Errors
    /// Returns `Error::Validation` if the UID length is outside 4-10 bytes.
    pub fn new(key: ConfigKey, uid: Vec<u8>) -> Result<Self> {
        validate_uid(&uid)?;
        Ok(Self { key, uid })
    }
}

impl Command for NfcUnregister {
    fn opcode(&self) -> Opcode {
        Opcode::NfcUnregister
    }

    fn payload(&self) -> Vec<u8> {
        key_and_uid(&self.key, &self.uid)
    }
}

fn key_and_uid(key: &ConfigKey, uid: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.as_bytes().len() + 1 + uid.len());
    out.extend_from_slice(key.as_bytes());
    out.push(uid.len() as u8);
    out.extend_from_slice(uid);
    out
}
