use crate::{
    Result,
    constants::{CODE_WIRE_LENGTH, CONFIG_KEY_LENGTH, MAX_CODE_LENGTH, MIN_CODE_LENGTH},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Identifier of a paired lockbox.
///
/// The transport layer hands us an opaque platform identifier (typically the
/// BLE peripheral id); the library only requires it to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new device ID.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the identifier is empty.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::Validation("device id must not be empty".into()));
        }
        Ok(DeviceId(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DeviceId::new(s)
    }
}

/// Access code value (4-6 ASCII digits).
///
/// On the wire a code always occupies 6 bytes, NUL-padded on the right.
///
/// # Security
/// This type implements constant-time comparison to avoid leaking how many
/// leading digits of a code matched.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct CodeValue(String);

impl CodeValue {
    /// Create a new access code with validation.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the code is not 4-6 ASCII digits.
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim();

        let len = code.len();
        if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&len) {
            return Err(Error::Validation(format!(
                "access code must be {MIN_CODE_LENGTH}-{MAX_CODE_LENGTH} digits, got {len}"
            )));
        }

        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Validation(
                "access code must contain only ASCII digits".to_string(),
            ));
        }

        Ok(CodeValue(code.to_string()))
    }

    /// Get the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 6-byte wire representation, NUL-padded on the right.
    #[must_use]
    pub fn wire_bytes(&self) -> [u8; CODE_WIRE_LENGTH] {
        let mut out = [0u8; CODE_WIRE_LENGTH];
        out[..self.0.len()].copy_from_slice(self.0.as_bytes());
        out
    }
}

impl fmt::Display for CodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CodeValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CodeValue::new(s)
    }
}

/// Constant-time comparison implementation for CodeValue
impl PartialEq for CodeValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for CodeValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Device configuration key (exactly 8 ASCII characters).
///
/// Required by every provisioning command; compared in constant time.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct ConfigKey(String);

impl ConfigKey {
    /// Create a configuration key with validation.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the key is not exactly 8 ASCII
    /// characters.
    pub fn new(key: &str) -> Result<Self> {
        if key.len() != CONFIG_KEY_LENGTH || !key.is_ascii() {
            return Err(Error::Validation(format!(
                "configuration key must be exactly {CONFIG_KEY_LENGTH} ASCII characters"
            )));
        }
        Ok(ConfigKey(key.to_string()))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl PartialEq for ConfigKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl fmt::Display for ConfigKey {
    // Never print the key itself.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigKey(****)")
    }
}

/// Kind of access code stored on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeType {
    /// Permanent code stored at a fixed on-device slot.
    Master,
    /// One-shot delivery code, invalidated after first use.
    SingleUse,
    /// Reusable code with a bounded number of uses.
    MultiUse,
}

impl CodeType {
    /// Ordering rank used by the provisioning scheduler: master codes are
    /// provisioned before single-use, single-use before multi-use.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            CodeType::Master => 1,
            CodeType::SingleUse => 2,
            CodeType::MultiUse => 3,
        }
    }
}

impl fmt::Display for CodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeType::Master => write!(f, "master"),
            CodeType::SingleUse => write!(f, "single-use"),
            CodeType::MultiUse => write!(f, "multi-use"),
        }
    }
}

/// On-device slot index of a master code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeIndex(u8);

impl CodeIndex {
    #[must_use]
    pub fn new(index: u8) -> Self {
        CodeIndex(index)
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl fmt::Display for CodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bluetooth MAC address attached to some history events.
///
/// The firmware transmits the six bytes in reverse (little-endian) order;
/// [`MacAddress::from_wire`] normalizes to conventional big-endian display
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Build from the on-wire (reversed) byte order.
    #[must_use]
    pub fn from_wire(wire: [u8; 6]) -> Self {
        let mut bytes = wire;
        bytes.reverse();
        MacAddress(bytes)
    }

    /// Build from display (big-endian) byte order.
    #[must_use]
    pub fn from_display(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    #[must_use]
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1234")]
    #[case("12345")]
    #[case("123456")]
    fn test_code_value_valid(#[case] input: &str) {
        let code = CodeValue::new(input).unwrap();
        assert_eq!(code.as_str(), input);
    }

    #[rstest]
    #[case("123")] // too short
    #[case("1234567")] // too long
    #[case("12a456")] // non-digit
    #[case("")] // empty
    fn test_code_value_invalid(#[case] input: &str) {
        assert!(CodeValue::new(input).is_err());
    }

    #[test]
    fn test_code_value_wire_padding() {
        let code = CodeValue::new("1234").unwrap();
        assert_eq!(code.wire_bytes(), [0x31, 0x32, 0x33, 0x34, 0x00, 0x00]);

        let full = CodeValue::new("987654").unwrap();
        assert_eq!(full.wire_bytes(), *b"987654");
    }

    #[test]
    fn test_config_key_length() {
        assert!(ConfigKey::new("ABCDEFGH").is_ok());
        assert!(ConfigKey::new("ABCDEFG").is_err());
        assert!(ConfigKey::new("ABCDEFGHI").is_err());
    }

    #[test]
    fn test_config_key_display_is_masked() {
        let key = ConfigKey::new("ABCDEFGH").unwrap();
        assert!(!key.to_string().contains("ABCDEFGH"));
    }

    #[test]
    fn test_code_type_rank_ordering() {
        assert!(CodeType::Master.rank() < CodeType::SingleUse.rank());
        assert!(CodeType::SingleUse.rank() < CodeType::MultiUse.rank());
    }

    #[test]
    fn test_mac_address_wire_normalization() {
        let mac = MacAddress::from_wire([0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);
        assert_eq!(mac.to_string(), "11:22:33:44:55:66");
    }

    #[test]
    fn test_device_id_rejects_empty() {
        assert!(DeviceId::new("").is_err());
        assert!(DeviceId::new("  ").is_err());
        assert!(DeviceId::new("d4:f1").is_ok());
    }
}
