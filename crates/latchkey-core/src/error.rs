use thiserror::Error;

/// Error category reported by the device itself.
///
/// The lockbox answers a failed command with a single error opcode; the byte
/// is mapped through this fixed set. Codes outside the table become
/// [`DeviceErrorKind::Unknown`] rather than an error while decoding.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    #[error("unauthorized (configuration key missing or invalid)")]
    Unauthorized,

    #[error("bad request")]
    BadRequest,

    #[error("frame checksum rejected by device")]
    Crc,

    #[error("command not supported by this firmware")]
    Unsupported,

    #[error("operation failed")]
    OperationError,

    #[error("unknown device error 0x{0:02X}")]
    Unknown(u8),
}

#[derive(Error, Debug)]
pub enum Error {
    // Link errors
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timeout waiting for response to opcode 0x{opcode:02X}")]
    Timeout { opcode: u8 },

    // Protocol errors (diagnostic: decoding proceeds best-effort)
    #[error("protocol error: {0}")]
    Protocol(String),

    // Errors reported by the device
    #[error("device error: {0}")]
    Device(DeviceErrorKind),

    // Caller-supplied invalid arguments
    #[error("validation error: {0}")]
    Validation(String),

    // Desired-state store failures
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Returns `true` for the unauthorized device error, which requires the
    /// caller to supply valid credentials before any retry.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Device(DeviceErrorKind::Unauthorized))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_display() {
        let err = Error::Device(DeviceErrorKind::Unauthorized);
        assert!(err.to_string().contains("unauthorized"));
        assert!(err.is_unauthorized());
    }

    #[test]
    fn test_unknown_device_error_keeps_code() {
        let err = Error::Device(DeviceErrorKind::Unknown(0x42));
        assert!(err.to_string().contains("0x42"));
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_timeout_display_includes_opcode() {
        let err = Error::Timeout { opcode: 0x14 };
        assert!(err.to_string().contains("0x14"));
    }
}
