//! Opcode tables for the lockbox protocol.
//!
//! A single byte identifies commands (app → device), notifications
//! (device → app) and device errors; all three directions share the same
//! numeric space. Everything direction- or quirk-specific about an opcode is
//! encoded in explicit tables here rather than scattered heuristics:
//! [`length_is_total`] for the length-byte quirk, [`default_responses`] for
//! request/response correlation, [`is_generic_error`] for the error opcodes
//! that satisfy any outstanding command.

use latchkey_core::DeviceErrorKind;

/// Known opcodes of the lockbox protocol.
///
/// Unknown bytes stay representable: [`Opcode::from_u8`] returns `None` and
/// callers fall back to raw handling, so a firmware newer than this table
/// never breaks decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // Commands
    OpenDoor = 0x01,
    AskDoorStatus = 0x02,
    RequestLogs = 0x03,
    Reboot = 0x06,
    GetLogsCount = 0x07,
    TestBattery = 0x08,
    DeleteMasterCode = 0x0C,
    DeleteSingleUseCode = 0x0D,
    DeleteMultiUseCode = 0x0E,
    CreateMasterCode = 0x11,
    CreateSingleUseCode = 0x12,
    CreateMultiUseCode = 0x13,
    CountCodes = 0x14,
    ReactivateCode = 0x15,
    SetConfiguration = 0x16,
    NfcScanStart = 0x17,
    NfcRegister = 0x18,
    NfcUnregister = 0x19,

    // Notifications
    OperationSuccess = 0x77,
    OperationError = 0x78,
    NotifyLogsCount = 0x79,
    NotifyCodesCount = 0x7A,
    SetConfigurationAck = 0x7B,
    ValidOpenCode = 0x81,
    InvalidOpenCode = 0x82,
    NotifyDoorStatus = 0x84,
    AnswerDoorStatus = 0x85,

    // History / log events
    LogCodeBleValid = 0x86,
    LogCodeKeyValid = 0x87,
    LogCodeBleInvalid = 0x88,
    LogCodeKeyInvalid = 0x89,
    LogDoorClose = 0x8A,
    LogDoorOpen = 0x8B,
    LogPowerOff = 0x8D,
    LogBlockReset = 0x8E,
    LogPowerOn = 0x8F,
    LogBleReboot = 0x90,
    LogHistoryErase = 0x91,
    LogEnd = 0x92,
    LogScaleMeasure = 0x93,
    LogKeyOpening = 0x94,
    LogError = 0x95,
    LogNfcOpening = 0x96,
    LogNfcRegistering = 0x97,

    // NFC registration notifications
    NfcScanResult = 0xC5,
    NfcScanAlreadyRegistered = 0xC6,
    NfcScanTimeout = 0xC7,
    NfcRegistered = 0xC8,
    NfcUnregistered = 0xC9,

    // Device errors
    ErrorCrc = 0xE0,
    ErrorUnauthorized = 0xE1,
    ErrorBadRequest = 0xE2,
    ErrorUnsupported = 0xE3,
}

impl Opcode {
    /// Look up a known opcode. Returns `None` for bytes outside the table.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        use Opcode::*;
        Some(match value {
            0x01 => OpenDoor,
            0x02 => AskDoorStatus,
            0x03 => RequestLogs,
            0x06 => Reboot,
            0x07 => GetLogsCount,
            0x08 => TestBattery,
            0x0C => DeleteMasterCode,
            0x0D => DeleteSingleUseCode,
            0x0E => DeleteMultiUseCode,
            0x11 => CreateMasterCode,
            0x12 => CreateSingleUseCode,
            0x13 => CreateMultiUseCode,
            0x14 => CountCodes,
            0x15 => ReactivateCode,
            0x16 => SetConfiguration,
            0x17 => NfcScanStart,
            0x18 => NfcRegister,
            0x19 => NfcUnregister,
            0x77 => OperationSuccess,
            0x78 => OperationError,
            0x79 => NotifyLogsCount,
            0x7A => NotifyCodesCount,
            0x7B => SetConfigurationAck,
            0x81 => ValidOpenCode,
            0x82 => InvalidOpenCode,
            0x84 => NotifyDoorStatus,
            0x85 => AnswerDoorStatus,
            0x86 => LogCodeBleValid,
            0x87 => LogCodeKeyValid,
            0x88 => LogCodeBleInvalid,
            0x89 => LogCodeKeyInvalid,
            0x8A => LogDoorClose,
            0x8B => LogDoorOpen,
            0x8D => LogPowerOff,
            0x8E => LogBlockReset,
            0x8F => LogPowerOn,
            0x90 => LogBleReboot,
            0x91 => LogHistoryErase,
            0x92 => LogEnd,
            0x93 => LogScaleMeasure,
            0x94 => LogKeyOpening,
            0x95 => LogError,
            0x96 => LogNfcOpening,
            0x97 => LogNfcRegistering,
            0xC5 => NfcScanResult,
            0xC6 => NfcScanAlreadyRegistered,
            0xC7 => NfcScanTimeout,
            0xC8 => NfcRegistered,
            0xC9 => NfcUnregistered,
            0xE0 => ErrorCrc,
            0xE1 => ErrorUnauthorized,
            0xE2 => ErrorBadRequest,
            0xE3 => ErrorUnsupported,
            _ => return None,
        })
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Opcodes whose length byte stores the *total frame length* instead of the
/// payload length.
///
/// Observed on the codes-count notification only. Whether the quirk covers a
/// broader "counter" family is unconfirmed; extend this table if another
/// counter-style opcode turns up, do not switch to a range check.
#[must_use]
pub fn length_is_total(opcode: u8) -> bool {
    opcode == Opcode::NotifyCodesCount as u8
}

/// Acceptable response opcodes for a command, used by the default matching
/// strategy of the command queue.
///
/// An empty slice means the command has no dedicated response; only the
/// generic error set ([`is_generic_error`]) can settle it.
#[must_use]
pub fn default_responses(command: u8) -> &'static [u8] {
    const OPEN_DOOR: &[u8] = &[Opcode::ValidOpenCode as u8, Opcode::InvalidOpenCode as u8];
    const DOOR_STATUS: &[u8] = &[
        Opcode::NotifyDoorStatus as u8,
        Opcode::AnswerDoorStatus as u8,
    ];
    const LOGS_COUNT: &[u8] = &[Opcode::NotifyLogsCount as u8];
    // The firmware occasionally answers a code count with a logs count.
    const CODES_COUNT: &[u8] = &[
        Opcode::NotifyCodesCount as u8,
        Opcode::NotifyLogsCount as u8,
    ];
    const CODE_OPERATION: &[u8] = &[
        Opcode::OperationSuccess as u8,
        Opcode::OperationError as u8,
    ];
    const SET_CONFIG: &[u8] = &[
        Opcode::SetConfigurationAck as u8,
        Opcode::OperationSuccess as u8,
    ];
    const NFC_SCAN_START: &[u8] = &[Opcode::OperationSuccess as u8];
    const NFC_REGISTER: &[u8] = &[Opcode::NfcRegistered as u8];
    const NFC_UNREGISTER: &[u8] = &[Opcode::NfcUnregistered as u8];
    const BATTERY: &[u8] = &[Opcode::TestBattery as u8];

    match Opcode::from_u8(command) {
        Some(Opcode::OpenDoor) => OPEN_DOOR,
        Some(Opcode::AskDoorStatus) => DOOR_STATUS,
        Some(Opcode::GetLogsCount) => LOGS_COUNT,
        Some(Opcode::CountCodes) => CODES_COUNT,
        Some(
            Opcode::CreateMasterCode
            | Opcode::CreateSingleUseCode
            | Opcode::CreateMultiUseCode
            | Opcode::DeleteMasterCode
            | Opcode::DeleteSingleUseCode
            | Opcode::DeleteMultiUseCode
            | Opcode::ReactivateCode,
        ) => CODE_OPERATION,
        Some(Opcode::SetConfiguration) => SET_CONFIG,
        Some(Opcode::NfcScanStart) => NFC_SCAN_START,
        Some(Opcode::NfcRegister) => NFC_REGISTER,
        Some(Opcode::NfcUnregister) => NFC_UNREGISTER,
        Some(Opcode::TestBattery) => BATTERY,
        _ => &[],
    }
}

/// Error opcodes that satisfy *any* outstanding command.
///
/// The device reports most failures without echoing which command failed, so
/// the queue attributes them to the single in-flight request.
#[must_use]
pub fn is_generic_error(opcode: u8) -> bool {
    matches!(
        Opcode::from_u8(opcode),
        Some(
            Opcode::ErrorCrc
                | Opcode::ErrorUnauthorized
                | Opcode::ErrorBadRequest
                | Opcode::ErrorUnsupported
                | Opcode::OperationError
                | Opcode::LogError
        )
    )
}

/// Does `response` settle a pending `command` under the default strategy?
///
/// True when the opcodes are identical, when `response` appears in the
/// command's response table, or when `response` is a generic error.
#[must_use]
pub fn is_response_to(command: u8, response: u8) -> bool {
    if command == response {
        return true;
    }
    if default_responses(command).contains(&response) {
        return true;
    }
    is_generic_error(response)
}

/// Map a device error opcode to its error category.
///
/// Returns `None` when the opcode is not an error notification at all.
#[must_use]
pub fn device_error_kind(opcode: u8) -> Option<DeviceErrorKind> {
    match Opcode::from_u8(opcode) {
        Some(Opcode::ErrorCrc) => Some(DeviceErrorKind::Crc),
        Some(Opcode::ErrorUnauthorized) => Some(DeviceErrorKind::Unauthorized),
        Some(Opcode::ErrorBadRequest) => Some(DeviceErrorKind::BadRequest),
        Some(Opcode::ErrorUnsupported) => Some(DeviceErrorKind::Unsupported),
        Some(Opcode::OperationError) => Some(DeviceErrorKind::OperationError),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_u8(byte) {
                assert_eq!(op.as_u8(), byte);
            }
        }
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(Opcode::from_u8(0x55), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_total_length_quirk_is_exactly_one_opcode() {
        let quirky: Vec<u8> = (0..=u8::MAX).filter(|&b| length_is_total(b)).collect();
        assert_eq!(quirky, vec![Opcode::NotifyCodesCount as u8]);
    }

    #[test]
    fn test_open_door_matching() {
        let cmd = Opcode::OpenDoor as u8;
        assert!(is_response_to(cmd, Opcode::ValidOpenCode as u8));
        assert!(is_response_to(cmd, Opcode::InvalidOpenCode as u8));
        assert!(!is_response_to(cmd, Opcode::NotifyDoorStatus as u8));
    }

    #[test]
    fn test_code_operations_accept_success_and_error() {
        for cmd in [
            Opcode::CreateMasterCode,
            Opcode::CreateSingleUseCode,
            Opcode::CreateMultiUseCode,
            Opcode::DeleteMasterCode,
            Opcode::DeleteSingleUseCode,
            Opcode::DeleteMultiUseCode,
            Opcode::ReactivateCode,
        ] {
            assert!(is_response_to(cmd as u8, Opcode::OperationSuccess as u8));
            assert!(is_response_to(cmd as u8, Opcode::OperationError as u8));
        }
    }

    #[test]
    fn test_count_codes_accepts_logs_count_quirk() {
        assert!(is_response_to(
            Opcode::CountCodes as u8,
            Opcode::NotifyLogsCount as u8
        ));
    }

    #[test]
    fn test_generic_errors_satisfy_any_command() {
        for err in [0xE0, 0xE1, 0xE2, 0xE3, 0x78, 0x95] {
            assert!(is_generic_error(err));
            assert!(is_response_to(Opcode::RequestLogs as u8, err));
        }
        assert!(!is_generic_error(Opcode::OperationSuccess as u8));
    }

    #[test]
    fn test_device_error_kind_mapping() {
        use latchkey_core::DeviceErrorKind::*;
        assert_eq!(device_error_kind(0xE1), Some(Unauthorized));
        assert_eq!(device_error_kind(0xE0), Some(Crc));
        assert_eq!(device_error_kind(0x78), Some(OperationError));
        assert_eq!(device_error_kind(0x77), None);
    }
}
