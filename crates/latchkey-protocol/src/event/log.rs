//! History/log event decoding.
//!
//! Every history payload starts with a 24-bit big-endian age in seconds;
//! the absolute timestamp is reconstructed from the decode instant (or
//! preserved, see [`TimestampPolicy`]). The remainder is kind-specific.

use super::{DecodeContext, TagUid, TimestampPolicy};
use crate::Opcode;
use chrono::{DateTime, Duration, Utc};
use latchkey_core::{MacAddress, constants::LOG_AGE_LEN};
use serde_json::{Map, Value, json};
use std::fmt;

/// Input path of a code-usage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSource {
    /// Code submitted over the BLE link; these events also carry the
    /// peer's MAC address.
    Ble,
    /// Code typed on the physical keypad.
    Keypad,
}

impl fmt::Display for CodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeSource::Ble => write!(f, "ble"),
            CodeSource::Keypad => write!(f, "keypad"),
        }
    }
}

/// Why the device powered off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOffReason {
    LowBattery,
    Brownout,
    Watchdog,
    UserRequest,
    Unknown(u8),
}

impl PowerOffReason {
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => PowerOffReason::LowBattery,
            0x02 => PowerOffReason::Brownout,
            0x03 => PowerOffReason::Watchdog,
            0x04 => PowerOffReason::UserRequest,
            other => PowerOffReason::Unknown(other),
        }
    }
}

impl fmt::Display for PowerOffReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerOffReason::LowBattery => write!(f, "low_battery"),
            PowerOffReason::Brownout => write!(f, "brownout"),
            PowerOffReason::Watchdog => write!(f, "watchdog"),
            PowerOffReason::UserRequest => write!(f, "user_request"),
            PowerOffReason::Unknown(code) => write!(f, "unknown_reason_{code}"),
        }
    }
}

/// Symbolic name for a diagnostic error code.
///
/// Unknown codes map to the sentinel, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    MotorStall,
    LatchSensor,
    RtcDrift,
    FlashWrite,
    BatteryGauge,
    Unknown(u8),
}

impl DiagnosticCode {
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => DiagnosticCode::MotorStall,
            0x02 => DiagnosticCode::LatchSensor,
            0x03 => DiagnosticCode::RtcDrift,
            0x04 => DiagnosticCode::FlashWrite,
            0x05 => DiagnosticCode::BatteryGauge,
            other => DiagnosticCode::Unknown(other),
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticCode::MotorStall => write!(f, "motor_stall"),
            DiagnosticCode::LatchSensor => write!(f, "latch_sensor"),
            DiagnosticCode::RtcDrift => write!(f, "rtc_drift"),
            DiagnosticCode::FlashWrite => write!(f, "flash_write"),
            DiagnosticCode::BatteryGauge => write!(f, "battery_gauge"),
            DiagnosticCode::Unknown(code) => write!(f, "unknown_error_{code:02x}"),
        }
    }
}

/// Kind-specific content of a history event.
#[derive(Debug, Clone, PartialEq)]
pub enum LogKind {
    /// An access code was tried (BLE or keypad, accepted or rejected).
    CodeUsage {
        source: CodeSource,
        accepted: bool,
        code: String,
        /// Peer MAC, present on BLE events long enough to carry one.
        mac: Option<MacAddress>,
    },
    DoorOpened,
    DoorClosed,
    /// Mechanical key opening.
    KeyOpening,
    /// An NFC tag opened the door, or was scanned during registration.
    NfcUsage {
        registering: bool,
        tag_type: u8,
        uid: TagUid,
    },
    PowerOn,
    PowerOff { reason: Option<PowerOffReason> },
    BleReboot,
    BlockReset,
    HistoryErased,
    /// Terminates a bulk history replay.
    EndOfHistory,
    ScaleMeasure,
    Diagnostic {
        subtype: u8,
        code: DiagnosticCode,
        internal: u8,
    },
}

impl LogKind {
    /// Stable snake_case label for the event kind.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            LogKind::CodeUsage {
                source: CodeSource::Ble,
                accepted: true,
                ..
            } => "code_ble_valid",
            LogKind::CodeUsage {
                source: CodeSource::Ble,
                accepted: false,
                ..
            } => "code_ble_invalid",
            LogKind::CodeUsage {
                source: CodeSource::Keypad,
                accepted: true,
                ..
            } => "code_key_valid",
            LogKind::CodeUsage {
                source: CodeSource::Keypad,
                accepted: false,
                ..
            } => "code_key_invalid",
            LogKind::DoorOpened => "door_opened",
            LogKind::DoorClosed => "door_closed",
            LogKind::KeyOpening => "key_opening",
            LogKind::NfcUsage {
                registering: false, ..
            } => "nfc_opening",
            LogKind::NfcUsage {
                registering: true, ..
            } => "nfc_registering",
            LogKind::PowerOn => "power_on",
            LogKind::PowerOff { .. } => "power_off",
            LogKind::BleReboot => "ble_reboot",
            LogKind::BlockReset => "block_reset",
            LogKind::HistoryErased => "history_erase",
            LogKind::EndOfHistory => "log_end",
            LogKind::ScaleMeasure => "scale_measure",
            LogKind::Diagnostic { .. } => "error",
        }
    }
}

/// A decoded history event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub kind: LogKind,
    /// Seconds elapsed between the event and its transmission.
    pub age_seconds: u32,
    /// Absolute event time per the decode context's timestamp policy.
    pub timestamp: DateTime<Utc>,
}

/// Extract the 24-bit big-endian age prefix. Short payloads read as age 0.
#[must_use]
pub fn parse_age_seconds(payload: &[u8]) -> u32 {
    match payload {
        [a, b, c, ..] => u32::from_be_bytes([0, *a, *b, *c]),
        _ => 0,
    }
}

impl LogRecord {
    pub(crate) fn decode(opcode: Opcode, payload: &[u8], ctx: &DecodeContext) -> Self {
        let age_seconds = parse_age_seconds(payload);
        let timestamp = match ctx.timestamps {
            TimestampPolicy::Preserve(stored) => stored,
            TimestampPolicy::Reconstruct => {
                ctx.decoded_at - Duration::seconds(i64::from(age_seconds))
            }
        };
        let rest = payload.get(LOG_AGE_LEN..).unwrap_or_default();

        let kind = match opcode {
            Opcode::LogCodeBleValid => code_usage(CodeSource::Ble, true, rest),
            Opcode::LogCodeKeyValid => code_usage(CodeSource::Keypad, true, rest),
            Opcode::LogCodeBleInvalid => code_usage(CodeSource::Ble, false, rest),
            Opcode::LogCodeKeyInvalid => code_usage(CodeSource::Keypad, false, rest),
            Opcode::LogDoorOpen => LogKind::DoorOpened,
            Opcode::LogDoorClose => LogKind::DoorClosed,
            Opcode::LogKeyOpening => LogKind::KeyOpening,
            Opcode::LogNfcOpening => nfc_usage(false, rest),
            Opcode::LogNfcRegistering => nfc_usage(true, rest),
            Opcode::LogPowerOn => LogKind::PowerOn,
            Opcode::LogPowerOff => LogKind::PowerOff {
                reason: rest.first().map(|&b| PowerOffReason::from_u8(b)),
            },
            Opcode::LogBleReboot => LogKind::BleReboot,
            Opcode::LogBlockReset => LogKind::BlockReset,
            Opcode::LogHistoryErase => LogKind::HistoryErased,
            Opcode::LogEnd => LogKind::EndOfHistory,
            Opcode::LogScaleMeasure => LogKind::ScaleMeasure,
            // LogError and anything routed here without a specific arm.
            _ => LogKind::Diagnostic {
                subtype: rest.first().copied().unwrap_or(0),
                code: DiagnosticCode::from_u8(rest.get(1).copied().unwrap_or(0)),
                internal: rest.get(2).copied().unwrap_or(0),
            },
        };

        LogRecord {
            kind,
            age_seconds,
            timestamp,
        }
    }

    /// One-line rendering, e.g. `code_ble_valid (age 10s, code 123456)`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("age {}s", self.age_seconds)];
        match &self.kind {
            LogKind::CodeUsage { code, mac, .. } => {
                parts.push(format!("code {code}"));
                if let Some(mac) = mac {
                    parts.push(format!("mac {mac}"));
                }
            }
            LogKind::NfcUsage { uid, .. } => parts.push(format!("uid {uid}")),
            LogKind::PowerOff {
                reason: Some(reason),
            } => parts.push(format!("reason {reason}")),
            LogKind::Diagnostic { code, .. } => parts.push(format!("code {code}")),
            _ => {}
        }
        format!("{} ({})", self.kind.label(), parts.join(", "))
    }

    /// Structured detail map.
    #[must_use]
    pub fn details(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("event".into(), json!(self.kind.label()));
        map.insert("age".into(), json!(self.age_seconds));
        map.insert("timestamp".into(), json!(self.timestamp.to_rfc3339()));

        match &self.kind {
            LogKind::CodeUsage { code, mac, .. } => {
                map.insert("code".into(), json!(code));
                if let Some(mac) = mac {
                    map.insert("mac_address".into(), json!(mac.to_string()));
                }
            }
            LogKind::NfcUsage { tag_type, uid, .. } => {
                map.insert("tag_type".into(), json!(tag_type));
                map.insert("tag_uid".into(), json!(uid.to_string()));
            }
            LogKind::PowerOff { reason } => {
                if let Some(reason) = reason {
                    map.insert("reason".into(), json!(reason.to_string()));
                }
            }
            LogKind::Diagnostic {
                subtype,
                code,
                internal,
            } => {
                map.insert("error_subtype".into(), json!(subtype));
                map.insert("error_code".into(), json!(code.to_string()));
                map.insert("error_internal".into(), json!(internal));
            }
            _ => {}
        }
        map
    }
}

/// Fixed 6-byte code field, NUL padding stripped, non-ASCII replaced.
fn code_usage(source: CodeSource, accepted: bool, rest: &[u8]) -> LogKind {
    let code: String = rest
        .get(..6)
        .unwrap_or_default()
        .iter()
        .filter(|&&b| b != 0)
        .map(|&b| {
            if b.is_ascii_graphic() {
                b as char
            } else {
                '?'
            }
        })
        .collect();

    // BLE events append 2 padding bytes and a reversed 6-byte MAC.
    let mac = match (source, rest.get(8..14)) {
        (CodeSource::Ble, Some(wire)) => {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(wire);
            Some(MacAddress::from_wire(bytes))
        }
        _ => None,
    };

    LogKind::CodeUsage {
        source,
        accepted,
        code,
        mac,
    }
}

/// Tag-type byte followed by a length-prefixed UID.
fn nfc_usage(registering: bool, rest: &[u8]) -> LogKind {
    let (tag_type, uid) = match rest.split_first() {
        Some((&tag_type, tail)) => (tag_type, TagUid::parse_prefixed(tail)),
        None => (0, TagUid::Invalid),
    };
    LogKind::NfcUsage {
        registering,
        tag_type,
        uid,
    }
}
