//! Typed events decoded from inbound frames.
//!
//! [`DeviceEvent::decode`] is the registry: a static match from opcode to
//! one tagged variant per notification family. Opcodes outside the table
//! produce [`DeviceEvent::Raw`] with the bytes verbatim — decoding never
//! fails. Every variant renders a one-line [`summary`](DeviceEvent::summary)
//! and a structured [`details`](DeviceEvent::details) map.

mod log;
mod nfc;

pub use log::{
    CodeSource, DiagnosticCode, LogKind, LogRecord, PowerOffReason, parse_age_seconds,
};
pub use nfc::NfcEvent;

use crate::{Frame, Opcode};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use latchkey_core::DeviceErrorKind;
use serde_json::{Map, Value, json};
use std::fmt;

/// How to derive the absolute timestamp of a decoded history event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampPolicy {
    /// Compute `decoded_at - age`. Correct for frames fresh off the link.
    Reconstruct,
    /// Use this stored timestamp instead of recomputing.
    ///
    /// Re-decoding bytes that were persisted earlier MUST use this policy:
    /// reconstructing against the current clock silently shifts every
    /// historical event to "age seconds ago from now".
    Preserve(DateTime<Utc>),
}

/// Context for one decode pass.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    /// Wall-clock instant the frame is being decoded at.
    pub decoded_at: DateTime<Utc>,
    /// Timestamp derivation policy for history events.
    pub timestamps: TimestampPolicy,
}

impl DecodeContext {
    /// Context for a frame fresh off the link.
    #[must_use]
    pub fn now() -> Self {
        Self {
            decoded_at: Utc::now(),
            timestamps: TimestampPolicy::Reconstruct,
        }
    }

    /// Context for re-decoding stored bytes with their original timestamp.
    #[must_use]
    pub fn preserving(stored: DateTime<Utc>) -> Self {
        Self {
            decoded_at: Utc::now(),
            timestamps: TimestampPolicy::Preserve(stored),
        }
    }
}

impl Default for DecodeContext {
    fn default() -> Self {
        Self::now()
    }
}

/// Which counter a count notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountEvent {
    /// Number of stored history entries.
    Logs(u16),
    /// Number of stored access codes, split by class.
    Codes { master: u16, single: u16 },
}

/// Battery payload layout, detected from the payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryFormat {
    /// 6 bytes: first/min/mean/max/last measures + temperature.
    Measures,
    /// 4 bytes: levels at t+1/t+5/t+10 + temperature.
    Timed,
    /// 1 byte: level only.
    SingleLevel,
    Unknown,
}

/// Battery measurement report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryReport {
    pub format: BatteryFormat,
    /// Most recent level in percent, when the payload carried one.
    pub level: Option<u8>,
    /// Temperature in °C; the wire byte is offset by 25 and 0xFF means absent.
    pub temperature_c: Option<i16>,
}

const BATTERY_INVALID: u8 = 0xFF;

impl BatteryReport {
    fn parse(payload: &[u8]) -> Self {
        let temp = |b: u8| (b != BATTERY_INVALID).then(|| i16::from(b) - 25);
        match payload {
            [_, _, _, _, last, t] => Self {
                format: BatteryFormat::Measures,
                level: Some(*last),
                temperature_c: temp(*t),
            },
            [t1, _, _, t] => Self {
                format: BatteryFormat::Timed,
                level: Some(*t1),
                temperature_c: temp(*t),
            },
            [level] => Self {
                format: BatteryFormat::SingleLevel,
                level: Some(*level),
                temperature_c: None,
            },
            other => Self {
                format: BatteryFormat::Unknown,
                level: other.first().copied(),
                temperature_c: None,
            },
        }
    }
}

/// NFC tag identifier, or an explicit invalid marker when the declared
/// length exceeded the available bytes. Never panics on short buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagUid {
    Valid(Vec<u8>),
    Invalid,
}

impl TagUid {
    /// Parse a length-prefixed UID: `[len, byte...]`.
    #[must_use]
    pub fn parse_prefixed(bytes: &[u8]) -> Self {
        match bytes.split_first() {
            Some((&len, rest)) if rest.len() >= len as usize && len > 0 => {
                TagUid::Valid(rest[..len as usize].to_vec())
            }
            _ => TagUid::Invalid,
        }
    }
}

impl fmt::Display for TagUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagUid::Valid(bytes) => {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
                write!(f, "{}", hex.join(":"))
            }
            TagUid::Invalid => write!(f, "invalid"),
        }
    }
}

/// One inbound notification, decoded.
///
/// Ephemeral: produced per frame, consumed by listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Door status push (0x84) or pull answer (0x85).
    DoorStatus { open: bool },
    /// The device judged an unlock code (0x81 valid / 0x82 invalid).
    CodeCheck { accepted: bool },
    /// Generic operation outcome (0x77 success / 0x78 error).
    Operation { success: bool },
    /// Configuration write acknowledged (0x7B).
    ConfigAcknowledged,
    /// A counter notification.
    Count(CountEvent),
    /// Battery measurement report.
    Battery(BatteryReport),
    /// History/log event.
    Log(LogRecord),
    /// NFC registration notification.
    Nfc(NfcEvent),
    /// Device-reported error opcode.
    DeviceError(DeviceErrorKind),
    /// Fallback for opcodes outside the registry.
    Raw { opcode: u8, payload: Bytes },
}

impl DeviceEvent {
    /// Decode a frame into a typed event.
    #[must_use]
    pub fn decode(frame: &Frame, ctx: &DecodeContext) -> Self {
        let payload = frame.payload();
        if !frame.checksum_valid() {
            // Diagnostic only: callers decide trust, decoding proceeds.
            tracing::debug!(opcode = frame.opcode(), "decoding frame with bad checksum");
        }

        let Some(opcode) = Opcode::from_u8(frame.opcode()) else {
            return DeviceEvent::Raw {
                opcode: frame.opcode(),
                payload: Bytes::copy_from_slice(payload),
            };
        };

        use Opcode::*;
        match opcode {
            NotifyDoorStatus | AnswerDoorStatus => DeviceEvent::DoorStatus {
                // Payload is [inverted, live]; the live byte is authoritative.
                open: payload.get(1).or_else(|| payload.first()) == Some(&0x01),
            },
            ValidOpenCode => DeviceEvent::CodeCheck { accepted: true },
            InvalidOpenCode => DeviceEvent::CodeCheck { accepted: false },
            OperationSuccess => DeviceEvent::Operation { success: true },
            OperationError => DeviceEvent::Operation { success: false },
            SetConfigurationAck => DeviceEvent::ConfigAcknowledged,
            NotifyLogsCount => DeviceEvent::Count(CountEvent::Logs(u16_be(payload, 0))),
            NotifyCodesCount => DeviceEvent::Count(CountEvent::Codes {
                master: u16_be(payload, 0),
                single: u16_be(payload, 2),
            }),
            TestBattery => DeviceEvent::Battery(BatteryReport::parse(payload)),
            LogCodeBleValid | LogCodeKeyValid | LogCodeBleInvalid | LogCodeKeyInvalid
            | LogDoorClose | LogDoorOpen | LogPowerOff | LogBlockReset | LogPowerOn
            | LogBleReboot | LogHistoryErase | LogEnd | LogScaleMeasure | LogKeyOpening
            | LogError | LogNfcOpening | LogNfcRegistering => {
                DeviceEvent::Log(LogRecord::decode(opcode, payload, ctx))
            }
            NfcScanResult | NfcScanAlreadyRegistered | NfcScanTimeout | NfcRegistered
            | NfcUnregistered => DeviceEvent::Nfc(NfcEvent::decode(opcode, payload)),
            ErrorCrc | ErrorUnauthorized | ErrorBadRequest | ErrorUnsupported => {
                DeviceEvent::DeviceError(
                    crate::opcode::device_error_kind(opcode.as_u8())
                        .unwrap_or(DeviceErrorKind::Unknown(opcode.as_u8())),
                )
            }
            // Command opcodes arriving inbound carry no notification
            // semantics we know of; keep the bytes.
            _ => DeviceEvent::Raw {
                opcode: opcode.as_u8(),
                payload: Bytes::copy_from_slice(payload),
            },
        }
    }

    /// One-line human-readable rendering.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            DeviceEvent::DoorStatus { open } => {
                format!("Door {}", if *open { "open" } else { "closed" })
            }
            DeviceEvent::CodeCheck { accepted: true } => "Open code accepted".to_string(),
            DeviceEvent::CodeCheck { accepted: false } => "Open code rejected".to_string(),
            DeviceEvent::Operation { success: true } => "Operation succeeded".to_string(),
            DeviceEvent::Operation { success: false } => "Operation failed".to_string(),
            DeviceEvent::ConfigAcknowledged => "Configuration acknowledged".to_string(),
            DeviceEvent::Count(CountEvent::Logs(n)) => format!("Stored logs: {n}"),
            DeviceEvent::Count(CountEvent::Codes { master, single }) => {
                format!("Stored codes: {master} master, {single} single-use")
            }
            DeviceEvent::Battery(report) => match (report.level, report.temperature_c) {
                (Some(level), Some(temp)) => format!("Battery {level}% ({temp}\u{b0}C)"),
                (Some(level), None) => format!("Battery {level}%"),
                _ => "Battery report".to_string(),
            },
            DeviceEvent::Log(record) => record.summary(),
            DeviceEvent::Nfc(event) => event.summary(),
            DeviceEvent::DeviceError(kind) => format!("Device error: {kind}"),
            DeviceEvent::Raw { opcode, payload } => {
                format!("Raw frame 0x{opcode:02X} ({} bytes)", payload.len())
            }
        }
    }

    /// Structured key/value detail map.
    #[must_use]
    pub fn details(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            DeviceEvent::DoorStatus { open } => {
                map.insert("open".into(), json!(open));
                map.insert("locked".into(), json!(!open));
            }
            DeviceEvent::CodeCheck { accepted } => {
                map.insert("accepted".into(), json!(accepted));
            }
            DeviceEvent::Operation { success } => {
                map.insert("success".into(), json!(success));
            }
            DeviceEvent::ConfigAcknowledged => {
                map.insert("acknowledged".into(), json!(true));
            }
            DeviceEvent::Count(CountEvent::Logs(n)) => {
                map.insert("count".into(), json!(n));
            }
            DeviceEvent::Count(CountEvent::Codes { master, single }) => {
                map.insert("master".into(), json!(master));
                map.insert("single".into(), json!(single));
            }
            DeviceEvent::Battery(report) => {
                map.insert("level".into(), json!(report.level));
                map.insert("temperature_c".into(), json!(report.temperature_c));
            }
            DeviceEvent::Log(record) => return record.details(),
            DeviceEvent::Nfc(event) => return event.details(),
            DeviceEvent::DeviceError(kind) => {
                map.insert("error".into(), json!(kind.to_string()));
            }
            DeviceEvent::Raw { opcode, payload } => {
                map.insert("opcode".into(), json!(format!("0x{opcode:02X}")));
                let hex: Vec<String> = payload.iter().map(|b| format!("{b:02X}")).collect();
                map.insert("payload".into(), json!(hex.join(" ")));
            }
        }
        map
    }
}

fn u16_be(payload: &[u8], offset: usize) -> u16 {
    match (payload.get(offset), payload.get(offset + 1)) {
        (Some(&hi), Some(&lo)) => u16::from_be_bytes([hi, lo]),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(opcode: u8, payload: &[u8]) -> Frame {
        Frame::encode(opcode, payload).unwrap()
    }

    fn decode(opcode: u8, payload: &[u8]) -> DeviceEvent {
        DeviceEvent::decode(&frame(opcode, payload), &DecodeContext::now())
    }

    #[test]
    fn test_door_status_uses_live_byte() {
        assert_eq!(
            decode(0x84, &[0x00, 0x01]),
            DeviceEvent::DoorStatus { open: true }
        );
        assert_eq!(
            decode(0x85, &[0x01, 0x00]),
            DeviceEvent::DoorStatus { open: false }
        );
    }

    #[test]
    fn test_door_status_single_byte_fallback() {
        assert_eq!(decode(0x84, &[0x01]), DeviceEvent::DoorStatus { open: true });
        assert_eq!(decode(0x84, &[]), DeviceEvent::DoorStatus { open: false });
    }

    #[test]
    fn test_code_check() {
        assert_eq!(decode(0x81, &[]), DeviceEvent::CodeCheck { accepted: true });
        assert_eq!(decode(0x82, &[]), DeviceEvent::CodeCheck { accepted: false });
    }

    #[test]
    fn test_operation_result() {
        assert_eq!(decode(0x77, &[]), DeviceEvent::Operation { success: true });
        assert_eq!(decode(0x78, &[]), DeviceEvent::Operation { success: false });
    }

    #[test]
    fn test_logs_count_big_endian() {
        let event = decode(0x79, &[0x00, 0x2A]);
        assert_eq!(event, DeviceEvent::Count(CountEvent::Logs(42)));
        assert_eq!(event.details()["count"], json!(42));
    }

    #[test]
    fn test_codes_count() {
        let event = decode(0x7A, &[0x00, 0x05, 0x00, 0x0A]);
        assert_eq!(
            event,
            DeviceEvent::Count(CountEvent::Codes {
                master: 5,
                single: 10
            })
        );
    }

    #[test]
    fn test_short_count_payload_reads_zero() {
        assert_eq!(decode(0x79, &[0x05]), DeviceEvent::Count(CountEvent::Logs(0)));
    }

    #[test]
    fn test_battery_formats() {
        let six = decode(0x08, &[90, 80, 85, 95, 88, 45]);
        assert_eq!(
            six,
            DeviceEvent::Battery(BatteryReport {
                format: BatteryFormat::Measures,
                level: Some(88),
                temperature_c: Some(20),
            })
        );

        let four = decode(0x08, &[70, 69, 68, 0xFF]);
        assert_eq!(
            four,
            DeviceEvent::Battery(BatteryReport {
                format: BatteryFormat::Timed,
                level: Some(70),
                temperature_c: None,
            })
        );

        let one = decode(0x08, &[55]);
        assert_eq!(
            one,
            DeviceEvent::Battery(BatteryReport {
                format: BatteryFormat::SingleLevel,
                level: Some(55),
                temperature_c: None,
            })
        );
    }

    #[test]
    fn test_device_errors() {
        assert_eq!(
            decode(0xE1, &[0x01]),
            DeviceEvent::DeviceError(DeviceErrorKind::Unauthorized)
        );
        assert_eq!(
            decode(0xE0, &[]),
            DeviceEvent::DeviceError(DeviceErrorKind::Crc)
        );
    }

    #[test]
    fn test_unknown_opcode_yields_raw() {
        let event = decode(0x55, &[0xDE, 0xAD]);
        match event {
            DeviceEvent::Raw { opcode, payload } => {
                assert_eq!(opcode, 0x55);
                assert_eq!(&payload[..], &[0xDE, 0xAD]);
            }
            other => panic!("expected raw event, got {other:?}"),
        }
    }

    #[test]
    fn test_tag_uid_parsing() {
        assert_eq!(
            TagUid::parse_prefixed(&[4, 0xAA, 0xBB, 0xCC, 0xDD]),
            TagUid::Valid(vec![0xAA, 0xBB, 0xCC, 0xDD])
        );
        // Declared length exceeds available bytes.
        assert_eq!(TagUid::parse_prefixed(&[4, 0xAA, 0xBB]), TagUid::Invalid);
        assert_eq!(TagUid::parse_prefixed(&[]), TagUid::Invalid);
        assert_eq!(TagUid::parse_prefixed(&[0]), TagUid::Invalid);
    }

    #[test]
    fn test_tag_uid_display() {
        let uid = TagUid::Valid(vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(uid.to_string(), "AA:BB:CC:DD");
        assert_eq!(TagUid::Invalid.to_string(), "invalid");
    }

    #[test]
    fn test_every_event_has_summary_and_details() {
        let frames: &[(u8, &[u8])] = &[
            (0x84, &[0x00, 0x01]),
            (0x81, &[]),
            (0x77, &[]),
            (0x7B, &[]),
            (0x79, &[0x00, 0x01]),
            (0x08, &[55]),
            (0x8B, &[0, 0, 10]),
            (0xC7, &[]),
            (0xE2, &[]),
            (0x55, &[1, 2, 3]),
        ];
        for &(opcode, payload) in frames {
            let event = decode(opcode, payload);
            assert!(!event.summary().is_empty(), "opcode 0x{opcode:02X}");
            assert!(!event.details().is_empty(), "opcode 0x{opcode:02X}");
        }
    }
}
