//! NFC registration-flow notifications.

use super::TagUid;
use crate::Opcode;
use serde_json::{Map, Value, json};

/// Notification pushed by the device during tag registration.
#[derive(Debug, Clone, PartialEq)]
pub enum NfcEvent {
    /// A tag was presented to the reader during scan mode.
    ScanResult { uid: TagUid },
    /// The presented tag is already registered on the device.
    AlreadyRegistered { uid: TagUid },
    /// Scan mode expired without a tag.
    ScanTimeout,
    /// Tag registration confirmed.
    Registered,
    /// Tag removal confirmed.
    Unregistered,
}

impl NfcEvent {
    pub(crate) fn decode(opcode: Opcode, payload: &[u8]) -> Self {
        match opcode {
            Opcode::NfcScanResult => NfcEvent::ScanResult {
                uid: TagUid::parse_prefixed(payload),
            },
            Opcode::NfcScanAlreadyRegistered => NfcEvent::AlreadyRegistered {
                uid: TagUid::parse_prefixed(payload),
            },
            Opcode::NfcScanTimeout => NfcEvent::ScanTimeout,
            Opcode::NfcRegistered => NfcEvent::Registered,
            // NfcUnregistered plus anything else routed here.
            _ => NfcEvent::Unregistered,
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            NfcEvent::ScanResult { uid } => format!("NFC tag scanned: {uid}"),
            NfcEvent::AlreadyRegistered { uid } => format!("NFC tag already registered: {uid}"),
            NfcEvent::ScanTimeout => "NFC scan timed out".to_string(),
            NfcEvent::Registered => "NFC tag registered".to_string(),
            NfcEvent::Unregistered => "NFC tag unregistered".to_string(),
        }
    }

    #[must_use]
    pub fn details(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            NfcEvent::ScanResult { uid } => {
                map.insert("result".into(), json!("scanned"));
                map.insert("tag_uid".into(), json!(uid.to_string()));
            }
            NfcEvent::AlreadyRegistered { uid } => {
                map.insert("result".into(), json!("already_registered"));
                map.insert("tag_uid".into(), json!(uid.to_string()));
            }
            NfcEvent::ScanTimeout => {
                map.insert("result".into(), json!("timeout"));
            }
            NfcEvent::Registered => {
                map.insert("result".into(), json!("registered"));
            }
            NfcEvent::Unregistered => {
                map.insert("result".into(), json!("unregistered"));
            }
        }
        map
    }
}
