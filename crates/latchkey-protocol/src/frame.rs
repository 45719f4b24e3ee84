use crate::opcode::length_is_total;
use bytes::{BufMut, Bytes, BytesMut};
use latchkey_core::{
    Error, Result,
    constants::{FRAME_CHECKSUM_LEN, FRAME_HEADER_LEN, MIN_FRAME_LEN},
};
use std::fmt;

/// One binary message unit exchanged over the link.
///
/// # Wire Format
///
/// ```text
/// [opcode:1][length:1][payload:N][checksum:1]
/// ```
///
/// The checksum is the additive sum of all preceding bytes truncated to
/// 8 bits. The length byte is *not* trusted when decoding: one counter
/// notification stores the total frame length there instead of the payload
/// length, so the payload is always sliced from the actual buffer as
/// `bytes[2 .. len - 1]`.
///
/// A checksum mismatch does not block decoding; it is surfaced through
/// [`Frame::checksum_valid`] and the caller decides how much to trust the
/// frame. Passive diagnostics log it, the command queue still matches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    opcode: u8,
    declared_len: u8,
    payload: Bytes,
    checksum_valid: bool,
    raw: Bytes,
}

impl Frame {
    /// Encode a command frame.
    ///
    /// Writes the opcode, the length byte (payload length, or total frame
    /// length for the quirky counter opcode), the payload and the checksum.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the payload cannot be represented in a
    /// single frame (length byte is 8 bits).
    pub fn encode(opcode: u8, payload: &[u8]) -> Result<Self> {
        let total = FRAME_HEADER_LEN + payload.len() + FRAME_CHECKSUM_LEN;
        let length_field = if length_is_total(opcode) {
            total
        } else {
            payload.len()
        };
        if length_field > u8::MAX as usize {
            return Err(Error::Validation(format!(
                "payload of {} bytes does not fit in a frame",
                payload.len()
            )));
        }

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(opcode);
        buf.put_u8(length_field as u8);
        buf.put_slice(payload);
        buf.put_u8(additive_checksum(&buf));
        let raw = buf.freeze();

        Ok(Frame {
            opcode,
            declared_len: length_field as u8,
            payload: raw.slice(FRAME_HEADER_LEN..total - FRAME_CHECKSUM_LEN),
            checksum_valid: true,
            raw,
        })
    }

    /// Decode a frame from raw bytes.
    ///
    /// Returns `None` for buffers shorter than 2 bytes. The payload is
    /// extracted from the actual buffer length; checksum validity is
    /// computed independently of the declared length byte.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < MIN_FRAME_LEN {
            return None;
        }

        let raw = Bytes::copy_from_slice(bytes);
        let payload = if raw.len() > FRAME_HEADER_LEN {
            raw.slice(FRAME_HEADER_LEN..raw.len() - FRAME_CHECKSUM_LEN)
        } else {
            Bytes::new()
        };

        Some(Frame {
            opcode: raw[0],
            declared_len: raw[1],
            payload,
            checksum_valid: verify_checksum(&raw),
            raw,
        })
    }

    #[must_use]
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// The length byte exactly as transmitted. Unreliable across opcodes;
    /// use [`Frame::payload`] for boundaries.
    #[must_use]
    pub fn declared_len(&self) -> u8 {
        self.declared_len
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether the trailing checksum matched the additive sum.
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        self.checksum_valid
    }

    /// Raw bytes of the whole frame.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Raw bytes as a cheaply clonable buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        self.raw.clone()
    }
}

/// Additive 8-bit-truncated checksum over `bytes`.
#[must_use]
pub fn additive_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Verify the trailing checksum byte of a raw frame buffer.
#[must_use]
pub fn verify_checksum(bytes: &[u8]) -> bool {
    match bytes.split_last() {
        Some((&checksum, rest)) if !rest.is_empty() => additive_checksum(rest) == checksum,
        _ => false,
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex: String = self
            .raw
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        write!(
            f,
            "Frame[opcode=0x{:02X}, len={}, checksum_valid={}, raw='{}']",
            self.opcode,
            self.payload.len(),
            self.checksum_valid,
            hex
        )
    }
}
