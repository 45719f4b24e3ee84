//! History retrieval commands.

use super::Command;
use crate::Opcode;

/// Ask for the number of stored history entries.
///
/// Some firmware revisions answer twice: first a zero count, then the real
/// one. Callers keep listening for the follow-up notification.
#[derive(Debug, Clone, Default)]
pub struct GetLogsCount;

impl Command for GetLogsCount {
    fn opcode(&self) -> Opcode {
        Opcode::GetLogsCount
    }

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// Start a bulk history replay.
///
/// The device streams one frame per stored event and terminates with the
/// end-of-history marker; this is the canonical use for the queue's
/// streaming (`Continue`) match strategy.
#[derive(Debug, Clone, Default)]
pub struct RequestLogs;

impl Command for RequestLogs {
    fn opcode(&self) -> Opcode {
        Opcode::RequestLogs
    }

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchkey_core::Result;

    #[test]
    fn test_get_logs_count_frame() -> Result<()> {
        let frame = GetLogsCount.encode()?;
        assert_eq!(frame.as_bytes(), &[0x07, 0x00, 0x07]);
        Ok(())
    }

    #[test]
    fn test_request_logs_frame() -> Result<()> {
        let frame = RequestLogs.encode()?;
        assert_eq!(frame.as_bytes(), &[0x03, 0x00, 0x03]);
        Ok(())
    }
}
