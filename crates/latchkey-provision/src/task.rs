//! Task model and scheduling order.

use chrono::{DateTime, Utc};
use latchkey_core::{CodeIndex, CodeType, CodeValue, DeviceId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which on-device code a delete operation targets.
///
/// Master codes are addressed by slot index; single- and multi-use codes by
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DeleteTarget {
    Master { index: CodeIndex },
    SingleUse { code: CodeValue },
    MultiUse { code: CodeValue },
}

impl DeleteTarget {
    /// Code class this deletion targets, for scheduler ordering.
    #[must_use]
    pub fn code_type(&self) -> CodeType {
        match self {
            DeleteTarget::Master { .. } => CodeType::Master,
            DeleteTarget::SingleUse { .. } => CodeType::SingleUse,
            DeleteTarget::MultiUse { .. } => CodeType::MultiUse,
        }
    }
}

/// What a task asks the engine to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TaskRequest {
    AddMasterCode {
        device: DeviceId,
        /// Desired-state record to mark on-device on success.
        code_id: Uuid,
        code: CodeValue,
        index: CodeIndex,
    },
    AddSingleUseCode {
        device: DeviceId,
        code_id: Uuid,
        code: CodeValue,
    },
    AddMultiUseCode {
        device: DeviceId,
        code_id: Uuid,
        code: CodeValue,
    },
    DeleteCode {
        device: DeviceId,
        /// Desired-state record to remove on success. Auto-inserted
        /// prerequisite deletions carry `None` so they never remove the
        /// record of the code about to be written.
        code_id: Option<Uuid>,
        target: DeleteTarget,
    },
    Unlock {
        device: DeviceId,
        code: CodeValue,
    },
}

impl TaskRequest {
    #[must_use]
    pub fn device(&self) -> &DeviceId {
        match self {
            TaskRequest::AddMasterCode { device, .. }
            | TaskRequest::AddSingleUseCode { device, .. }
            | TaskRequest::AddMultiUseCode { device, .. }
            | TaskRequest::DeleteCode { device, .. }
            | TaskRequest::Unlock { device, .. } => device,
        }
    }

    /// Short label for logs and failure messages.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            TaskRequest::AddMasterCode { .. } => "add_master_code",
            TaskRequest::AddSingleUseCode { .. } => "add_single_use_code",
            TaskRequest::AddMultiUseCode { .. } => "add_multi_use_code",
            TaskRequest::DeleteCode { .. } => "delete_code",
            TaskRequest::Unlock { .. } => "unlock",
        }
    }

    /// Delete-class operations run before add-class at equal priority.
    fn class_rank(&self) -> u8 {
        match self {
            TaskRequest::DeleteCode { .. } => 0,
            _ => 1,
        }
    }

    /// Within a class: master before single-use before multi-use; delete
    /// operations rank by their target's code type. Everything else last.
    fn type_rank(&self) -> u8 {
        match self {
            TaskRequest::AddMasterCode { .. } => CodeType::Master.rank(),
            TaskRequest::AddSingleUseCode { .. } => CodeType::SingleUse.rank(),
            TaskRequest::AddMultiUseCode { .. } => CodeType::MultiUse.rank(),
            TaskRequest::DeleteCode { target, .. } => target.code_type().rank(),
            TaskRequest::Unlock { .. } => 4,
        }
    }
}

/// Task lifecycle: `Pending -> Processing -> {Completed | Failed}`;
/// `Failed -> Pending` only through an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One provisioning operation and its full history.
///
/// Tasks are append-only: failed tasks stay in the collection for
/// inspection and manual retry, they are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionTask {
    pub id: Uuid,
    pub request: TaskRequest,
    /// Lower is more urgent; 0 is reserved for auto-inserted prerequisites.
    pub priority: u8,
    pub status: TaskStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Insertion counter, the scheduler's final tie-break.
    pub seq: u64,
}

impl ProvisionTask {
    /// Scheduler sort key: ascending priority, deletes before adds, type
    /// rank within the class, insertion order last.
    #[must_use]
    pub fn sort_key(&self) -> (u8, u8, u8, u64) {
        (
            self.priority,
            self.request.class_rank(),
            self.request.type_rank(),
            self.seq,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchkey_core::Result;

    fn task(request: TaskRequest, priority: u8, seq: u64) -> ProvisionTask {
        ProvisionTask {
            id: Uuid::new_v4(),
            request,
            priority,
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            seq,
        }
    }

    fn device() -> DeviceId {
        DeviceId::new("test-device").unwrap()
    }

    fn unlock(priority: u8, seq: u64) -> ProvisionTask {
        task(
            TaskRequest::Unlock {
                device: device(),
                code: CodeValue::new("1234").unwrap(),
            },
            priority,
            seq,
        )
    }

    #[test]
    fn test_priority_order() {
        let mut tasks = vec![unlock(10, 0), unlock(1, 1), unlock(5, 2)];
        tasks.sort_by_key(ProvisionTask::sort_key);
        let priorities: Vec<u8> = tasks.iter().map(|t| t.priority).collect();
        assert_eq!(priorities, vec![1, 5, 10]);
    }

    #[test]
    fn test_delete_before_add_at_equal_priority() -> Result<()> {
        let add = task(
            TaskRequest::AddSingleUseCode {
                device: device(),
                code_id: Uuid::new_v4(),
                code: CodeValue::new("1234")?,
            },
            5,
            0,
        );
        let delete = task(
            TaskRequest::DeleteCode {
                device: device(),
                code_id: None,
                target: DeleteTarget::SingleUse {
                    code: CodeValue::new("9999")?,
                },
            },
            5,
            1,
        );

        let mut tasks = vec![add, delete];
        tasks.sort_by_key(ProvisionTask::sort_key);
        assert!(matches!(
            tasks[0].request,
            TaskRequest::DeleteCode { .. }
        ));
        Ok(())
    }

    #[test]
    fn test_add_class_type_order() -> Result<()> {
        let multi = task(
            TaskRequest::AddMultiUseCode {
                device: device(),
                code_id: Uuid::new_v4(),
                code: CodeValue::new("1111")?,
            },
            5,
            0,
        );
        let master = task(
            TaskRequest::AddMasterCode {
                device: device(),
                code_id: Uuid::new_v4(),
                code: CodeValue::new("2222")?,
                index: CodeIndex::new(0),
            },
            5,
            1,
        );
        let single = task(
            TaskRequest::AddSingleUseCode {
                device: device(),
                code_id: Uuid::new_v4(),
                code: CodeValue::new("3333")?,
            },
            5,
            2,
        );

        let mut tasks = vec![multi, master, single];
        tasks.sort_by_key(ProvisionTask::sort_key);
        let labels: Vec<&str> = tasks.iter().map(|t| t.request.label()).collect();
        assert_eq!(
            labels,
            vec!["add_master_code", "add_single_use_code", "add_multi_use_code"]
        );
        Ok(())
    }

    #[test]
    fn test_delete_class_ranked_by_target_type() -> Result<()> {
        let single_del = task(
            TaskRequest::DeleteCode {
                device: device(),
                code_id: None,
                target: DeleteTarget::SingleUse {
                    code: CodeValue::new("1111")?,
                },
            },
            5,
            0,
        );
        let master_del = task(
            TaskRequest::DeleteCode {
                device: device(),
                code_id: None,
                target: DeleteTarget::Master {
                    index: CodeIndex::new(2),
                },
            },
            5,
            1,
        );

        let mut tasks = vec![single_del, master_del];
        tasks.sort_by_key(ProvisionTask::sort_key);
        assert!(matches!(
            tasks[0].request,
            TaskRequest::DeleteCode {
                target: DeleteTarget::Master { .. },
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn test_insertion_order_is_final_tie_break() {
        let mut tasks = vec![unlock(5, 7), unlock(5, 3)];
        tasks.sort_by_key(ProvisionTask::sort_key);
        assert_eq!(tasks[0].seq, 3);
    }
}
