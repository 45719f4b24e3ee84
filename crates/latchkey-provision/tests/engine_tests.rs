//! Task engine behavior against a scripted mock link.
//!
//! Each test wires a real command queue over the mock transport, so the
//! whole path — scheduling, command encoding, response matching, store
//! reconciliation — runs exactly as in production, on tokio's paused clock.

use latchkey_core::{
    CodeIndex, CodeType, CodeValue, ConfigKey, DeviceId,
    constants::{DEFAULT_TASK_PRIORITY, URGENT_TASK_PRIORITY},
};
use latchkey_link::{CommandQueue, mock::MockTransport, mock::MockTransportHandle};
use latchkey_protocol::Frame;
use latchkey_provision::{
    CodeRecord, CodeStatus, CodeStore, DeleteTarget, MemoryCodeStore, StaticCredentials,
    TaskEngine, TaskRequest, TaskStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

const DEVICE: &str = "lockbox-1";

struct Fixture {
    engine: TaskEngine<Arc<MemoryCodeStore>, Arc<StaticCredentials>>,
    store: Arc<MemoryCodeStore>,
    credentials: Arc<StaticCredentials>,
    handle: MockTransportHandle,
    device: DeviceId,
}

fn fixture() -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (transport, handle, events) = MockTransport::new();
    let queue = CommandQueue::spawn(transport, events);

    let device = DeviceId::new(DEVICE).unwrap();
    let store = Arc::new(MemoryCodeStore::new());
    let credentials = Arc::new(StaticCredentials::single(
        device.clone(),
        ConfigKey::new("ABCDEFGH").unwrap(),
    ));
    let engine = TaskEngine::new(queue, Arc::clone(&store), Arc::clone(&credentials));

    Fixture {
        engine,
        store,
        credentials,
        handle,
        device,
    }
}

fn frame(opcode: u8, payload: &[u8]) -> Frame {
    Frame::encode(opcode, payload).unwrap()
}

fn success() -> Vec<Frame> {
    vec![frame(0x77, &[])]
}

fn op_error() -> Vec<Frame> {
    vec![frame(0x78, &[])]
}

async fn seeded_record(fx: &Fixture, code_type: CodeType, code: &str, index: Option<u8>) -> Uuid {
    let record = CodeRecord::new(
        fx.device.clone(),
        code_type,
        CodeValue::new(code).unwrap(),
        index.map(CodeIndex::new),
    );
    let id = record.id;
    fx.store.put(record).await.unwrap();
    id
}

fn unlock(fx: &Fixture, code: &str) -> TaskRequest {
    TaskRequest::Unlock {
        device: fx.device.clone(),
        code: CodeValue::new(code).unwrap(),
    }
}

#[tokio::test(start_paused = true)]
async fn end_to_end_add_single_use_code() {
    let mut fx = fixture();
    let code_id = seeded_record(&fx, CodeType::SingleUse, "123456", None).await;

    fx.handle.reply_with(success()); // create
    let ids = fx.engine.enqueue(
        TaskRequest::AddSingleUseCode {
            device: fx.device.clone(),
            code_id,
            code: CodeValue::new("123456").unwrap(),
        },
        None,
    );
    assert_eq!(ids.len(), 1);

    assert_eq!(fx.engine.run_pending().await, 1);

    // Task completed.
    let task = fx.engine.task(ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.last_error.is_none());

    // Local record flipped to on-device.
    let record = fx.store.get(code_id).await.unwrap().unwrap();
    assert_eq!(record.status, CodeStatus::OnDevice);

    // The create frame went out, followed by exactly one recount.
    let opcodes: Vec<u8> = fx.handle.drain_writes().iter().map(Frame::opcode).collect();
    assert_eq!(opcodes, vec![0x12, 0x14]);
}

#[tokio::test(start_paused = true)]
async fn priority_order_lowest_number_first() {
    let mut fx = fixture();
    for _ in 0..3 {
        fx.handle.reply_with(vec![frame(0x81, &[])]);
    }

    fx.engine.enqueue(unlock(&fx, "1010"), Some(10));
    fx.engine.enqueue(unlock(&fx, "1111"), Some(1));
    fx.engine.enqueue(unlock(&fx, "5555"), Some(5));

    assert_eq!(fx.engine.run_pending().await, 3);

    let codes: Vec<String> = fx
        .handle
        .drain_writes()
        .iter()
        .filter(|f| f.opcode() == 0x01)
        .map(|f| String::from_utf8_lossy(f.payload()).into_owned())
        .collect();
    assert_eq!(codes, vec!["1111", "5555", "1010"]);
}

#[tokio::test(start_paused = true)]
async fn delete_runs_before_add_at_equal_priority() {
    let mut fx = fixture();
    fx.handle.reply_with(success()); // delete
    fx.handle.reply_with(success()); // recount consumed silently
    fx.handle.reply_with(success()); // add
    fx.handle.reply_with(success());

    let code_id = seeded_record(&fx, CodeType::SingleUse, "222222", None).await;
    fx.engine.enqueue(
        TaskRequest::AddSingleUseCode {
            device: fx.device.clone(),
            code_id,
            code: CodeValue::new("222222").unwrap(),
        },
        Some(5),
    );
    fx.engine.enqueue(
        TaskRequest::DeleteCode {
            device: fx.device.clone(),
            code_id: None,
            target: DeleteTarget::SingleUse {
                code: CodeValue::new("111111").unwrap(),
            },
        },
        Some(5),
    );

    fx.engine.run_pending().await;

    let command_opcodes: Vec<u8> = fx
        .handle
        .drain_writes()
        .iter()
        .map(Frame::opcode)
        .filter(|op| *op != 0x14)
        .collect();
    assert_eq!(command_opcodes, vec![0x0D, 0x12]);
}

#[tokio::test(start_paused = true)]
async fn add_class_orders_master_single_multi() {
    let mut fx = fixture();
    for _ in 0..8 {
        fx.handle.reply_with(success());
    }

    let multi_id = seeded_record(&fx, CodeType::MultiUse, "333333", None).await;
    let master_id = seeded_record(&fx, CodeType::Master, "111111", Some(3)).await;
    let single_id = seeded_record(&fx, CodeType::SingleUse, "222222", None).await;

    fx.engine.enqueue(
        TaskRequest::AddMultiUseCode {
            device: fx.device.clone(),
            code_id: multi_id,
            code: CodeValue::new("333333").unwrap(),
        },
        Some(5),
    );
    fx.engine.enqueue(
        TaskRequest::AddMasterCode {
            device: fx.device.clone(),
            code_id: master_id,
            code: CodeValue::new("111111").unwrap(),
            index: CodeIndex::new(3),
        },
        Some(5),
    );
    fx.engine.enqueue(
        TaskRequest::AddSingleUseCode {
            device: fx.device.clone(),
            code_id: single_id,
            code: CodeValue::new("222222").unwrap(),
        },
        Some(5),
    );

    fx.engine.run_pending().await;

    // The master add drags its auto-prerequisite delete (priority 0) to the
    // very front; then master, single, multi in class order.
    let command_opcodes: Vec<u8> = fx
        .handle
        .drain_writes()
        .iter()
        .map(Frame::opcode)
        .filter(|op| *op != 0x14)
        .collect();
    assert_eq!(command_opcodes, vec![0x0C, 0x11, 0x12, 0x13]);
}

#[tokio::test(start_paused = true)]
async fn add_master_inserts_delete_prerequisite() {
    let mut fx = fixture();
    fx.handle.reply_with(success()); // prerequisite delete
    fx.handle.reply_with(success()); // its recount
    fx.handle.reply_with(success()); // create master
    fx.handle.reply_with(success()); // its recount

    let code_id = seeded_record(&fx, CodeType::Master, "424242", Some(0)).await;
    let ids = fx.engine.enqueue(
        TaskRequest::AddMasterCode {
            device: fx.device.clone(),
            code_id,
            code: CodeValue::new("424242").unwrap(),
            index: CodeIndex::new(0),
        },
        None,
    );

    // Exactly two tasks: the priority-0 delete first, then the add.
    assert_eq!(ids.len(), 2);
    let delete_task = fx.engine.task(ids[0]).unwrap();
    let add_task = fx.engine.task(ids[1]).unwrap();
    assert_eq!(delete_task.priority, URGENT_TASK_PRIORITY);
    assert_eq!(add_task.priority, DEFAULT_TASK_PRIORITY);
    assert!(matches!(
        delete_task.request,
        TaskRequest::DeleteCode {
            code_id: None,
            target: DeleteTarget::Master { .. },
            ..
        }
    ));

    assert_eq!(fx.engine.run_pending().await, 2);

    // Delete transmitted before the create.
    let command_opcodes: Vec<u8> = fx
        .handle
        .drain_writes()
        .iter()
        .map(Frame::opcode)
        .filter(|op| *op != 0x14)
        .collect();
    assert_eq!(command_opcodes, vec![0x0C, 0x11]);

    // The record survived the prerequisite delete (no phantom deletion)
    // and is now on-device.
    let record = fx.store.get(code_id).await.unwrap().unwrap();
    assert_eq!(record.status, CodeStatus::OnDevice);
}

#[tokio::test(start_paused = true)]
async fn master_add_purges_duplicate_index_records() {
    let mut fx = fixture();
    for _ in 0..4 {
        fx.handle.reply_with(success());
    }

    // Stale leftover from an earlier failed replacement at the same slot.
    let stale_id = seeded_record(&fx, CodeType::Master, "999999", Some(2)).await;
    let other_slot = seeded_record(&fx, CodeType::Master, "888888", Some(5)).await;
    let new_id = seeded_record(&fx, CodeType::Master, "123456", Some(2)).await;

    fx.engine.enqueue(
        TaskRequest::AddMasterCode {
            device: fx.device.clone(),
            code_id: new_id,
            code: CodeValue::new("123456").unwrap(),
            index: CodeIndex::new(2),
        },
        None,
    );
    fx.engine.run_pending().await;

    assert!(fx.store.get(stale_id).await.unwrap().is_none());
    assert!(fx.store.get(other_slot).await.unwrap().is_some());
    assert_eq!(
        fx.store.get(new_id).await.unwrap().unwrap().status,
        CodeStatus::OnDevice
    );
    let _ = fx.handle.drain_writes();
}

#[rstest::rstest]
#[case::single_use(CodeType::SingleUse)]
#[case::multi_use(CodeType::MultiUse)]
#[tokio::test(start_paused = true)]
async fn idempotent_delete_completes_on_operation_error(#[case] code_type: CodeType) {
    let mut fx = fixture();
    fx.handle.reply_with(op_error());

    let code_id = seeded_record(&fx, code_type, "777777", None).await;
    let code = CodeValue::new("777777").unwrap();
    let target = match code_type {
        CodeType::SingleUse => DeleteTarget::SingleUse { code },
        _ => DeleteTarget::MultiUse { code },
    };
    let ids = fx.engine.enqueue(
        TaskRequest::DeleteCode {
            device: fx.device.clone(),
            code_id: Some(code_id),
            target,
        },
        None,
    );

    fx.engine.run_pending().await;

    // Deleting an already-absent code must not hard-fail.
    let task = fx.engine.task(ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(fx.store.get(code_id).await.unwrap().is_none());
    let _ = fx.handle.drain_writes();
}

#[tokio::test(start_paused = true)]
async fn master_delete_still_fails_on_operation_error() {
    let fx = fixture();
    fx.handle.reply_with(op_error());

    let ids = fx.engine.enqueue(
        TaskRequest::DeleteCode {
            device: fx.device.clone(),
            code_id: None,
            target: DeleteTarget::Master {
                index: CodeIndex::new(1),
            },
        },
        None,
    );
    fx.engine.run_pending().await;

    let task = fx.engine.task(ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempts, 1);
    assert!(task.last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn missing_credentials_fail_unauthorized_without_transmitting() {
    let mut fx = fixture();
    fx.credentials.remove(&fx.device);

    let ids = fx.engine.enqueue(
        TaskRequest::DeleteCode {
            device: fx.device.clone(),
            code_id: None,
            target: DeleteTarget::SingleUse {
                code: CodeValue::new("111111").unwrap(),
            },
        },
        None,
    );
    fx.engine.run_pending().await;

    let task = fx.engine.task(ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.last_error.as_deref().unwrap().contains("unauthorized"));

    // Nothing reached the link.
    assert!(fx.handle.drain_writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failure_cooldown_delays_next_task() {
    let mut fx = fixture();
    fx.handle.reply_with(vec![frame(0xE1, &[0x01])]); // unauthorized
    fx.handle.reply_with(vec![frame(0x81, &[])]); // unlock accepted

    fx.engine.enqueue(
        TaskRequest::DeleteCode {
            device: fx.device.clone(),
            code_id: None,
            target: DeleteTarget::Master {
                index: CodeIndex::new(0),
            },
        },
        Some(1),
    );
    fx.engine.enqueue(unlock(&fx, "1234"), Some(2));

    let t0 = Instant::now();
    fx.engine.run_pending().await;

    // First write at t0; its failure starts the 2s cooldown, after which
    // the unlock goes out (the inter-command delay is already absorbed).
    let writes = fx.handle.drain_writes();
    assert_eq!(writes[0].opcode(), 0x0C);
    assert_eq!(writes[1].opcode(), 0x01);
    assert!(Instant::now().duration_since(t0) >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn retry_resets_a_failed_task() {
    let mut fx = fixture();
    fx.handle.reply_with(op_error()); // first attempt fails

    let ids = fx.engine.enqueue(
        TaskRequest::DeleteCode {
            device: fx.device.clone(),
            code_id: None,
            target: DeleteTarget::Master {
                index: CodeIndex::new(4),
            },
        },
        None,
    );
    fx.engine.run_pending().await;
    assert_eq!(fx.engine.task(ids[0]).unwrap().status, TaskStatus::Failed);

    // Retrying a completed or unknown task is refused.
    assert!(fx.engine.retry(Uuid::new_v4()).is_err());

    fx.engine.retry(ids[0]).unwrap();
    let task = fx.engine.task(ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.attempts, 0);
    assert!(task.last_error.is_none());

    fx.handle.reply_with(success());
    fx.handle.reply_with(success());
    fx.engine.run_pending().await;
    assert_eq!(
        fx.engine.task(ids[0]).unwrap().status,
        TaskStatus::Completed
    );
    let _ = fx.handle.drain_writes();
}

#[tokio::test(start_paused = true)]
async fn unlock_rejected_code_fails_the_task() {
    let fx = fixture();
    fx.handle.reply_with(vec![frame(0x82, &[])]); // invalid code

    let ids = fx.engine.enqueue(unlock(&fx, "0000"), None);
    fx.engine.run_pending().await;

    let task = fx.engine.task(ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn tasks_are_never_deleted() {
    let fx = fixture();
    fx.handle.reply_with(op_error());
    fx.handle.reply_with(vec![frame(0x81, &[])]);

    let failed = fx.engine.enqueue(
        TaskRequest::DeleteCode {
            device: fx.device.clone(),
            code_id: None,
            target: DeleteTarget::Master {
                index: CodeIndex::new(9),
            },
        },
        Some(1),
    );
    let completed = fx.engine.enqueue(unlock(&fx, "1234"), Some(2));
    fx.engine.run_pending().await;

    let tasks = fx.engine.tasks();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().any(|t| t.id == failed[0]));
    assert!(tasks.iter().any(|t| t.id == completed[0]));
}
