//! The provisioning task engine.
//!
//! Owns every task state transition. Exactly one task executes at a time:
//! the engine keeps its own single-flight guard on top of the command
//! queue's serialization, as defense against reentrant scheduling from
//! external state changes.

use crate::credentials::CredentialProvider;
use crate::store::{CodeStatus, CodeStore};
use crate::task::{DeleteTarget, ProvisionTask, TaskRequest, TaskStatus};
use chrono::Utc;
use latchkey_core::{
    CodeIndex, CodeType, ConfigKey, DeviceErrorKind, DeviceId, Error, Result,
    constants::{DEFAULT_TASK_PRIORITY, TASK_FAILURE_COOLDOWN_MS, URGENT_TASK_PRIORITY},
};
use latchkey_link::{CommandQueue, SendOptions};
use latchkey_protocol::{
    command::{
        CountCodes, CreateMasterCode, CreateMultiUseCode, CreateSingleUseCode, DeleteMasterCode,
        DeleteMultiUseCode, DeleteSingleUseCode, OpenDoor,
    },
    event::{DecodeContext, DeviceEvent},
};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

/// Orders and executes code-management operations, reconciling results into
/// the desired-state store.
///
/// The task collection is append-only: completed and failed tasks remain
/// inspectable through [`TaskEngine::tasks`]. Nothing retries on its own —
/// [`TaskEngine::retry`] is the only way back from `Failed`.
pub struct TaskEngine<S, C> {
    queue: CommandQueue,
    store: S,
    credentials: C,
    tasks: Mutex<Vec<ProvisionTask>>,
    seq: AtomicU64,
    run_guard: AsyncMutex<()>,
}

impl<S: CodeStore, C: CredentialProvider> TaskEngine<S, C> {
    #[must_use]
    pub fn new(queue: CommandQueue, store: S, credentials: C) -> Self {
        Self {
            queue,
            store,
            credentials,
            tasks: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
            run_guard: AsyncMutex::new(()),
        }
    }

    /// The desired-state store this engine reconciles into.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Append a task. Returns the ids of all tasks created.
    ///
    /// Adding a master code atomically inserts a delete-at-same-index
    /// prerequisite at the highest priority, scheduled to run first: the
    /// device offers no atomic replace, and writing to an occupied slot
    /// produces undefined state. The prerequisite carries no record id so
    /// it can never remove the record of the code about to be written.
    pub fn enqueue(&self, request: TaskRequest, priority: Option<u8>) -> Vec<Uuid> {
        let priority = priority.unwrap_or(DEFAULT_TASK_PRIORITY);
        let mut created = Vec::new();

        let mut tasks = self.tasks.lock().expect("task list lock");
        if let TaskRequest::AddMasterCode { device, index, .. } = &request {
            let prerequisite = TaskRequest::DeleteCode {
                device: device.clone(),
                code_id: None,
                target: DeleteTarget::Master { index: *index },
            };
            created.push(self.push_task(&mut tasks, prerequisite, URGENT_TASK_PRIORITY));
        }
        created.push(self.push_task(&mut tasks, request, priority));
        created
    }

    fn push_task(
        &self,
        tasks: &mut Vec<ProvisionTask>,
        request: TaskRequest,
        priority: u8,
    ) -> Uuid {
        let task = ProvisionTask {
            id: Uuid::new_v4(),
            request,
            priority,
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
        };
        let id = task.id;
        tracing::debug!(task = task.request.label(), %id, priority, "task enqueued");
        tasks.push(task);
        id
    }

    /// Snapshot of all tasks, in insertion order.
    #[must_use]
    pub fn tasks(&self) -> Vec<ProvisionTask> {
        self.tasks.lock().expect("task list lock").clone()
    }

    /// One task by id.
    #[must_use]
    pub fn task(&self, id: Uuid) -> Option<ProvisionTask> {
        self.tasks
            .lock()
            .expect("task list lock")
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    /// Reset a failed task to pending so the next run picks it up again.
    ///
    /// Attempts and the stored error are cleared; the task record itself
    /// keeps its place in history.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the task does not exist or is not in
    /// the failed state.
    pub fn retry(&self, id: Uuid) -> Result<()> {
        let mut tasks = self.tasks.lock().expect("task list lock");
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::Validation(format!("no task {id}")))?;
        if task.status != TaskStatus::Failed {
            return Err(Error::Validation(format!(
                "task {id} is not failed (status {:?})",
                task.status
            )));
        }
        task.status = TaskStatus::Pending;
        task.attempts = 0;
        task.last_error = None;
        Ok(())
    }

    /// Process pending tasks until none are eligible.
    ///
    /// Runs exactly one task at a time; a reentrant call returns
    /// immediately with 0. Failures are converted into failed tasks, never
    /// propagated, and a fixed cooldown separates a failure from the next
    /// attempt at anything.
    pub async fn run_pending(&self) -> usize {
        let Ok(_guard) = self.run_guard.try_lock() else {
            tracing::debug!("task run already in progress");
            return 0;
        };

        let cooldown = Duration::from_millis(TASK_FAILURE_COOLDOWN_MS);
        let mut processed = 0;

        while let Some((id, request)) = self.next_eligible() {
            self.mark_processing(id);
            match self.execute(&request).await {
                Ok(()) => {
                    tracing::info!(task = request.label(), %id, "task completed");
                    self.mark_completed(id);
                }
                Err(err) => {
                    tracing::warn!(task = request.label(), %id, %err, "task failed");
                    self.mark_failed(id, err.to_string());
                    tokio::time::sleep(cooldown).await;
                }
            }
            processed += 1;
        }
        processed
    }

    /// The most urgent pending task, per the scheduling order.
    fn next_eligible(&self) -> Option<(Uuid, TaskRequest)> {
        let tasks = self.tasks.lock().expect("task list lock");
        tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .min_by_key(|t| t.sort_key())
            .map(|t| (t.id, t.request.clone()))
    }

    fn mark_processing(&self, id: Uuid) {
        self.update_task(id, |task| task.status = TaskStatus::Processing);
    }

    fn mark_completed(&self, id: Uuid) {
        self.update_task(id, |task| task.status = TaskStatus::Completed);
    }

    fn mark_failed(&self, id: Uuid, message: String) {
        self.update_task(id, |task| {
            task.status = TaskStatus::Failed;
            task.attempts += 1;
            task.last_error = Some(message.clone());
        });
    }

    fn update_task(&self, id: Uuid, f: impl FnOnce(&mut ProvisionTask)) {
        let mut tasks = self.tasks.lock().expect("task list lock");
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            f(task);
        }
    }

    fn require_key(&self, device: &DeviceId) -> Result<ConfigKey> {
        // Missing credentials surface exactly like the device refusing
        // them: the caller must supply a valid key before any retry.
        self.credentials
            .configuration_key(device)
            .ok_or(Error::Device(DeviceErrorKind::Unauthorized))
    }

    async fn execute(&self, request: &TaskRequest) -> Result<()> {
        match request {
            TaskRequest::AddMasterCode {
                device,
                code_id,
                code,
                index,
            } => {
                let key = self.require_key(device)?;
                let cmd = CreateMasterCode::new(key, *index, code.clone());
                self.queue.send(&cmd, SendOptions::default()).await?;

                self.mark_record_on_device(*code_id).await;
                self.purge_duplicate_masters(device, *code_id, *index).await?;
                self.recount().await;
                Ok(())
            }

            TaskRequest::AddSingleUseCode {
                device,
                code_id,
                code,
            } => {
                let key = self.require_key(device)?;
                let cmd = CreateSingleUseCode::new(key, code.clone());
                self.queue.send(&cmd, SendOptions::default()).await?;

                self.mark_record_on_device(*code_id).await;
                self.recount().await;
                Ok(())
            }

            TaskRequest::AddMultiUseCode {
                device,
                code_id,
                code,
            } => {
                let key = self.require_key(device)?;
                let cmd = CreateMultiUseCode::new(key, code.clone());
                self.queue.send(&cmd, SendOptions::default()).await?;

                self.mark_record_on_device(*code_id).await;
                self.recount().await;
                Ok(())
            }

            TaskRequest::DeleteCode {
                device,
                code_id,
                target,
            } => {
                let key = self.require_key(device)?;
                match target {
                    DeleteTarget::Master { index } => {
                        let cmd = DeleteMasterCode::new(key, *index);
                        self.queue.send(&cmd, SendOptions::default()).await?;
                    }
                    DeleteTarget::SingleUse { code } => {
                        let cmd = DeleteSingleUseCode::new(key, code.clone());
                        idempotent(self.queue.send(&cmd, SendOptions::default()).await)?;
                    }
                    DeleteTarget::MultiUse { code } => {
                        let cmd = DeleteMultiUseCode::new(key, code.clone());
                        idempotent(self.queue.send(&cmd, SendOptions::default()).await)?;
                    }
                }

                if let Some(id) = code_id {
                    self.store.delete(*id).await?;
                }
                self.recount().await;
                Ok(())
            }

            TaskRequest::Unlock { code, .. } => {
                let cmd = OpenDoor::new(code.clone());
                let response = self.queue.send(&cmd, SendOptions::default()).await?;
                let rejected = response
                    .frame()
                    .map(|f| DeviceEvent::decode(f, &DecodeContext::now()))
                    .is_some_and(|event| event == DeviceEvent::CodeCheck { accepted: false });
                if rejected {
                    return Err(Error::Device(DeviceErrorKind::OperationError));
                }
                Ok(())
            }
        }
    }

    /// Flip the desired-state record to on-device. A missing or failing
    /// store entry is logged, not fatal: the device-side operation already
    /// succeeded.
    async fn mark_record_on_device(&self, code_id: Uuid) {
        match self.store.get(code_id).await {
            Ok(Some(mut record)) => {
                record.status = CodeStatus::OnDevice;
                if let Err(err) = self.store.put(record).await {
                    tracing::warn!(%code_id, %err, "failed to update code record");
                }
            }
            Ok(None) => tracing::warn!(%code_id, "no code record to mark on-device"),
            Err(err) => tracing::warn!(%code_id, %err, "code record lookup failed"),
        }
    }

    /// Remove stale local records sharing the slot of a just-written master
    /// code (leftovers of earlier failed replacements).
    async fn purge_duplicate_masters(
        &self,
        device: &DeviceId,
        keep: Uuid,
        index: CodeIndex,
    ) -> Result<()> {
        for record in self.store.by_device(device).await? {
            if record.code_type == CodeType::Master
                && record.index == Some(index)
                && record.id != keep
            {
                tracing::debug!(stale = %record.id, %index, "purging duplicate master record");
                self.store.delete(record.id).await?;
            }
        }
        Ok(())
    }

    /// Ask the device to recount its codes, fire-and-forget.
    async fn recount(&self) {
        let options = SendOptions::default().fire_and_forget();
        if let Err(err) = self.queue.send(&CountCodes, options).await {
            tracing::warn!(%err, "recount request failed");
        }
    }
}

/// Idempotency workaround: the firmware reports operation-error when asked
/// to delete a single/multi-use code it no longer has; that must not fail
/// the deletion. Master deletions deliberately keep failing hard — whether
/// the same leniency is safe there is unconfirmed with firmware owners.
fn idempotent(result: Result<latchkey_link::Response>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(Error::Device(DeviceErrorKind::OperationError)) => Ok(()),
        Err(err) => Err(err),
    }
}
