//! Desired-state store interface.
//!
//! The engine never owns persistence: it reads and writes code records
//! through this narrow trait and treats the implementation as an external
//! collaborator. [`MemoryCodeStore`] is the reference implementation used in
//! tests and small embeddings.

use chrono::{DateTime, Utc};
use latchkey_core::{CodeIndex, CodeType, CodeValue, DeviceId, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Local bookkeeping of a code's intended versus observed device status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeStatus {
    /// Created locally, not yet written to the device.
    PendingAdd,
    /// Confirmed present on the device.
    OnDevice,
    /// Marked for removal, not yet deleted from the device.
    PendingDelete,
    /// The device refused this code.
    Rejected,
}

/// A desired-state code record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRecord {
    pub id: Uuid,
    pub device_id: DeviceId,
    pub code_type: CodeType,
    pub value: CodeValue,
    /// On-device slot, master codes only.
    pub index: Option<CodeIndex>,
    pub status: CodeStatus,
    pub created_at: DateTime<Utc>,
}

impl CodeRecord {
    /// A fresh pending-add record.
    #[must_use]
    pub fn new(
        device_id: DeviceId,
        code_type: CodeType,
        value: CodeValue,
        index: Option<CodeIndex>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
            code_type,
            value,
            index,
            status: CodeStatus::PendingAdd,
            created_at: Utc::now(),
        }
    }
}

/// Narrow key-value/query interface over code records.
///
/// Implementations are external collaborators (a database, a file, a sync
/// service); the engine only needs these four operations.
pub trait CodeStore: Send + Sync {
    /// Fetch a record by id.
    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<CodeRecord>>> + Send;

    /// Insert or replace a record.
    fn put(&self, record: CodeRecord) -> impl Future<Output = Result<()>> + Send;

    /// Remove a record. Removing an absent record is not an error.
    fn delete(&self, id: Uuid) -> impl Future<Output = Result<()>> + Send;

    /// All records belonging to a device.
    fn by_device(&self, device: &DeviceId) -> impl Future<Output = Result<Vec<CodeRecord>>> + Send;
}

impl<S: CodeStore> CodeStore for std::sync::Arc<S> {
    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<CodeRecord>>> + Send {
        S::get(self, id)
    }

    fn put(&self, record: CodeRecord) -> impl Future<Output = Result<()>> + Send {
        S::put(self, record)
    }

    fn delete(&self, id: Uuid) -> impl Future<Output = Result<()>> + Send {
        S::delete(self, id)
    }

    fn by_device(&self, device: &DeviceId) -> impl Future<Output = Result<Vec<CodeRecord>>> + Send {
        S::by_device(self, device)
    }
}

/// In-memory [`CodeStore`] for tests and reference use.
#[derive(Debug, Default)]
pub struct MemoryCodeStore {
    records: RwLock<HashMap<Uuid, CodeRecord>>,
}

impl MemoryCodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err() -> Error {
        Error::Storage("memory store lock poisoned".into())
    }
}

impl CodeStore for MemoryCodeStore {
    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<CodeRecord>>> + Send {
        let result = self
            .records
            .read()
            .map_err(|_| Self::lock_err())
            .map(|map| map.get(&id).cloned());
        async move { result }
    }

    fn put(&self, record: CodeRecord) -> impl Future<Output = Result<()>> + Send {
        let result = self
            .records
            .write()
            .map_err(|_| Self::lock_err())
            .map(|mut map| {
                map.insert(record.id, record);
            });
        async move { result }
    }

    fn delete(&self, id: Uuid) -> impl Future<Output = Result<()>> + Send {
        let result = self
            .records
            .write()
            .map_err(|_| Self::lock_err())
            .map(|mut map| {
                map.remove(&id);
            });
        async move { result }
    }

    fn by_device(&self, device: &DeviceId) -> impl Future<Output = Result<Vec<CodeRecord>>> + Send {
        let result = self.records.read().map_err(|_| Self::lock_err()).map(|map| {
            map.values()
                .filter(|record| &record.device_id == device)
                .cloned()
                .collect()
        });
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceId {
        DeviceId::new("dev-1").unwrap()
    }

    fn record(device_id: DeviceId) -> CodeRecord {
        CodeRecord::new(
            device_id,
            CodeType::SingleUse,
            CodeValue::new("123456").unwrap(),
            None,
        )
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryCodeStore::new();
        let rec = record(device());
        let id = rec.id;

        store.put(rec.clone()).await.unwrap();
        assert_eq!(store.get(id).await.unwrap(), Some(rec));

        store.delete(id).await.unwrap();
        assert_eq!(store.get(id).await.unwrap(), None);

        // Deleting again is fine.
        store.delete(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_by_device_filters() {
        let store = MemoryCodeStore::new();
        let dev_a = DeviceId::new("a").unwrap();
        let dev_b = DeviceId::new("b").unwrap();
        store.put(record(dev_a.clone())).await.unwrap();
        store.put(record(dev_a.clone())).await.unwrap();
        store.put(record(dev_b.clone())).await.unwrap();

        assert_eq!(store.by_device(&dev_a).await.unwrap().len(), 2);
        assert_eq!(store.by_device(&dev_b).await.unwrap().len(), 1);
    }
}
