//! Reflection stores
//!
//! Append-only and durable. Two backends: in-memory for tests and ephemeral
//! runs, and the storage port (SQLite in production) for durability.
//! `all()` returns records in insertion order.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use swarmgate_storage::{Storage, StorageResult};
use swarmgate_types::ReflectionRecord;

/// Append-only record store.
#[async_trait]
pub trait ReflectionStore: Send + Sync {
    /// Persist a record. Records are immutable after append.
    async fn append(&self, record: ReflectionRecord) -> StorageResult<()>;

    /// All records in insertion order.
    async fn all(&self) -> StorageResult<Vec<ReflectionRecord>>;
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryReflectionStore {
    records: Mutex<Vec<ReflectionRecord>>,
}

impl InMemoryReflectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReflectionStore for InMemoryReflectionStore {
    async fn append(&self, record: ReflectionRecord) -> StorageResult<()> {
        self.records.lock().push(record);
        Ok(())
    }

    async fn all(&self) -> StorageResult<Vec<ReflectionRecord>> {
        Ok(self.records.lock().clone())
    }
}

/// Durable store over the storage port.
pub struct StorageReflectionStore {
    storage: Arc<dyn Storage>,
}

impl StorageReflectionStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ReflectionStore for StorageReflectionStore {
    async fn append(&self, record: ReflectionRecord) -> StorageResult<()> {
        self.storage.append_reflection(&record).await
    }

    async fn all(&self) -> StorageResult<Vec<ReflectionRecord>> {
        self.storage.all_reflections().await
    }
}
