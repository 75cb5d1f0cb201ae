//! Swarmgate Storage Port
//!
//! Persistence boundary for broker state: key records, capability
//! declarations, sessions, refresh tokens, reflection records, and the audit
//! event log. Two providers implement the port:
//!
//! - **`MemoryStorage`**: process-local tables, used by tests and ephemeral
//!   deployments
//! - **`SqliteStorage`**: SQLx-backed SQLite with single-statement
//!   durability, the durable default
//!
//! Managers own their slices of state and route every mutation through this
//! port; nothing else touches the backing tables.

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use swarmgate_types::{AeId, Capability, KeyRecord, ReflectionRecord, RefreshToken, Session};

/// One structured audit entry, written before any rejection is surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: DateTime<Utc>,
    pub event: String,
    pub payload: Value,
}

/// The storage port. All methods provide at-least single-statement
/// durability; concurrency semantics beyond that are the callers' contract.
#[async_trait]
pub trait Storage: Send + Sync {
    // ------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------
    async fn upsert_key(&self, record: &KeyRecord) -> StorageResult<()>;
    async fn get_key(&self, ae_id: &AeId) -> StorageResult<Option<KeyRecord>>;
    async fn get_key_by_fingerprint(&self, fingerprint: &str) -> StorageResult<Option<KeyRecord>>;
    async fn list_keys(&self) -> StorageResult<Vec<KeyRecord>>;

    // ------------------------------------------------------------------
    // Capabilities
    // ------------------------------------------------------------------
    async fn upsert_capability(&self, capability: &Capability) -> StorageResult<()>;
    async fn get_capability(&self, ae_id: &AeId) -> StorageResult<Option<Capability>>;
    async fn list_capabilities(&self) -> StorageResult<Vec<Capability>>;

    // ------------------------------------------------------------------
    // Sessions & refresh tokens
    // ------------------------------------------------------------------
    async fn upsert_session(&self, session: &Session) -> StorageResult<()>;
    async fn get_session(&self, id: &Uuid) -> StorageResult<Option<Session>>;

    async fn insert_refresh_token(&self, token: &RefreshToken) -> StorageResult<()>;
    async fn update_refresh_token(&self, token: &RefreshToken) -> StorageResult<()>;
    async fn get_refresh_token(&self, id: &Uuid) -> StorageResult<Option<RefreshToken>>;
    /// Tokens of one session, ordered by rotation counter
    async fn list_refresh_tokens(&self, session_id: &Uuid) -> StorageResult<Vec<RefreshToken>>;

    // ------------------------------------------------------------------
    // Reflection records (append-only)
    // ------------------------------------------------------------------
    async fn append_reflection(&self, record: &ReflectionRecord) -> StorageResult<()>;
    /// All records in insertion order
    async fn all_reflections(&self) -> StorageResult<Vec<ReflectionRecord>>;

    // ------------------------------------------------------------------
    // Audit log
    // ------------------------------------------------------------------
    async fn log_event(&self, event: &str, payload: Value) -> StorageResult<()>;
    /// Most recent audit entries, newest last
    async fn recent_events(&self, limit: usize) -> StorageResult<Vec<AuditEvent>>;
}
