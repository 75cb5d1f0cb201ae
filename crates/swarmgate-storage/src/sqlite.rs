//! SQLite storage provider
//!
//! Durable single-process backend. Rows carry the full domain record as JSON
//! plus the columns the broker filters on, so schema evolution stays cheap
//! while lookups keep their indexes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

use swarmgate_types::{AeId, Capability, KeyRecord, ReflectionRecord, RefreshToken, Session};

use crate::{AuditEvent, Storage, StorageError, StorageResult};

/// SQLx-backed SQLite provider.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Connect and ensure the schema exists.
    ///
    /// Accepts any SQLx SQLite URL (`sqlite:swarmgate.db`, `sqlite::memory:`).
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .create_if_missing(true);

        // An in-memory database exists per connection; a pool of one keeps
        // all statements on the same database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    async fn ensure_schema(&self) -> StorageResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS abi_keys (
                ae_id TEXT PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                record TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_abi_keys_fingerprint ON abi_keys (fingerprint)",
            r#"
            CREATE TABLE IF NOT EXISTS capabilities (
                ae_id TEXT PRIMARY KEY,
                updated_at TEXT NOT NULL,
                record TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                record TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS refresh_tokens (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                rotation INTEGER NOT NULL,
                record TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_refresh_session ON refresh_tokens (session_id)",
            r#"
            CREATE TABLE IF NOT EXISTS reflection_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                ae_id TEXT,
                session_id TEXT,
                event_type TEXT,
                record TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                event TEXT NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Migration(e.to_string()))?;
        }
        Ok(())
    }

    fn decode<T: serde::de::DeserializeOwned>(record: &str) -> StorageResult<T> {
        serde_json::from_str(record).map_err(|e| StorageError::Corrupt(e.to_string()))
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn upsert_key(&self, record: &KeyRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO abi_keys (ae_id, fingerprint, record)
            VALUES (?, ?, ?)
            ON CONFLICT(ae_id) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                record = excluded.record
            "#,
        )
        .bind(record.ae_id.as_str())
        .bind(&record.pubkey_fingerprint)
        .bind(serde_json::to_string(record)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_key(&self, ae_id: &AeId) -> StorageResult<Option<KeyRecord>> {
        let row = sqlx::query("SELECT record FROM abi_keys WHERE ae_id = ?")
            .bind(ae_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::decode(r.get::<String, _>("record").as_str()))
            .transpose()
    }

    async fn get_key_by_fingerprint(&self, fingerprint: &str) -> StorageResult<Option<KeyRecord>> {
        let row = sqlx::query("SELECT record FROM abi_keys WHERE fingerprint = ?")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::decode(r.get::<String, _>("record").as_str()))
            .transpose()
    }

    async fn list_keys(&self) -> StorageResult<Vec<KeyRecord>> {
        let rows = sqlx::query("SELECT record FROM abi_keys ORDER BY ae_id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| Self::decode(r.get::<String, _>("record").as_str()))
            .collect()
    }

    async fn upsert_capability(&self, capability: &Capability) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO capabilities (ae_id, updated_at, record)
            VALUES (?, ?, ?)
            ON CONFLICT(ae_id) DO UPDATE SET
                updated_at = excluded.updated_at,
                record = excluded.record
            "#,
        )
        .bind(capability.ae_id.as_str())
        .bind(capability.updated_at.to_rfc3339())
        .bind(serde_json::to_string(capability)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_capability(&self, ae_id: &AeId) -> StorageResult<Option<Capability>> {
        let row = sqlx::query("SELECT record FROM capabilities WHERE ae_id = ?")
            .bind(ae_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::decode(r.get::<String, _>("record").as_str()))
            .transpose()
    }

    async fn list_capabilities(&self) -> StorageResult<Vec<Capability>> {
        let rows = sqlx::query("SELECT record FROM capabilities ORDER BY ae_id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| Self::decode(r.get::<String, _>("record").as_str()))
            .collect()
    }

    async fn upsert_session(&self, session: &Session) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, record)
            VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET record = excluded.record
            "#,
        )
        .bind(session.id.to_string())
        .bind(serde_json::to_string(session)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, id: &Uuid) -> StorageResult<Option<Session>> {
        let row = sqlx::query("SELECT record FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::decode(r.get::<String, _>("record").as_str()))
            .transpose()
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens (id, session_id, rotation, record) VALUES (?, ?, ?, ?)",
        )
        .bind(token.id.to_string())
        .bind(token.session_id.to_string())
        .bind(token.rotation as i64)
        .bind(serde_json::to_string(token)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_refresh_token(&self, token: &RefreshToken) -> StorageResult<()> {
        sqlx::query("UPDATE refresh_tokens SET record = ? WHERE id = ?")
            .bind(serde_json::to_string(token)?)
            .bind(token.id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_refresh_token(&self, id: &Uuid) -> StorageResult<Option<RefreshToken>> {
        let row = sqlx::query("SELECT record FROM refresh_tokens WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::decode(r.get::<String, _>("record").as_str()))
            .transpose()
    }

    async fn list_refresh_tokens(&self, session_id: &Uuid) -> StorageResult<Vec<RefreshToken>> {
        let rows = sqlx::query(
            "SELECT record FROM refresh_tokens WHERE session_id = ? ORDER BY rotation",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| Self::decode(r.get::<String, _>("record").as_str()))
            .collect()
    }

    async fn append_reflection(&self, record: &ReflectionRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reflection_events (ts, ae_id, session_id, event_type, record)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.ts.to_rfc3339())
        .bind(record.correlation.ae_id.as_deref())
        .bind(record.correlation.session_id.as_deref())
        .bind(&record.event_type)
        .bind(serde_json::to_string(record)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn all_reflections(&self) -> StorageResult<Vec<ReflectionRecord>> {
        let rows = sqlx::query("SELECT record FROM reflection_events ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| Self::decode(r.get::<String, _>("record").as_str()))
            .collect()
    }

    async fn log_event(&self, event: &str, payload: Value) -> StorageResult<()> {
        sqlx::query("INSERT INTO audit_log (ts, event, payload) VALUES (?, ?, ?)")
            .bind(Utc::now().to_rfc3339())
            .bind(event)
            .bind(payload.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recent_events(&self, limit: usize) -> StorageResult<Vec<AuditEvent>> {
        let rows = sqlx::query(
            "SELECT ts, event, payload FROM audit_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut events = rows
            .iter()
            .map(|row| {
                let ts: String = row.get("ts");
                let ts = DateTime::parse_from_rfc3339(&ts)
                    .map_err(|e| StorageError::Corrupt(e.to_string()))?
                    .with_timezone(&Utc);
                let payload: String = row.get("payload");
                Ok(AuditEvent {
                    ts,
                    event: row.get("event"),
                    payload: serde_json::from_str(&payload)?,
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;

        events.reverse();
        Ok(events)
    }
}
