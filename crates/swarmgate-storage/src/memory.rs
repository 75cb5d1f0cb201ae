//! In-memory storage provider
//!
//! Process-local tables for tests and ephemeral single-process deployments.
//! Reflection records and audit entries keep insertion order in a Vec; keyed
//! tables live in `DashMap`s.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use swarmgate_types::{AeId, Capability, KeyRecord, ReflectionRecord, RefreshToken, Session};

use crate::{AuditEvent, Storage, StorageResult};

/// In-memory provider.
#[derive(Default)]
pub struct MemoryStorage {
    keys: DashMap<String, KeyRecord>,
    /// fingerprint -> ae_id
    fingerprints: DashMap<String, String>,
    capabilities: DashMap<String, Capability>,
    sessions: DashMap<Uuid, Session>,
    refresh_tokens: DashMap<Uuid, RefreshToken>,
    reflections: Mutex<Vec<ReflectionRecord>>,
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upsert_key(&self, record: &KeyRecord) -> StorageResult<()> {
        if let Some(old) = self.keys.get(record.ae_id.as_str()) {
            // A re-provisioned key may change the fingerprint; drop the old
            // secondary index entry.
            if old.pubkey_fingerprint != record.pubkey_fingerprint {
                self.fingerprints.remove(&old.pubkey_fingerprint);
            }
        }
        self.fingerprints
            .insert(record.pubkey_fingerprint.clone(), record.ae_id.0.clone());
        self.keys.insert(record.ae_id.0.clone(), record.clone());
        Ok(())
    }

    async fn get_key(&self, ae_id: &AeId) -> StorageResult<Option<KeyRecord>> {
        Ok(self.keys.get(ae_id.as_str()).map(|r| r.clone()))
    }

    async fn get_key_by_fingerprint(&self, fingerprint: &str) -> StorageResult<Option<KeyRecord>> {
        let Some(ae_id) = self.fingerprints.get(fingerprint).map(|r| r.clone()) else {
            return Ok(None);
        };
        Ok(self.keys.get(&ae_id).map(|r| r.clone()))
    }

    async fn list_keys(&self) -> StorageResult<Vec<KeyRecord>> {
        let mut keys: Vec<KeyRecord> = self.keys.iter().map(|r| r.clone()).collect();
        keys.sort_by(|a, b| a.ae_id.cmp(&b.ae_id));
        Ok(keys)
    }

    async fn upsert_capability(&self, capability: &Capability) -> StorageResult<()> {
        self.capabilities
            .insert(capability.ae_id.0.clone(), capability.clone());
        Ok(())
    }

    async fn get_capability(&self, ae_id: &AeId) -> StorageResult<Option<Capability>> {
        Ok(self.capabilities.get(ae_id.as_str()).map(|c| c.clone()))
    }

    async fn list_capabilities(&self) -> StorageResult<Vec<Capability>> {
        let mut caps: Vec<Capability> = self.capabilities.iter().map(|c| c.clone()).collect();
        caps.sort_by(|a, b| a.ae_id.cmp(&b.ae_id));
        Ok(caps)
    }

    async fn upsert_session(&self, session: &Session) -> StorageResult<()> {
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &Uuid) -> StorageResult<Option<Session>> {
        Ok(self.sessions.get(id).map(|s| s.clone()))
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> StorageResult<()> {
        self.refresh_tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn update_refresh_token(&self, token: &RefreshToken) -> StorageResult<()> {
        self.refresh_tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn get_refresh_token(&self, id: &Uuid) -> StorageResult<Option<RefreshToken>> {
        Ok(self.refresh_tokens.get(id).map(|t| t.clone()))
    }

    async fn list_refresh_tokens(&self, session_id: &Uuid) -> StorageResult<Vec<RefreshToken>> {
        let mut tokens: Vec<RefreshToken> = self
            .refresh_tokens
            .iter()
            .filter(|t| &t.session_id == session_id)
            .map(|t| t.clone())
            .collect();
        tokens.sort_by_key(|t| t.rotation);
        Ok(tokens)
    }

    async fn append_reflection(&self, record: &ReflectionRecord) -> StorageResult<()> {
        self.reflections.lock().push(record.clone());
        Ok(())
    }

    async fn all_reflections(&self) -> StorageResult<Vec<ReflectionRecord>> {
        Ok(self.reflections.lock().clone())
    }

    async fn log_event(&self, event: &str, payload: Value) -> StorageResult<()> {
        self.events.lock().push(AuditEvent {
            ts: Utc::now(),
            event: event.to_string(),
            payload,
        });
        Ok(())
    }

    async fn recent_events(&self, limit: usize) -> StorageResult<Vec<AuditEvent>> {
        let events = self.events.lock();
        let start = events.len().saturating_sub(limit);
        Ok(events[start..].to_vec())
    }
}
