//! Swarmgate Keyring - AE identity registry
//!
//! Maps `ae_id` to (public key, roles, trust status, fingerprint). The
//! fingerprint is computed once at insert and indexed as a secondary lookup
//! key. Revocation flips the status but retains the row for audit.
//!
//! Lookups are O(1) on both keys via in-memory indexes warmed from the
//! storage port at startup; every write goes through storage first.

use std::sync::Arc;

use dashmap::DashMap;

use swarmgate_crypto::compute_fingerprint;
use swarmgate_storage::{Storage, StorageResult};
use swarmgate_types::{AeId, BrokerError, BrokerResult, KeyRecord, TrustStatus};

/// The AE identity registry.
pub struct Keyring {
    storage: Arc<dyn Storage>,
    by_ae: DashMap<String, KeyRecord>,
    /// fingerprint -> ae_id
    by_fingerprint: DashMap<String, String>,
}

impl Keyring {
    /// Create an empty keyring over the given storage.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            by_ae: DashMap::new(),
            by_fingerprint: DashMap::new(),
        }
    }

    /// Warm the in-memory indexes from storage. Called once at startup.
    pub async fn load(&self) -> StorageResult<usize> {
        let keys = self.storage.list_keys().await?;
        let count = keys.len();
        for record in keys {
            self.index(record);
        }
        tracing::info!(keys = count, "keyring loaded");
        Ok(count)
    }

    /// Provision (or re-provision) an AE key. Idempotent on `ae_id`.
    ///
    /// The fingerprint is derived here and never recomputed afterwards.
    pub async fn add_key(
        &self,
        ae_id: impl Into<AeId>,
        pubkey_b64: &str,
        roles: Vec<String>,
        status: TrustStatus,
    ) -> BrokerResult<KeyRecord> {
        let ae_id = ae_id.into();
        let fingerprint = compute_fingerprint(pubkey_b64)
            .map_err(|e| BrokerError::InvalidEnvelope(format!("bad public key: {e}")))?;

        let record = KeyRecord {
            ae_id: ae_id.clone(),
            pubkey_b64: pubkey_b64.to_string(),
            pubkey_fingerprint: fingerprint,
            roles,
            status,
            expires_at: None,
        };

        self.storage.upsert_key(&record).await?;
        self.index(record.clone());
        tracing::info!(ae_id = %ae_id, status = status.as_str(), "key provisioned");
        Ok(record)
    }

    /// Primary lookup.
    pub fn get_by_aeid(&self, ae_id: &AeId) -> Option<KeyRecord> {
        self.by_ae.get(ae_id.as_str()).map(|r| r.clone())
    }

    /// Secondary lookup by key fingerprint.
    pub fn get_by_fingerprint(&self, fingerprint: &str) -> Option<KeyRecord> {
        let ae_id = self.by_fingerprint.get(fingerprint).map(|r| r.clone())?;
        self.by_ae.get(&ae_id).map(|r| r.clone())
    }

    /// Revoke an AE key. The record is retained with `status = revoked`.
    pub async fn revoke(&self, ae_id: &AeId) -> BrokerResult<KeyRecord> {
        let mut record = self
            .get_by_aeid(ae_id)
            .ok_or_else(|| BrokerError::UnknownAe(ae_id.to_string()))?;

        record.status = TrustStatus::Revoked;
        self.storage.upsert_key(&record).await?;
        self.index(record.clone());
        tracing::warn!(ae_id = %ae_id, "key revoked");
        Ok(record)
    }

    /// All records, ordered by `ae_id`.
    pub fn list_keys(&self) -> Vec<KeyRecord> {
        let mut keys: Vec<KeyRecord> = self.by_ae.iter().map(|r| r.clone()).collect();
        keys.sort_by(|a, b| a.ae_id.cmp(&b.ae_id));
        keys
    }

    fn index(&self, record: KeyRecord) {
        if let Some(old) = self.by_ae.get(record.ae_id.as_str()) {
            if old.pubkey_fingerprint != record.pubkey_fingerprint {
                self.by_fingerprint.remove(&old.pubkey_fingerprint);
            }
        }
        self.by_fingerprint
            .insert(record.pubkey_fingerprint.clone(), record.ae_id.0.clone());
        self.by_ae.insert(record.ae_id.0.clone(), record);
    }
}
