//! Admission service - cryptographic challenge/response
//!
//! `issue_challenge` hands the AE a random 32-byte nonce with a short TTL;
//! `verify_response` checks the Ed25519 signature over the raw nonce bytes
//! against the keyring-held public key. Nonces are one-shot: consumed on
//! success, discarded on expiry.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;

use swarmgate_crypto::{b64e, verify_with_b64_key};
use swarmgate_keyring::Keyring;
use swarmgate_types::{AeId, BrokerError, BrokerResult, TrustStatus};

/// Default nonce lifetime.
pub const CHALLENGE_TTL_SECS: i64 = 60;

struct PendingChallenge {
    nonce: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// Challenge/response admission over the keyring.
pub struct AdmissionService {
    keyring: Arc<Keyring>,
    pending: DashMap<String, PendingChallenge>,
    ttl: Duration,
}

impl AdmissionService {
    pub fn new(keyring: Arc<Keyring>) -> Self {
        Self::with_ttl(keyring, Duration::seconds(CHALLENGE_TTL_SECS))
    }

    pub fn with_ttl(keyring: Arc<Keyring>, ttl: Duration) -> Self {
        Self {
            keyring,
            pending: DashMap::new(),
            ttl,
        }
    }

    /// Issue a cryptographically random 32-byte nonce for a known AE.
    ///
    /// Re-issuing replaces any outstanding nonce for the same AE.
    pub fn issue_challenge(&self, ae_id: &AeId) -> BrokerResult<String> {
        if self.keyring.get_by_aeid(ae_id).is_none() {
            return Err(BrokerError::UnknownAe(ae_id.to_string()));
        }

        let mut nonce = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let nonce_b64 = b64e(&nonce);

        self.pending.insert(
            ae_id.0.clone(),
            PendingChallenge {
                nonce,
                expires_at: Utc::now() + self.ttl,
            },
        );

        tracing::info!(ae_id = %ae_id, "challenge issued");
        Ok(nonce_b64)
    }

    /// Verify the AE's signed response against the outstanding nonce.
    ///
    /// Returns `(true, "verified")` on success. Failure reasons:
    /// `no-challenge`, `expired`, `ae-revoked`, `bad-signature`.
    pub fn verify_response(&self, ae_id: &AeId, signed_nonce_b64: &str) -> (bool, &'static str) {
        let Some(entry) = self.pending.get(ae_id.as_str()) else {
            return (false, "no-challenge");
        };

        if Utc::now() > entry.expires_at {
            drop(entry);
            self.pending.remove(ae_id.as_str());
            return (false, "expired");
        }

        let Some(record) = self.keyring.get_by_aeid(ae_id) else {
            return (false, "no-challenge");
        };
        if record.status == TrustStatus::Revoked {
            return (false, "ae-revoked");
        }

        let ok = verify_with_b64_key(&record.pubkey_b64, &entry.nonce, signed_nonce_b64);
        drop(entry);

        if ok {
            // One-shot: consume on success only.
            self.pending.remove(ae_id.as_str());
            (true, "verified")
        } else {
            (false, "bad-signature")
        }
    }
}
