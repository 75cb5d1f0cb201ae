//! Session manager
//!
//! Sessions carry a sliding idle window plus an absolute lifetime; refresh
//! tokens rotate with a monotonic counter. All mutations of one session are
//! serialized through a per-session mutex, which is what makes rotation
//! atomic: no window exists where two non-revoked tokens coexist.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

use swarmgate_storage::Storage;
use swarmgate_types::{AeId, BrokerError, BrokerResult, RefreshToken, Session, SessionStatus};

use crate::config::SessionProfile;

/// Session lifecycle owner. Every session/refresh mutation goes through
/// here.
pub struct SessionManager {
    storage: Arc<dyn Storage>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl SessionManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, session_id: &Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(*session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create a new ACTIVE session under the given profile.
    pub async fn create_session(
        &self,
        subject: AeId,
        pubkey_fingerprint: &str,
        profile: &SessionProfile,
        metadata: Value,
    ) -> BrokerResult<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            subject,
            pubkey_fingerprint: pubkey_fingerprint.to_string(),
            created_at: now,
            expires_at: now + Duration::from_std(profile.session_lifetime)
                .map_err(|e| BrokerError::Internal(e.to_string()))?,
            last_seen_at: now,
            status: SessionStatus::Active,
            max_idle_secs: profile.max_idle.as_secs() as i64,
            metadata,
        };

        self.storage.upsert_session(&session).await?;
        tracing::info!(session_id = %session.id, subject = %session.subject, "session created");
        Ok(session)
    }

    /// Load a session without asserting liveness.
    pub async fn get_session(&self, session_id: &Uuid) -> BrokerResult<Option<Session>> {
        Ok(self.storage.get_session(session_id).await?)
    }

    /// Mint a refresh token for a session. The raw value is returned exactly
    /// once; only its SHA-256 hash is persisted.
    pub async fn create_refresh_token(
        &self,
        session_id: Uuid,
        profile: &SessionProfile,
    ) -> BrokerResult<(String, RefreshToken)> {
        let now = Utc::now();
        let raw = generate_opaque_token();
        let record = RefreshToken {
            id: Uuid::new_v4(),
            session_id,
            token_hash: hash_token(&raw),
            created_at: now,
            expires_at: now + Duration::from_std(profile.refresh_lifetime)
                .map_err(|e| BrokerError::Internal(e.to_string()))?,
            revoked: false,
            rotation: 0,
            reason: None,
        };

        self.storage.insert_refresh_token(&record).await?;
        Ok((raw, record))
    }

    /// Validate a raw refresh token for a session.
    ///
    /// Constant-time hash compare; expired tokens are auto-revoked with
    /// reason `expired`.
    pub async fn validate_refresh_token(
        &self,
        session_id: &Uuid,
        raw: &str,
    ) -> BrokerResult<RefreshToken> {
        let presented = hash_token(raw);
        let tokens = self.storage.list_refresh_tokens(session_id).await?;

        let mut matched = None;
        for token in tokens {
            if constant_time_eq(&token.token_hash, &presented) {
                matched = Some(token);
            }
        }
        let Some(token) = matched else {
            return Err(BrokerError::BadRefresh);
        };

        if token.revoked {
            return Err(BrokerError::BadRefresh);
        }
        if Utc::now() >= token.expires_at {
            let mut expired = token;
            expired.revoked = true;
            expired.reason = Some("expired".to_string());
            self.storage.update_refresh_token(&expired).await?;
            return Err(BrokerError::BadRefresh);
        }

        Ok(token)
    }

    /// Rotate a validated refresh token: revoke the old, mint the successor
    /// with `rotation + 1` and the same remaining lifetime window.
    pub async fn rotate_refresh_token(
        &self,
        old: &RefreshToken,
    ) -> BrokerResult<(String, RefreshToken)> {
        let lock = self.lock_for(&old.session_id);
        let _guard = lock.lock().await;

        // Re-read under the lock: a concurrent rotation must not issue twice
        // from the same ancestor.
        let Some(mut current) = self.storage.get_refresh_token(&old.id).await? else {
            return Err(BrokerError::BadRefresh);
        };
        if current.revoked {
            return Err(BrokerError::BadRefresh);
        }

        current.revoked = true;
        current.reason = Some("rotation".to_string());
        self.storage.update_refresh_token(&current).await?;

        let raw = generate_opaque_token();
        let successor = RefreshToken {
            id: Uuid::new_v4(),
            session_id: current.session_id,
            token_hash: hash_token(&raw),
            created_at: Utc::now(),
            expires_at: current.expires_at,
            revoked: false,
            rotation: current.rotation + 1,
            reason: None,
        };
        self.storage.insert_refresh_token(&successor).await?;

        tracing::info!(
            session_id = %successor.session_id,
            rotation = successor.rotation,
            "refresh token rotated"
        );
        Ok((raw, successor))
    }

    /// Assert the session is ACTIVE, expiring it on idle or hard timeout.
    pub async fn assert_session_active(&self, session_id: &Uuid) -> BrokerResult<Session> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let Some(mut session) = self.storage.get_session(session_id).await? else {
            return Err(BrokerError::NotFound("session".to_string()));
        };

        match session.status {
            SessionStatus::Revoked => return Err(BrokerError::SessionRevoked),
            SessionStatus::Expired => return Err(BrokerError::SessionExpired),
            SessionStatus::Active | SessionStatus::Stale => {}
        }

        let now = Utc::now();
        let idle = now.signed_duration_since(session.last_seen_at);
        if now > session.expires_at || idle.num_seconds() > session.max_idle_secs {
            session.status = SessionStatus::Expired;
            self.storage.upsert_session(&session).await?;
            tracing::info!(session_id = %session.id, "session expired");
            return Err(BrokerError::SessionExpired);
        }

        Ok(session)
    }

    /// Slide the idle window. No-op on terminal sessions.
    pub async fn touch(&self, session_id: &Uuid) -> BrokerResult<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let Some(mut session) = self.storage.get_session(session_id).await? else {
            return Ok(());
        };
        if session.status.is_terminal() {
            return Ok(());
        }

        session.last_seen_at = clamp_last_seen(Utc::now(), session.expires_at);
        self.storage.upsert_session(&session).await?;
        Ok(())
    }

    /// Terminal revoke; cascades to every refresh token of the session.
    pub async fn revoke_session(&self, session_id: &Uuid, reason: &str) -> BrokerResult<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let Some(mut session) = self.storage.get_session(session_id).await? else {
            return Err(BrokerError::NotFound("session".to_string()));
        };

        if !session.status.is_terminal() {
            session.status = SessionStatus::Revoked;
            self.storage.upsert_session(&session).await?;
        }

        for mut token in self.storage.list_refresh_tokens(session_id).await? {
            if !token.revoked {
                token.revoked = true;
                token.reason = Some(reason.to_string());
                self.storage.update_refresh_token(&token).await?;
            }
        }

        tracing::warn!(session_id = %session_id, reason, "session revoked");
        Ok(())
    }
}

/// Opaque refresh token: 32 random bytes, URL-safe base64 without padding.
fn generate_opaque_token() -> String {
    use base64::Engine;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a raw token for storage (never store plain tokens).
fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Maintain `last_seen_at <= min(now, expires_at)`.
fn clamp_last_seen(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> DateTime<Utc> {
    now.min(expires_at)
}
