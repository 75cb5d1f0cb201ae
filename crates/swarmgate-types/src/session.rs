//! Session and refresh-token types
//!
//! Sessions are created by admission and live under a sliding idle window
//! plus an absolute lifetime. Refresh tokens are opaque random strings; only
//! their SHA-256 hash is ever persisted, and at most one non-revoked token
//! exists per session after any successful rotation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::AeId;

/// Session lifecycle status. `Revoked` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Active,
    Stale,
    Revoked,
    Expired,
}

impl SessionStatus {
    /// Stable uppercase name used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Stale => "STALE",
            Self::Revoked => "REVOKED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Parse from the stored uppercase form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "STALE" => Some(Self::Stale),
            "REVOKED" => Some(Self::Revoked),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Terminal states cannot re-enter `Active`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked | Self::Expired)
    }
}

/// A broker session granted to an AE after challenge/response admission.
///
/// Invariant: `last_seen_at <= min(now, expires_at)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session UUID; the `sid` claim of access tokens
    pub id: Uuid,
    /// AE the session was granted to
    pub subject: AeId,
    /// Fingerprint of the key that passed admission
    pub pubkey_fingerprint: String,
    pub created_at: DateTime<Utc>,
    /// Absolute expiry
    pub expires_at: DateTime<Utc>,
    /// Sliding idle anchor, advanced by `touch`
    pub last_seen_at: DateTime<Utc>,
    pub status: SessionStatus,
    /// Idle window in seconds; exceeding it expires the session
    pub max_idle_secs: i64,
    /// Arbitrary session metadata (roles at verify time, client hints)
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A refresh token row. The raw token is returned to the AE exactly once;
/// this record carries only the SHA-256 hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Hex-encoded SHA-256 of the raw token
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    /// Monotonic rotation counter, starting at 0
    pub rotation: u32,
    /// Why the token was revoked (`rotation`, `expired`, `session-revoked`)
    pub reason: Option<String>,
}

impl RefreshToken {
    /// Usable for refresh: not revoked and not past expiry
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }

    /// Remaining lifetime in whole seconds, clamped at zero
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        self.expires_at.signed_duration_since(now).num_seconds().max(0)
    }
}
