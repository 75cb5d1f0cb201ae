//! Keyring and capability types
//!
//! A `KeyRecord` binds an AE identity to its Ed25519 public key, roles, and
//! trust status. A `Capability` is the AE's declared narrowing of the static
//! fence: which subjects it intends to publish and subscribe to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::identity::AeId;

/// Trust status of an AE key.
///
/// A revoked record is never usable but is retained for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustStatus {
    /// Provisioned but not yet trusted by an operator
    Untrusted,
    /// Admitted to publish/subscribe (subject to policy)
    Trusted,
    /// Permanently distrusted; row retained
    Revoked,
}

impl TrustStatus {
    /// Stable lowercase name used on the wire and in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untrusted => "untrusted",
            Self::Trusted => "trusted",
            Self::Revoked => "revoked",
        }
    }

    /// Parse from the stored lowercase form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "untrusted" => Some(Self::Untrusted),
            "trusted" => Some(Self::Trusted),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}

/// An AE's key material and trust metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Primary key: the AE identifier
    pub ae_id: AeId,
    /// Base64-encoded raw Ed25519 public key (32 bytes)
    pub pubkey_b64: String,
    /// Deterministic SHA-256 fingerprint of the raw key, hex-encoded.
    /// Computed once at insert; secondary lookup key.
    pub pubkey_fingerprint: String,
    /// Roles granted by the operator, in declaration order
    pub roles: Vec<String>,
    /// Trust status
    pub status: TrustStatus,
    /// Optional key expiry
    pub expires_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    /// Whether this record may participate in admission and emission
    pub fn is_trusted(&self) -> bool {
        self.status == TrustStatus::Trusted
    }
}

/// A per-AE capability declaration. One row per AE, upsert semantics.
///
/// Capabilities may only reference subjects known to the static fence; the
/// declaration endpoint rejects unknown subjects before persisting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Owning AE
    pub ae_id: AeId,
    /// Subjects this AE intends to publish
    pub publishes: BTreeSet<String>,
    /// Subjects this AE intends to subscribe to
    pub subscribes: BTreeSet<String>,
    /// Free-form declaration metadata
    #[serde(default)]
    pub meta: serde_json::Value,
    /// Last declaration time
    pub updated_at: DateTime<Utc>,
}

impl Capability {
    /// Stable comparison tuple used by the policy reloader to detect change
    /// without rebuilding on every poll.
    pub fn snapshot_key(&self) -> (String, Vec<String>, Vec<String>, i64) {
        (
            self.ae_id.0.clone(),
            self.publishes.iter().cloned().collect(),
            self.subscribes.iter().cloned().collect(),
            self.updated_at.timestamp_millis(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_status_roundtrip() {
        for status in [TrustStatus::Untrusted, TrustStatus::Trusted, TrustStatus::Revoked] {
            assert_eq!(TrustStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TrustStatus::parse("bogus"), None);
    }

    #[test]
    fn test_capability_snapshot_key_is_order_independent() {
        let mut a = Capability {
            ae_id: AeId::new("fusion_ae"),
            publishes: ["b.topic", "a.topic"].iter().map(|s| s.to_string()).collect(),
            subscribes: BTreeSet::new(),
            meta: serde_json::Value::Null,
            updated_at: Utc::now(),
        };
        let key1 = a.snapshot_key();

        // Re-inserting the same subjects in a different order must not
        // change the snapshot key.
        a.publishes = ["a.topic", "b.topic"].iter().map(|s| s.to_string()).collect();
        assert_eq!(key1, a.snapshot_key());
    }
}
