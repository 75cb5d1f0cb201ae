//! The signed envelope wire format
//!
//! An envelope is the unit of publication. The signature covers a canonical
//! JSON serialization of every field except `sig`; canonical means
//! lexicographically ordered object keys, so signer and verifier produce the
//! same bytes regardless of field declaration order.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::{AeId, Subject};

/// A signed unit of publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Producing AE; must match the bearer token's `sub` claim
    pub producer: AeId,
    /// Subject the envelope is published to
    pub subject: Subject,
    /// Application payload
    pub payload: Value,
    /// Classification / routing labels
    #[serde(default)]
    pub labels: Vec<String>,
    /// Fingerprint of the signing key
    pub key_id: String,
    /// Producer-side timestamp (unix seconds)
    pub ts: i64,
    /// Base64 Ed25519 signature over [`Envelope::to_signing_bytes`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

impl Envelope {
    /// Build an unsigned envelope stamped with the current time.
    pub fn make(
        producer: impl Into<AeId>,
        subject: impl Into<Subject>,
        payload: Value,
        labels: Vec<String>,
        key_id: impl Into<String>,
    ) -> Self {
        Self {
            producer: producer.into(),
            subject: subject.into(),
            payload,
            labels,
            key_id: key_id.into(),
            ts: Utc::now().timestamp(),
            sig: None,
        }
    }

    /// Canonical bytes the signature covers: every field except `sig`,
    /// serialized as a JSON object with lexicographic key order.
    ///
    /// `serde_json`'s default object representation is key-ordered, which
    /// makes this serialization byte-stable across processes.
    pub fn to_signing_bytes(&self) -> Vec<u8> {
        let canonical = serde_json::json!({
            "producer": self.producer,
            "subject": self.subject,
            "payload": self.payload,
            "labels": self.labels,
            "key_id": self.key_id,
            "ts": self.ts,
        });
        // Object serialization cannot fail for these value types.
        serde_json::to_vec(&canonical).expect("canonical envelope serialization")
    }

    /// Full wire bytes (including `sig`) handed to the mesh transport.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("envelope serialization")
    }

    /// The envelope as a JSON value, as delivered on the local bus.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("envelope serialization")
    }
}
