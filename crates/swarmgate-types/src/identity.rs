//! Identity types for Swarmgate
//!
//! Atomic Experts are identified by a stable operator-chosen string, not a
//! UUID: the `ae_id` is provisioned together with the AE's public key and is
//! the primary key across the keyring, capability table, and runtime
//! registry. Subjects are the topic names of the static policy fence.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of an Atomic Expert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AeId(pub String);

impl AeId {
    /// Create from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A subject (topic) name within the static policy fence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(pub String);

impl Subject {
    /// Create from any string-like value
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow the inner subject name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Subject {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Subject {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ae_id_serde_transparent() {
        let id = AeId::new("fusion_ae");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"fusion_ae\"");

        let back: AeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_subject_display() {
        let subject = Subject::new("fused.track");
        assert_eq!(subject.to_string(), "fused.track");
    }
}
