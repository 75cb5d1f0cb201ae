//! Reflection records - append-only semantic memory
//!
//! A reflection record is an immutable, timestamped observation of what
//! occurred: a heartbeat, a lifecycle transition, a broker event. Operator
//! queries are pure functions over the record log; nothing here infers or
//! interprets behavior.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Which layer of the system the record originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReflectionDomain {
    Runtime,
    Abi,
    Ae,
    Transport,
}

/// How confident the correlation fields are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Record severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Correlation identifiers attaching a record to an AE / session / trace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Correlation {
    pub ae_id: Option<String>,
    pub session_id: Option<String>,
    pub trace_id: Option<String>,
    #[serde(default = "Correlation::default_confidence")]
    pub confidence: Confidence,
}

impl Correlation {
    fn default_confidence() -> Confidence {
        Confidence::High
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Confidence::High
    }
}

/// A named state transition carried inside a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// Transition name (`live`, `stale`, `dead`, `error`, `closed`, ...)
    pub name: String,
    pub from_state: Option<String>,
    pub to_state: Option<String>,
    pub reason: Option<String>,
    pub ts: DateTime<Utc>,
}

/// Immutable semantic record. Append-only: never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionRecord {
    pub record_id: Uuid,
    pub ts: DateTime<Utc>,
    pub domain: ReflectionDomain,
    /// Topic-shaped event type (`ae.runtime`, `abi.runtime.transition`)
    pub event_type: String,
    pub intent: Option<String>,
    pub subject: Option<String>,
    /// Activity source that produced the record (`emit`, `subscribe`, ...)
    pub source: Option<String>,
    pub correlation: Correlation,
    /// Ordered transitions observed with this record
    #[serde(default)]
    pub transitions: Vec<Transition>,
    pub severity: Severity,
    pub quality: Option<String>,
    /// Raw normalized payload
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl ReflectionRecord {
    /// Skeleton record with identity, timestamp, and defaults filled in.
    pub fn new(domain: ReflectionDomain, event_type: impl Into<String>) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            ts: Utc::now(),
            domain,
            event_type: event_type.into(),
            intent: None,
            subject: None,
            source: None,
            correlation: Correlation::default(),
            transitions: Vec::new(),
            severity: Severity::Info,
            quality: None,
            payload: Value::Null,
            labels: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_defaults() {
        let record = ReflectionRecord::new(ReflectionDomain::Runtime, "ae.runtime");
        assert_eq!(record.event_type, "ae.runtime");
        assert_eq!(record.severity, Severity::Info);
        assert!(record.transitions.is_empty());
        assert!(matches!(record.correlation.confidence, Confidence::High));
    }

    #[test]
    fn test_record_json_shape() {
        let mut record = ReflectionRecord::new(ReflectionDomain::Abi, "abi.runtime.transition");
        record.correlation.ae_id = Some("fusion_ae".to_string());
        record.transitions.push(Transition {
            name: "stale".to_string(),
            from_state: Some("live".to_string()),
            to_state: Some("stale".to_string()),
            reason: Some("sweep".to_string()),
            ts: Utc::now(),
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["domain"], "abi");
        assert_eq!(json["correlation"]["ae_id"], "fusion_ae");
        assert_eq!(json["transitions"][0]["name"], "stale");
    }
}
