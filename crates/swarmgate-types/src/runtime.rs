//! Runtime liveness types
//!
//! An AE occupies exactly one of three partitions at any instant. Heartbeats
//! are the only promotion path; the sweeper is the only demotion path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::AeId;

/// Liveness lattice: live → stale → dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeState {
    Live,
    Stale,
    Dead,
}

impl RuntimeState {
    /// Stable lowercase name used on the bus and in reflection records
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Stale => "stale",
            Self::Dead => "dead",
        }
    }
}

/// What kind of activity produced a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivitySource {
    /// Admission / enrollment traffic
    Register,
    /// A publish through the emit checkpoint
    Emit,
    /// A streaming subscription
    Subscribe,
    /// A session keepalive
    Session,
    /// The dedicated AE heartbeat endpoint
    Explicit,
}

impl ActivitySource {
    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Emit => "emit",
            Self::Subscribe => "subscribe",
            Self::Session => "session",
            Self::Explicit => "explicit",
        }
    }
}

/// Per-AE liveness record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeRecord {
    pub ae_id: AeId,
    /// Session the last activity arrived under, if any
    pub session_id: Option<String>,
    pub state: RuntimeState,
    /// Never modified after creation
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_source: ActivitySource,
    /// Declared intent of the last activity (e.g. `publish`)
    pub last_intent: Option<String>,
    /// Subject of the last activity, if any
    pub last_subject: Option<String>,
    /// Producer-reported quality hint for the last activity
    pub quality: Option<String>,
    pub heartbeat_count: u64,
    #[serde(default)]
    pub meta: Value,
}

/// A lifecycle transition observed by the registry.
///
/// Emitted on every demotion and on any heartbeat whose prior partition was
/// not `live` (including first sight, where `from_state` is `None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeTransition {
    pub ae_id: AeId,
    pub session_id: Option<String>,
    pub from_state: Option<RuntimeState>,
    pub to_state: RuntimeState,
    /// `heartbeat` for promotions, `sweep` for demotions
    pub reason: String,
    pub ts: DateTime<Utc>,
    /// Snapshot of the record after the transition
    pub record: RuntimeRecord,
}
