//! Reflection sink - bus subscriber that records runtime semantics
//!
//! Subscribes to `ae.runtime` (heartbeats) and `abi.runtime.transition`
//! (lifecycle changes), normalizes the payloads, and appends to the store.
//! Append failures are logged and swallowed: recording must never turn an
//! accepted operation into a rejection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use swarmgate_bus::EventBus;
use swarmgate_types::{
    Confidence, Correlation, ReflectionDomain, ReflectionRecord, Severity, Transition,
};

use crate::store::ReflectionStore;

/// Topic carrying heartbeat activity.
pub const TOPIC_AE_RUNTIME: &str = "ae.runtime";
/// Topic carrying lifecycle transitions.
pub const TOPIC_RUNTIME_TRANSITION: &str = "abi.runtime.transition";

/// The sink. Cheap to clone; the store is shared.
#[derive(Clone)]
pub struct ReflectionSink {
    store: Arc<dyn ReflectionStore>,
}

impl ReflectionSink {
    pub fn new(store: Arc<dyn ReflectionStore>) -> Self {
        Self { store }
    }

    /// Register this sink's handlers on the bus. Called once during startup
    /// wiring.
    pub fn attach(&self, bus: &EventBus) {
        for topic in [TOPIC_AE_RUNTIME, TOPIC_RUNTIME_TRANSITION] {
            let sink = self.clone();
            bus.register_handler(topic, Arc::new(move |topic, payload| {
                let sink = sink.clone();
                Box::pin(async move {
                    sink.on_event(&topic, payload).await;
                })
            }));
        }
    }

    /// Normalize and append one bus event.
    pub async fn on_event(&self, topic: &str, payload: Value) {
        let Some(record) = normalize(topic, &payload) else {
            return;
        };
        if let Err(e) = self.store.append(record).await {
            tracing::error!(topic, error = %e, "reflection append failed");
        }
    }
}

/// Convert a bus payload into a `ReflectionRecord`.
pub fn normalize(topic: &str, payload: &Value) -> Option<ReflectionRecord> {
    match topic {
        TOPIC_AE_RUNTIME => {
            let mut record = ReflectionRecord::new(ReflectionDomain::Ae, topic);
            record.ts = parse_ts(payload.get("ts")).unwrap_or_else(Utc::now);
            record.source = str_field(payload, "source");
            record.intent = str_field(payload, "intent");
            record.subject = str_field(payload, "subject");
            record.quality = str_field(payload, "quality");
            record.correlation = Correlation {
                ae_id: str_field(payload, "ae_id"),
                session_id: str_field(payload, "session_id"),
                trace_id: str_field(payload, "trace_id"),
                confidence: Confidence::High,
            };
            record.payload = payload.clone();
            Some(record)
        }
        TOPIC_RUNTIME_TRANSITION => {
            let to_state = str_field(payload, "to_state")?;
            let mut record = ReflectionRecord::new(ReflectionDomain::Abi, topic);
            record.ts = parse_ts(payload.get("ts")).unwrap_or_else(Utc::now);
            record.correlation = Correlation {
                ae_id: str_field(payload, "ae_id"),
                session_id: str_field(payload, "session_id"),
                trace_id: None,
                confidence: Confidence::High,
            };
            record.severity = if to_state == "dead" {
                Severity::Warn
            } else {
                Severity::Info
            };
            record.transitions.push(Transition {
                name: to_state.clone(),
                from_state: str_field(payload, "from_state"),
                to_state: Some(to_state),
                reason: str_field(payload, "reason"),
                ts: record.ts,
            });
            record.payload = payload.clone();
            Some(record)
        }
        _ => None,
    }
}

fn str_field(payload: &Value, field: &str) -> Option<String> {
    payload.get(field).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn parse_ts(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let value = value?;
    if let Some(text) = value.as_str() {
        return DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    value.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0))
}
