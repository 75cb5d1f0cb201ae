//! Deterministic operator queries over the reflection log
//!
//! Guarantees: stable ordering by timestamp, read-only access, no inference.
//! These answer "what happened", not "why it happened" or "what should be
//! done"; interpretation is explicitly left to higher layers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use swarmgate_storage::StorageResult;
use swarmgate_types::{ReflectionRecord, Transition};

use crate::store::ReflectionStore;

/// Default query window.
pub const DEFAULT_QUERY_LIMIT: usize = 500;

/// Filter for [`get_records`].
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub ae_id: Option<String>,
    pub session_id: Option<String>,
    pub event_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Filtered slice of the log, ordered by timestamp, truncated to the limit.
pub async fn get_records(
    store: &dyn ReflectionStore,
    query: &RecordQuery,
) -> StorageResult<Vec<ReflectionRecord>> {
    let mut records: Vec<ReflectionRecord> = store
        .all()
        .await?
        .into_iter()
        .filter(|r| {
            if let Some(ae_id) = &query.ae_id {
                if r.correlation.ae_id.as_deref() != Some(ae_id.as_str()) {
                    return false;
                }
            }
            if let Some(session_id) = &query.session_id {
                if r.correlation.session_id.as_deref() != Some(session_id.as_str()) {
                    return false;
                }
            }
            if let Some(event_type) = &query.event_type {
                if &r.event_type != event_type {
                    return false;
                }
            }
            if let Some(since) = query.since {
                if r.ts < since {
                    return false;
                }
            }
            if let Some(until) = query.until {
                if r.ts > until {
                    return false;
                }
            }
            true
        })
        .collect();

    records.sort_by_key(|r| r.ts);
    records.truncate(query.limit.unwrap_or(DEFAULT_QUERY_LIMIT));
    Ok(records)
}

/// All AE ids observed in the log, sorted.
pub async fn observed_aes(store: &dyn ReflectionStore) -> StorageResult<Vec<String>> {
    let mut aes: Vec<String> = store
        .all()
        .await?
        .into_iter()
        .filter_map(|r| r.correlation.ae_id)
        .collect();
    aes.sort();
    aes.dedup();
    Ok(aes)
}

/// Distinct session ids observed for an AE, sorted.
pub async fn sessions_for_ae(
    store: &dyn ReflectionStore,
    ae_id: &str,
) -> StorageResult<Vec<String>> {
    let mut sessions: Vec<String> = store
        .all()
        .await?
        .into_iter()
        .filter(|r| r.correlation.ae_id.as_deref() == Some(ae_id))
        .filter_map(|r| r.correlation.session_id)
        .collect();
    sessions.sort();
    sessions.dedup();
    Ok(sessions)
}

/// Ordered factual envelope of one AE session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTimeline {
    pub ae_id: String,
    pub session_id: String,
    pub start_ts: Option<DateTime<Utc>>,
    pub end_ts: Option<DateTime<Utc>>,
    /// Terminal status inferred only from transition *names*
    /// (`dead`, `error`, `closed`), never from payload content.
    pub end_status: String,
    pub records: Vec<ReflectionRecord>,
    pub transitions: Vec<Transition>,
}

/// Build the ordered timeline for one AE session.
pub async fn build_session_timeline(
    store: &dyn ReflectionStore,
    ae_id: &str,
    session_id: &str,
) -> StorageResult<SessionTimeline> {
    let mut records: Vec<ReflectionRecord> = store
        .all()
        .await?
        .into_iter()
        .filter(|r| {
            r.correlation.ae_id.as_deref() == Some(ae_id)
                && r.correlation.session_id.as_deref() == Some(session_id)
        })
        .collect();
    records.sort_by_key(|r| r.ts);

    let transitions: Vec<Transition> = records
        .iter()
        .flat_map(|r| r.transitions.iter().cloned())
        .collect();

    Ok(SessionTimeline {
        ae_id: ae_id.to_string(),
        session_id: session_id.to_string(),
        start_ts: records.first().map(|r| r.ts),
        end_ts: records.last().map(|r| r.ts),
        end_status: infer_end_status(&transitions),
        records,
        transitions,
    })
}

fn infer_end_status(transitions: &[Transition]) -> String {
    for t in transitions.iter().rev() {
        if matches!(t.name.as_str(), "dead" | "error" | "closed") {
            return t.name.clone();
        }
    }
    "ended-without-explicit-close".to_string()
}

/// "What happened": the raw factual record of a session.
#[derive(Debug, Clone, Serialize)]
pub struct WhatHappened {
    pub ae_id: String,
    pub session_id: String,
    pub start_ts: Option<DateTime<Utc>>,
    pub end_ts: Option<DateTime<Utc>>,
    pub records: Vec<ReflectionRecord>,
    pub transitions: Vec<Transition>,
}

pub async fn what_happened(
    store: &dyn ReflectionStore,
    ae_id: &str,
    session_id: &str,
) -> StorageResult<WhatHappened> {
    let timeline = build_session_timeline(store, ae_id, session_id).await?;
    Ok(WhatHappened {
        ae_id: timeline.ae_id,
        session_id: timeline.session_id,
        start_ts: timeline.start_ts,
        end_ts: timeline.end_ts,
        records: timeline.records,
        transitions: timeline.transitions,
    })
}

/// "Why did it stop": terminal facts of a session, no root-cause analysis.
#[derive(Debug, Clone, Serialize)]
pub struct WhyStopped {
    pub status: String,
    pub ae_id: String,
    pub session_id: String,
    pub last_ts: Option<DateTime<Utc>>,
    pub last_event_type: Option<String>,
    pub last_intent: Option<String>,
    pub last_transitions: Vec<Transition>,
}

pub async fn why_did_it_stop(
    store: &dyn ReflectionStore,
    ae_id: &str,
    session_id: &str,
) -> StorageResult<WhyStopped> {
    let timeline = build_session_timeline(store, ae_id, session_id).await?;

    let Some(last) = timeline.records.last() else {
        return Ok(WhyStopped {
            status: "no-data".to_string(),
            ae_id: ae_id.to_string(),
            session_id: session_id.to_string(),
            last_ts: None,
            last_event_type: None,
            last_intent: None,
            last_transitions: Vec::new(),
        });
    };

    Ok(WhyStopped {
        status: timeline.end_status.clone(),
        ae_id: ae_id.to_string(),
        session_id: session_id.to_string(),
        last_ts: Some(last.ts),
        last_event_type: Some(last.event_type.clone()),
        last_intent: last.intent.clone(),
        last_transitions: last.transitions.clone(),
    })
}

/// "What preceded failure": raw events in a window before the first `error`
/// transition. Factual context only; no causality claim.
#[derive(Debug, Clone, Serialize)]
pub struct FailureContext {
    pub status: String,
    pub ae_id: String,
    pub session_id: String,
    pub failure_ts: Option<DateTime<Utc>>,
    pub failure_transition: Option<Transition>,
    pub preceding_records: Vec<ReflectionRecord>,
}

pub async fn what_preceded_failure(
    store: &dyn ReflectionStore,
    ae_id: &str,
    session_id: &str,
    window: usize,
) -> StorageResult<FailureContext> {
    let timeline = build_session_timeline(store, ae_id, session_id).await?;

    for (idx, record) in timeline.records.iter().enumerate() {
        if let Some(t) = record.transitions.iter().find(|t| t.name == "error") {
            let start = idx.saturating_sub(window);
            return Ok(FailureContext {
                status: "failure-detected".to_string(),
                ae_id: ae_id.to_string(),
                session_id: session_id.to_string(),
                failure_ts: Some(t.ts),
                failure_transition: Some(t.clone()),
                preceding_records: timeline.records[start..idx].to_vec(),
            });
        }
    }

    Ok(FailureContext {
        status: "no-failure-detected".to_string(),
        ae_id: ae_id.to_string(),
        session_id: session_id.to_string(),
        failure_ts: None,
        failure_transition: None,
        preceding_records: Vec::new(),
    })
}
