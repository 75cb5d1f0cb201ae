//! Swarmgate Runtime Registry - AE liveness tracking
//!
//! Three disjoint partitions (`live`, `stale`, `dead`) under a single mutex.
//! `heartbeat` is the only promotion path; `sweep` is the only demotion
//! path. Every partition change produces a `RuntimeTransition`, emitted
//! outside the critical section so hooks can do real work.
//!
//! A background sweeper invokes `sweep()` at a fixed interval independent of
//! ingress load. Ages clamp at zero, so a non-monotonic wall clock never
//! demotes a fresh record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use swarmgate_types::{ActivitySource, AeId, RuntimeRecord, RuntimeState, RuntimeTransition};

/// Default sweep cadence.
pub const SWEEP_INTERVAL_SECS: u64 = 5;

/// Hook invoked for every lifecycle transition, outside the registry lock.
pub type TransitionHook = Arc<dyn Fn(&RuntimeTransition) + Send + Sync>;

/// One heartbeat's worth of activity.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub ae_id: AeId,
    pub session_id: Option<String>,
    pub source: ActivitySource,
    pub intent: Option<String>,
    pub subject: Option<String>,
    pub quality: Option<String>,
    pub meta: Option<Value>,
}

impl Heartbeat {
    /// Minimal heartbeat carrying only identity and source.
    pub fn new(ae_id: impl Into<AeId>, source: ActivitySource) -> Self {
        Self {
            ae_id: ae_id.into(),
            session_id: None,
            source,
            intent: None,
            subject: None,
            quality: None,
            meta: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }
}

#[derive(Default)]
struct Partitions {
    live: HashMap<String, RuntimeRecord>,
    stale: HashMap<String, RuntimeRecord>,
    dead: HashMap<String, RuntimeRecord>,
}

impl Partitions {
    fn remove(&mut self, ae_id: &str) -> Option<(RuntimeState, RuntimeRecord)> {
        if let Some(r) = self.live.remove(ae_id) {
            return Some((RuntimeState::Live, r));
        }
        if let Some(r) = self.stale.remove(ae_id) {
            return Some((RuntimeState::Stale, r));
        }
        if let Some(r) = self.dead.remove(ae_id) {
            return Some((RuntimeState::Dead, r));
        }
        None
    }
}

/// Process-local registry of AE liveness.
pub struct RuntimeRegistry {
    inner: Mutex<Partitions>,
    stale_after: Duration,
    dead_after: Duration,
    hook: Mutex<Option<TransitionHook>>,
}

impl RuntimeRegistry {
    /// Create a registry with the given demotion thresholds.
    /// `stale_after` must be shorter than `dead_after`.
    pub fn new(stale_after: StdDuration, dead_after: StdDuration) -> Self {
        debug_assert!(stale_after < dead_after);
        Self {
            inner: Mutex::new(Partitions::default()),
            stale_after: Duration::from_std(stale_after).unwrap_or_else(|_| Duration::seconds(30)),
            dead_after: Duration::from_std(dead_after).unwrap_or_else(|_| Duration::seconds(120)),
            hook: Mutex::new(None),
        }
    }

    /// Install the transition hook. Invoked outside the registry lock.
    pub fn set_transition_hook(&self, hook: TransitionHook) {
        *self.hook.lock() = Some(hook);
    }

    /// Record activity. Creates or re-anchors the record in `live`; returns
    /// the updated record and, when the prior partition was not `live`
    /// (including first sight), the promotion transition.
    pub fn heartbeat(&self, activity: Heartbeat) -> (RuntimeRecord, Option<RuntimeTransition>) {
        let now = Utc::now();
        let ae_key = activity.ae_id.0.clone();

        let (record, transition) = {
            let mut partitions = self.inner.lock();
            let prior = partitions.remove(&ae_key);

            let (from_state, mut record) = match prior {
                Some((state, record)) => (Some(state), record),
                None => (
                    None,
                    RuntimeRecord {
                        ae_id: activity.ae_id.clone(),
                        session_id: None,
                        state: RuntimeState::Live,
                        first_seen: now,
                        last_seen: now,
                        last_source: activity.source,
                        last_intent: None,
                        last_subject: None,
                        quality: None,
                        heartbeat_count: 0,
                        meta: Value::Null,
                    },
                ),
            };

            // first_seen is never modified after creation.
            record.state = RuntimeState::Live;
            record.last_seen = now;
            record.last_source = activity.source;
            record.heartbeat_count += 1;
            if activity.session_id.is_some() {
                record.session_id = activity.session_id.clone();
            }
            if activity.intent.is_some() {
                record.last_intent = activity.intent.clone();
            }
            if activity.subject.is_some() {
                record.last_subject = activity.subject.clone();
            }
            if activity.quality.is_some() {
                record.quality = activity.quality.clone();
            }
            if let Some(meta) = activity.meta.clone() {
                record.meta = meta;
            }

            partitions.live.insert(ae_key, record.clone());

            let transition = match from_state {
                Some(RuntimeState::Live) => None,
                other => Some(RuntimeTransition {
                    ae_id: record.ae_id.clone(),
                    session_id: record.session_id.clone(),
                    from_state: other,
                    to_state: RuntimeState::Live,
                    reason: "heartbeat".to_string(),
                    ts: now,
                    record: record.clone(),
                }),
            };
            (record, transition)
        };

        // Emission happens outside the critical section.
        if let Some(t) = transition.as_ref() {
            self.emit(t);
        }
        (record, transition)
    }

    /// One demotion pass. Returns the transitions, already emitted to the
    /// hook (outside the lock).
    pub fn sweep(&self) -> Vec<RuntimeTransition> {
        let now = Utc::now();
        let mut transitions = Vec::new();

        {
            let mut partitions = self.inner.lock();

            let live_ids: Vec<String> = partitions.live.keys().cloned().collect();
            for ae_id in live_ids {
                let age = age_of(&partitions.live[&ae_id], now);
                if age >= self.dead_after {
                    let mut record = partitions.live.remove(&ae_id).unwrap();
                    record.state = RuntimeState::Dead;
                    transitions.push(demotion(RuntimeState::Live, &record, now));
                    partitions.dead.insert(ae_id, record);
                } else if age >= self.stale_after {
                    let mut record = partitions.live.remove(&ae_id).unwrap();
                    record.state = RuntimeState::Stale;
                    transitions.push(demotion(RuntimeState::Live, &record, now));
                    partitions.stale.insert(ae_id, record);
                }
            }

            let stale_ids: Vec<String> = partitions.stale.keys().cloned().collect();
            for ae_id in stale_ids {
                let age = age_of(&partitions.stale[&ae_id], now);
                if age >= self.dead_after {
                    let mut record = partitions.stale.remove(&ae_id).unwrap();
                    record.state = RuntimeState::Dead;
                    transitions.push(demotion(RuntimeState::Stale, &record, now));
                    partitions.dead.insert(ae_id, record);
                }
            }
        }

        for t in &transitions {
            self.emit(t);
        }
        transitions
    }

    /// Snapshot of the live partition.
    pub fn get_live(&self) -> Vec<RuntimeRecord> {
        self.partition(RuntimeState::Live)
    }

    /// Snapshot of the stale partition.
    pub fn get_stale(&self) -> Vec<RuntimeRecord> {
        self.partition(RuntimeState::Stale)
    }

    /// Snapshot of the dead partition.
    pub fn get_dead(&self) -> Vec<RuntimeRecord> {
        self.partition(RuntimeState::Dead)
    }

    /// Record for one AE, wherever it currently resides.
    pub fn get(&self, ae_id: &AeId) -> Option<RuntimeRecord> {
        let partitions = self.inner.lock();
        partitions
            .live
            .get(ae_id.as_str())
            .or_else(|| partitions.stale.get(ae_id.as_str()))
            .or_else(|| partitions.dead.get(ae_id.as_str()))
            .cloned()
    }

    fn partition(&self, state: RuntimeState) -> Vec<RuntimeRecord> {
        let partitions = self.inner.lock();
        let map = match state {
            RuntimeState::Live => &partitions.live,
            RuntimeState::Stale => &partitions.stale,
            RuntimeState::Dead => &partitions.dead,
        };
        let mut records: Vec<RuntimeRecord> = map.values().cloned().collect();
        records.sort_by(|a, b| a.ae_id.cmp(&b.ae_id));
        records
    }

    fn emit(&self, transition: &RuntimeTransition) {
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            (*hook)(transition);
        }
        tracing::debug!(
            ae_id = %transition.ae_id,
            from = transition.from_state.map(|s| s.as_str()).unwrap_or("none"),
            to = transition.to_state.as_str(),
            reason = %transition.reason,
            "runtime transition"
        );
    }
}

/// Age since last activity, clamped at zero for non-monotonic clocks.
fn age_of(record: &RuntimeRecord, now: DateTime<Utc>) -> Duration {
    let age = now.signed_duration_since(record.last_seen);
    age.max(Duration::zero())
}

fn demotion(from: RuntimeState, record: &RuntimeRecord, now: DateTime<Utc>) -> RuntimeTransition {
    RuntimeTransition {
        ae_id: record.ae_id.clone(),
        session_id: record.session_id.clone(),
        from_state: Some(from),
        to_state: record.state,
        reason: "sweep".to_string(),
        ts: now,
        record: record.clone(),
    }
}

/// Run `sweep()` forever at a fixed cadence. Spawned at broker startup and
/// terminates only with the process.
pub async fn run_sweeper(registry: Arc<RuntimeRegistry>, interval: StdDuration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let transitions = registry.sweep();
        if !transitions.is_empty() {
            tracing::info!(count = transitions.len(), "sweep demoted records");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn registry(stale_ms: u64, dead_ms: u64) -> RuntimeRegistry {
        RuntimeRegistry::new(
            StdDuration::from_millis(stale_ms),
            StdDuration::from_millis(dead_ms),
        )
    }

    #[test]
    fn test_heartbeat_creates_live_record_with_transition() {
        let registry = registry(1000, 2000);
        let (record, transition) =
            registry.heartbeat(Heartbeat::new("ae-1", ActivitySource::Emit).with_session("sid-1"));

        assert_eq!(record.state, RuntimeState::Live);
        assert_eq!(record.heartbeat_count, 1);

        let transition = transition.unwrap();
        assert_eq!(transition.from_state, None);
        assert_eq!(transition.to_state, RuntimeState::Live);
        assert_eq!(transition.reason, "heartbeat");
    }

    #[test]
    fn test_repeat_heartbeat_emits_no_transition() {
        let registry = registry(1000, 2000);
        registry.heartbeat(Heartbeat::new("ae-1", ActivitySource::Emit));
        let (record, transition) = registry.heartbeat(Heartbeat::new("ae-1", ActivitySource::Emit));

        assert!(transition.is_none());
        assert_eq!(record.heartbeat_count, 2);
    }

    #[test]
    fn test_sweep_transitions_live_stale_dead() {
        let registry = registry(1000, 2000);
        registry.heartbeat(Heartbeat::new("ae-1", ActivitySource::Emit));

        std::thread::sleep(StdDuration::from_millis(1200));
        let transitions = registry.sweep();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].from_state, Some(RuntimeState::Live));
        assert_eq!(transitions[0].to_state, RuntimeState::Stale);
        assert_eq!(registry.get_stale().len(), 1);
        assert!(registry.get_live().is_empty());

        std::thread::sleep(StdDuration::from_millis(1200));
        let transitions = registry.sweep();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].from_state, Some(RuntimeState::Stale));
        assert_eq!(transitions[0].to_state, RuntimeState::Dead);
        assert_eq!(registry.get_dead().len(), 1);
        assert!(registry.get_stale().is_empty());
    }

    #[test]
    fn test_heartbeat_revives_from_any_partition() {
        let registry = registry(100, 200);
        registry.heartbeat(Heartbeat::new("ae-1", ActivitySource::Emit));

        std::thread::sleep(StdDuration::from_millis(250));
        registry.sweep();
        assert_eq!(registry.get_dead().len(), 1);

        let (record, transition) =
            registry.heartbeat(Heartbeat::new("ae-1", ActivitySource::Explicit));
        assert_eq!(record.state, RuntimeState::Live);

        let transition = transition.unwrap();
        assert_eq!(transition.from_state, Some(RuntimeState::Dead));
        assert_eq!(transition.to_state, RuntimeState::Live);

        // Partition membership stays disjoint.
        assert_eq!(registry.get_live().len(), 1);
        assert!(registry.get_stale().is_empty());
        assert!(registry.get_dead().is_empty());
    }

    #[test]
    fn test_first_seen_is_immutable() {
        let registry = registry(1000, 2000);
        let (first, _) = registry.heartbeat(Heartbeat::new("ae-1", ActivitySource::Emit));
        std::thread::sleep(StdDuration::from_millis(20));
        let (second, _) = registry.heartbeat(Heartbeat::new("ae-1", ActivitySource::Emit));

        assert_eq!(first.first_seen, second.first_seen);
        assert!(second.last_seen >= first.last_seen);
    }

    #[test]
    fn test_hook_observes_transitions() {
        let registry = registry(100, 200);
        let seen: Arc<PlMutex<Vec<String>>> = Arc::new(PlMutex::new(Vec::new()));
        let sink = seen.clone();
        registry.set_transition_hook(Arc::new(move |t| {
            sink.lock().push(format!(
                "{}->{}",
                t.from_state.map(|s| s.as_str()).unwrap_or("none"),
                t.to_state.as_str()
            ));
        }));

        registry.heartbeat(Heartbeat::new("ae-1", ActivitySource::Emit));
        std::thread::sleep(StdDuration::from_millis(120));
        registry.sweep();

        let events = seen.lock().clone();
        assert_eq!(events, vec!["none->live", "live->stale"]);
    }

    #[test]
    fn test_heartbeat_preserves_context_fields() {
        let registry = registry(1000, 2000);
        registry.heartbeat(
            Heartbeat::new("ae-1", ActivitySource::Emit)
                .with_session("sid-1")
                .with_intent("publish")
                .with_subject("fused.track")
                .with_quality("normal"),
        );

        // A later minimal heartbeat keeps the last known context.
        let (record, _) = registry.heartbeat(Heartbeat::new("ae-1", ActivitySource::Session));
        assert_eq!(record.session_id.as_deref(), Some("sid-1"));
        assert_eq!(record.last_intent.as_deref(), Some("publish"));
        assert_eq!(record.last_subject.as_deref(), Some("fused.track"));
        assert_eq!(record.last_source, ActivitySource::Session);
    }
}
