//! The broker context - explicit state container
//!
//! One immutable struct carrying every component, constructed at startup and
//! passed through to handlers. The hot-reloadable policy engine sits behind
//! its atomic snapshot handle; everything else is plain shared ownership.

use std::sync::Arc;

use serde_json::Value;

use swarmgate_auth::{AdmissionService, AuthConfig, SessionManager, TokenService};
use swarmgate_bus::EventBus;
use swarmgate_keyring::Keyring;
use swarmgate_policy::PolicyHandle;
use swarmgate_reflect::sink::{TOPIC_AE_RUNTIME, TOPIC_RUNTIME_TRANSITION};
use swarmgate_reflect::ReflectionStore;
use swarmgate_runtime::{Heartbeat, RuntimeRegistry};
use swarmgate_storage::Storage;
use swarmgate_types::{BrokerError, BrokerResult, RuntimeRecord};

use crate::transport::MeshTransport;

/// Everything a request handler needs, in one place.
pub struct BrokerContext {
    pub keyring: Arc<Keyring>,
    pub policy: Arc<PolicyHandle>,
    pub sessions: Arc<SessionManager>,
    pub admission: Arc<AdmissionService>,
    pub tokens: Arc<TokenService>,
    pub runtime: Arc<RuntimeRegistry>,
    pub reflection: Arc<dyn ReflectionStore>,
    pub bus: Arc<EventBus>,
    pub transport: Arc<dyn MeshTransport>,
    pub storage: Arc<dyn Storage>,
    pub auth_config: AuthConfig,
    /// Shared secret for the `/admin` surface
    pub admin_token: Option<String>,
}

impl BrokerContext {
    /// Extract and verify the bearer token from an `Authorization` header.
    pub fn authenticate(&self, authorization: Option<&str>) -> BrokerResult<swarmgate_auth::AccessClaims> {
        let header = authorization.ok_or(BrokerError::MissingBearer)?;
        let (scheme, token) = header
            .split_once(' ')
            .ok_or(BrokerError::MissingBearer)?;
        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return Err(BrokerError::MissingBearer);
        }
        self.tokens.verify_access_token(token)
    }

    /// Record AE activity: update the runtime registry, then publish the
    /// heartbeat (and any lifecycle transition) on the local bus. The
    /// reflection sink listens there.
    pub async fn heartbeat(&self, activity: Heartbeat) -> RuntimeRecord {
        let (record, transition) = self.runtime.heartbeat(activity);

        self.bus
            .publish(TOPIC_AE_RUNTIME, heartbeat_payload(&record))
            .await;
        if let Some(transition) = transition {
            match serde_json::to_value(&transition) {
                Ok(payload) => self.bus.publish(TOPIC_RUNTIME_TRANSITION, payload).await,
                Err(e) => tracing::error!(error = %e, "transition serialization failed"),
            }
        }
        record
    }

    /// Best-effort structured audit append. Failures are logged, never
    /// surfaced: recording must not reject an otherwise-accepted operation.
    pub async fn audit(&self, event: &str, payload: Value) {
        if let Err(e) = self.storage.log_event(event, payload).await {
            tracing::error!(event, error = %e, "audit append failed");
        }
    }

    /// One sweep pass, with every demotion published on the local bus for
    /// the reflection sink. Driven by the background sweeper task.
    pub async fn sweep_and_publish(&self) -> usize {
        let transitions = self.runtime.sweep();
        for transition in &transitions {
            match serde_json::to_value(transition) {
                Ok(payload) => self.bus.publish(TOPIC_RUNTIME_TRANSITION, payload).await,
                Err(e) => tracing::error!(error = %e, "transition serialization failed"),
            }
        }
        transitions.len()
    }
}

fn heartbeat_payload(record: &RuntimeRecord) -> Value {
    serde_json::json!({
        "ae_id": &record.ae_id,
        "session_id": &record.session_id,
        "ts": record.last_seen.to_rfc3339(),
        "source": record.last_source.as_str(),
        "intent": &record.last_intent,
        "subject": &record.last_subject,
        "quality": &record.quality,
        "state": record.state.as_str(),
        "heartbeat_count": record.heartbeat_count,
        "meta": &record.meta,
    })
}
