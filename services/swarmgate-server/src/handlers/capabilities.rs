//! Capability declaration endpoint
//!
//! The static fence is the hard boundary here: only subjects the operator
//! has declared may appear in a capability. Persisting the declaration
//! rebuilds the policy engine immediately; the background reloader covers
//! edits arriving any other way.

use std::collections::BTreeSet;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use swarmgate_policy::PolicyEngine;
use swarmgate_runtime::Heartbeat;
use swarmgate_storage::Storage;
use swarmgate_types::{ActivitySource, BrokerError, Capability};

use crate::error::ApiResult;
use crate::handlers::bearer_header;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CapabilityRequest {
    #[serde(default)]
    pub publishes: Vec<String>,
    #[serde(default)]
    pub subscribes: Vec<String>,
    #[serde(default)]
    pub meta: Value,
}

/// POST /ae/capabilities - declare (upsert) an AE's capability record.
pub async fn declare(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CapabilityRequest>,
) -> ApiResult<Json<Value>> {
    let ctx = &state.ctx;
    let claims = ctx.authenticate(bearer_header(&headers))?;
    let ae_id = claims.ae_id();

    ctx.heartbeat(
        Heartbeat::new(ae_id.clone(), ActivitySource::Register).with_session(claims.sid.clone()),
    )
    .await;

    // Static fence check: subject existence.
    let policy = ctx.policy.current();
    let requested: BTreeSet<String> = req
        .publishes
        .iter()
        .chain(req.subscribes.iter())
        .cloned()
        .collect();
    let unknown: Vec<String> = requested
        .iter()
        .filter(|s| !policy.subject_known(s.as_str()))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        tracing::warn!(ae_id = %ae_id, unknown = ?unknown, "capability request outside fence");
        return Err(BrokerError::UnknownSubject(unknown.join(", ")).into());
    }

    let capability = Capability {
        ae_id: ae_id.clone(),
        publishes: req.publishes.into_iter().collect(),
        subscribes: req.subscribes.into_iter().collect(),
        meta: req.meta,
        updated_at: Utc::now(),
    };
    ctx.storage
        .upsert_capability(&capability)
        .await
        .map_err(BrokerError::from)?;

    // Rebuild the engine on the spot so the declaration takes effect for
    // the AE's next request.
    let capabilities = ctx
        .storage
        .list_capabilities()
        .await
        .map_err(BrokerError::from)?;
    ctx.policy
        .swap(PolicyEngine::build(policy.fence().clone(), capabilities));

    ctx.audit(
        "capabilities_updated",
        json!({
            "ae_id": &ae_id,
            "publishes": &capability.publishes,
            "subscribes": &capability.subscribes,
            "ts": Utc::now().timestamp(),
        }),
    )
    .await;

    Ok(Json(json!({
        "status": "ok",
        "ae_id": ae_id,
        "capability": capability,
    })))
}
