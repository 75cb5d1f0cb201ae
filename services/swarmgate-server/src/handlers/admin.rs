//! Operator surface: key provisioning, runtime partitions, reflection
//! queries, and the audit tail
//!
//! Everything here is gated by the shared admin token. Operator-only
//! visibility; reflection endpoints never mutate.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use swarmgate_reflect::query as reflect;
use swarmgate_storage::Storage;
use swarmgate_types::{AeId, BrokerError, TrustStatus};

use crate::error::ApiResult;
use crate::state::AppState;

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), BrokerError> {
    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    match (state.ctx.admin_token.as_deref(), provided) {
        (Some(expected), Some(given)) if expected == given => Ok(()),
        _ => Err(BrokerError::AdminRequired),
    }
}

// ============================================================================
// Keys
// ============================================================================

/// GET /admin/keys - list all registered AEs and their key metadata.
pub async fn list_keys(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;
    Ok(Json(json!({"keys": state.ctx.keyring.list_keys()})))
}

#[derive(Debug, Deserialize)]
pub struct AddKeyRequest {
    pub ae_id: String,
    pub pubkey_b64: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub status: Option<String>,
}

/// POST /admin/keys/add - provision an AE public key.
pub async fn add_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AddKeyRequest>,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;

    let status = match req.status.as_deref() {
        None => TrustStatus::Trusted,
        Some(s) => TrustStatus::parse(s)
            .ok_or_else(|| BrokerError::InvalidEnvelope(format!("unknown status '{s}'")))?,
    };

    let record = state
        .ctx
        .keyring
        .add_key(req.ae_id, &req.pubkey_b64, req.roles, status)
        .await?;
    state
        .ctx
        .audit("key_provisioned", json!({"ae_id": &record.ae_id}))
        .await;
    Ok(Json(json!({"status": "added", "record": record})))
}

#[derive(Debug, Deserialize)]
pub struct RevokeKeyRequest {
    pub ae_id: String,
}

/// POST /admin/keys/revoke - revoke a key, retaining the row for audit.
pub async fn revoke_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RevokeKeyRequest>,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;

    let ae_id = AeId::new(req.ae_id);
    state.ctx.keyring.revoke(&ae_id).await?;
    state.ctx.audit("key_revoked", json!({"ae_id": &ae_id})).await;
    Ok(Json(json!({"status": "revoked", "ae_id": ae_id})))
}

// ============================================================================
// Runtime partitions
// ============================================================================

/// GET /admin/runtime/live
pub async fn runtime_live(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;
    Ok(Json(json!({"live": state.ctx.runtime.get_live()})))
}

/// GET /admin/runtime/stale
pub async fn runtime_stale(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;
    Ok(Json(json!({"stale": state.ctx.runtime.get_stale()})))
}

/// GET /admin/runtime/dead
pub async fn runtime_dead(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;
    Ok(Json(json!({"dead": state.ctx.runtime.get_dead()})))
}

/// GET /admin/runtime/all
pub async fn runtime_all(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;
    Ok(Json(json!({
        "live": state.ctx.runtime.get_live(),
        "stale": state.ctx.runtime.get_stale(),
        "dead": state.ctx.runtime.get_dead(),
    })))
}

/// GET /admin/runtime/{ae_id}
pub async fn runtime_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(ae_id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;
    let record = state
        .ctx
        .runtime
        .get(&AeId::new(ae_id.clone()))
        .ok_or_else(|| BrokerError::NotFound(format!("runtime record for '{ae_id}'")))?;
    Ok(Json(json!({"record": record})))
}

// ============================================================================
// Reflection
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RecordQueryParams {
    pub ae_id: Option<String>,
    pub session_id: Option<String>,
    pub event_type: Option<String>,
    pub limit: Option<usize>,
}

/// GET /admin/reflect/records - low-level reflection record query.
pub async fn reflect_records(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RecordQueryParams>,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;

    let query = reflect::RecordQuery {
        ae_id: params.ae_id,
        session_id: params.session_id,
        event_type: params.event_type,
        since: None,
        until: None,
        limit: params.limit,
    };
    let records = reflect::get_records(state.ctx.reflection.as_ref(), &query)
        .await
        .map_err(BrokerError::from)?;
    Ok(Json(json!({"count": records.len(), "records": records})))
}

/// GET /admin/reflect/aes - all AE ids observed in reflection records.
pub async fn reflect_aes(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;
    let aes = reflect::observed_aes(state.ctx.reflection.as_ref())
        .await
        .map_err(BrokerError::from)?;
    Ok(Json(json!({"count": aes.len(), "aes": aes})))
}

/// GET /admin/reflect/aes/{ae_id}/sessions
pub async fn reflect_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(ae_id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;
    let sessions = reflect::sessions_for_ae(state.ctx.reflection.as_ref(), &ae_id)
        .await
        .map_err(BrokerError::from)?;
    if sessions.is_empty() {
        return Err(BrokerError::NotFound(format!("sessions for '{ae_id}'")).into());
    }
    Ok(Json(json!({"ae_id": ae_id, "count": sessions.len(), "sessions": sessions})))
}

/// GET /admin/reflect/aes/{ae_id}/sessions/{session_id}/timeline
pub async fn reflect_timeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((ae_id, session_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;
    let timeline =
        reflect::build_session_timeline(state.ctx.reflection.as_ref(), &ae_id, &session_id)
            .await
            .map_err(BrokerError::from)?;
    if timeline.records.is_empty() {
        return Err(BrokerError::NotFound(format!("session '{session_id}'")).into());
    }
    Ok(Json(serde_json::to_value(timeline).unwrap_or(Value::Null)))
}

/// GET /admin/reflect/aes/{ae_id}/sessions/{session_id}/what-happened
pub async fn reflect_what_happened(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((ae_id, session_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;
    let report = reflect::what_happened(state.ctx.reflection.as_ref(), &ae_id, &session_id)
        .await
        .map_err(BrokerError::from)?;
    Ok(Json(serde_json::to_value(report).unwrap_or(Value::Null)))
}

/// GET /admin/reflect/aes/{ae_id}/sessions/{session_id}/why-stopped
pub async fn reflect_why_stopped(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((ae_id, session_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;
    let report = reflect::why_did_it_stop(state.ctx.reflection.as_ref(), &ae_id, &session_id)
        .await
        .map_err(BrokerError::from)?;
    Ok(Json(serde_json::to_value(report).unwrap_or(Value::Null)))
}

#[derive(Debug, Deserialize)]
pub struct FailureWindowParams {
    pub window: Option<usize>,
}

/// GET /admin/reflect/aes/{ae_id}/sessions/{session_id}/preceded-failure
pub async fn reflect_preceded_failure(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((ae_id, session_id)): Path<(String, String)>,
    Query(params): Query<FailureWindowParams>,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;
    let report = reflect::what_preceded_failure(
        state.ctx.reflection.as_ref(),
        &ae_id,
        &session_id,
        params.window.unwrap_or(5).clamp(1, 50),
    )
    .await
    .map_err(BrokerError::from)?;
    Ok(Json(serde_json::to_value(report).unwrap_or(Value::Null)))
}

// ============================================================================
// Audit
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AuditParams {
    pub limit: Option<usize>,
}

/// GET /admin/audit - tail of the structured audit log.
pub async fn audit_tail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuditParams>,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;
    let events = state
        .ctx
        .storage
        .recent_events(params.limit.unwrap_or(50).clamp(1, 1000))
        .await
        .map_err(BrokerError::from)?;
    Ok(Json(json!({"count": events.len(), "events": events})))
}
