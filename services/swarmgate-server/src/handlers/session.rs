//! Session lifecycle endpoints: refresh rotation and heartbeats

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use swarmgate_runtime::Heartbeat;
use swarmgate_types::{ActivitySource, BrokerError};

use crate::error::ApiResult;
use crate::handlers::bearer_header;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub session_id: String,
    pub refresh_token: String,
}

/// POST /session/refresh - exchange a refresh token for a fresh access
/// token, rotating the refresh token in the process.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<Value>> {
    let ctx = &state.ctx;
    let session_id = Uuid::parse_str(&req.session_id).map_err(|_| BrokerError::BadRefresh)?;

    // Validate the presented token, then the session itself.
    let token = ctx
        .sessions
        .validate_refresh_token(&session_id, &req.refresh_token)
        .await?;
    let session = match ctx.sessions.assert_session_active(&session_id).await {
        Ok(session) => session,
        Err(BrokerError::NotFound(_)) => return Err(BrokerError::BadRefresh.into()),
        Err(err) => return Err(err.into()),
    };

    let (new_raw, new_record) = ctx.sessions.rotate_refresh_token(&token).await?;

    let roles: Vec<String> = session
        .metadata
        .get("roles")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    let access_token = ctx
        .tokens
        .issue_access_token(&session.subject, &session.id, &roles)?;

    ctx.sessions.touch(&session_id).await?;
    tracing::info!(session_id = %session_id, "access token refreshed");

    Ok(Json(json!({
        "session_id": session.id,
        "access_token": access_token,
        "expires_in": ctx.tokens.access_ttl_secs(),
        "refresh_token": new_raw,
        "refresh_expires_in": new_record.remaining_secs(Utc::now()),
    })))
}

/// POST /session/heartbeat - slide the idle window using the access token.
pub async fn heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let ctx = &state.ctx;
    let claims = ctx.authenticate(bearer_header(&headers))?;
    let session_id = claims.session_id()?;

    assert_active_as_auth(ctx, &session_id).await?;
    ctx.sessions.touch(&session_id).await?;

    ctx.heartbeat(
        Heartbeat::new(claims.ae_id(), ActivitySource::Session).with_session(claims.sid.clone()),
    )
    .await;

    Ok(Json(json!({"ok": true, "sid": claims.sid})))
}

/// POST /ae/heartbeat - explicit AE liveness ping.
pub async fn ae_heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let ctx = &state.ctx;
    let claims = ctx.authenticate(bearer_header(&headers))?;
    let session_id = claims.session_id()?;

    assert_active_as_auth(ctx, &session_id).await?;
    ctx.sessions.touch(&session_id).await?;

    ctx.heartbeat(
        Heartbeat::new(claims.ae_id(), ActivitySource::Explicit).with_session(claims.sid.clone()),
    )
    .await;

    Ok(Json(json!({"ok": true, "ae_id": claims.sub, "sid": claims.sid})))
}

/// A token naming a session the store has never seen is an authentication
/// failure at this surface, not a 404.
async fn assert_active_as_auth(
    ctx: &swarmgate_broker::BrokerContext,
    session_id: &Uuid,
) -> Result<(), BrokerError> {
    match ctx.sessions.assert_session_active(session_id).await {
        Ok(_) => Ok(()),
        Err(BrokerError::NotFound(_)) => Err(BrokerError::InvalidToken),
        Err(err) => Err(err),
    }
}
