//! Admission endpoints: challenge issuance and signed-response verification
//!
//! `/verify` is where continuous trust starts: a successful response mints a
//! session, a refresh token (raw value returned exactly once), and the first
//! access token in a single grant.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use swarmgate_broker::BrokerContext;
use swarmgate_runtime::Heartbeat;
use swarmgate_types::{ActivitySource, AeId, BrokerError, BrokerResult, KeyRecord};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub ae_id: String,
}

/// POST /register - issue a cryptographic challenge (nonce) to an AE.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<Value>> {
    let ae_id = AeId::new(req.ae_id);
    let nonce = state.ctx.admission.issue_challenge(&ae_id)?;
    Ok(Json(json!({"ae_id": ae_id, "nonce": nonce})))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub ae_id: String,
    pub signed_nonce_b64: String,
}

/// POST /verify - verify the signed nonce and issue the session grant.
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Response {
    let ctx = &state.ctx;
    let ae_id = AeId::new(req.ae_id.clone());

    let record = match ctx.keyring.get_by_aeid(&ae_id) {
        Some(record) if record.is_trusted() => record,
        _ => {
            tracing::warn!(ae_id = %ae_id, "verify rejected: not trusted");
            return ApiError(BrokerError::NotTrusted(req.ae_id)).into_response();
        }
    };

    let (verified, reason) = ctx.admission.verify_response(&ae_id, &req.signed_nonce_b64);
    if !verified {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"ae_id": ae_id, "verified": false, "reason": reason})),
        )
            .into_response();
    }

    match issue_grant(ctx, &record).await {
        Ok(body) => Json(body).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

async fn issue_grant(ctx: &BrokerContext, record: &KeyRecord) -> BrokerResult<Value> {
    let profile = ctx.auth_config.default_profile().clone();

    let session = ctx
        .sessions
        .create_session(
            record.ae_id.clone(),
            &record.pubkey_fingerprint,
            &profile,
            json!({"roles": &record.roles}),
        )
        .await?;
    let (refresh_raw, refresh_record) =
        ctx.sessions.create_refresh_token(session.id, &profile).await?;
    let access_token = ctx
        .tokens
        .issue_access_token(&record.ae_id, &session.id, &record.roles)?;

    ctx.heartbeat(
        Heartbeat::new(record.ae_id.clone(), ActivitySource::Register)
            .with_session(session.id.to_string()),
    )
    .await;
    ctx.audit(
        "session_granted",
        json!({
            "ae_id": &record.ae_id,
            "session_id": session.id,
            "ts": Utc::now().timestamp(),
        }),
    )
    .await;

    tracing::info!(ae_id = %record.ae_id, session_id = %session.id, "AE verified, grant issued");

    Ok(json!({
        "ae_id": &record.ae_id,
        "verified": true,
        "reason": "verified",
        "session_id": session.id,
        "access_token": access_token,
        "expires_in": ctx.tokens.access_ttl_secs(),
        "refresh_token": refresh_raw,
        "refresh_expires_in": refresh_record.remaining_secs(Utc::now()),
    }))
}
