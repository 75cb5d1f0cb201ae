//! The emit endpoint - a thin shim over the broker checkpoint

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

use swarmgate_broker::{pipeline, EmitReceipt};

use crate::error::ApiResult;
use crate::handlers::bearer_header;
use crate::state::AppState;

/// POST /emit - accept a signed envelope from an AE client.
pub async fn emit_envelope(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<Json<EmitReceipt>> {
    let receipt = pipeline::emit(&state.ctx, bearer_header(&headers), body).await?;
    Ok(Json(receipt))
}
