//! HTTP error translation
//!
//! The one place pipeline rejections become wire responses: status code from
//! the error kind, body `{code, reason, message}` with the closed reason
//! vocabulary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use swarmgate_types::{BrokerError, ErrorBody};

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Newtype so `BrokerError` can cross into axum responses.
pub struct ApiError(pub BrokerError);

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_server_error() {
            tracing::error!(reason = self.0.reason(), error = %self.0, "request failed");
        }
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}
