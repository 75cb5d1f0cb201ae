//! Broker error taxonomy
//!
//! Errors are explicit and safe to surface: each variant maps to an HTTP
//! status and a short machine-readable reason from a closed vocabulary.
//! Internal detail never leaks into client-facing messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for broker operations
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Broker error types
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    // ========================================================================
    // Authentication
    // ========================================================================
    /// No usable `Authorization: Bearer` header
    #[error("Missing bearer token")]
    MissingBearer,

    /// Token failed signature or structural validation
    #[error("Invalid token")]
    InvalidToken,

    /// Token is past its `exp` claim
    #[error("Token expired")]
    TokenExpired,

    /// Session passed idle or absolute expiry
    #[error("Session expired")]
    SessionExpired,

    /// Session was administratively revoked
    #[error("Session revoked")]
    SessionRevoked,

    /// Refresh token unknown, revoked, or expired
    #[error("Invalid refresh token")]
    BadRefresh,

    // ========================================================================
    // Authorization
    // ========================================================================
    /// Envelope producer does not match the token subject
    #[error("Envelope producer does not match token subject")]
    ProducerMismatch,

    /// AE has no keyring record
    #[error("AE '{0}' not found")]
    UnknownAe(String),

    /// AE exists but is not trusted (untrusted or revoked)
    #[error("AE '{0}' is not trusted")]
    NotTrusted(String),

    /// Static fence + capability evaluation denied the operation
    #[error("Policy denied {action} on '{subject}'")]
    PolicyDenied { action: &'static str, subject: String },

    /// Admin surface called without a valid admin token
    #[error("Admin authorization required")]
    AdminRequired,

    // ========================================================================
    // Requests
    // ========================================================================
    /// Envelope or request body failed schema validation
    #[error("Invalid request: {0}")]
    InvalidEnvelope(String),

    /// Ed25519 signature did not verify against the keyring key
    #[error("Envelope signature verification failed")]
    InvalidSignature,

    /// Capability declaration referenced subjects outside the static fence
    #[error("Unknown subjects: {0}")]
    UnknownSubject(String),

    /// Resource lookup miss on an operator query
    #[error("{0} not found")]
    NotFound(String),

    /// State conflict (e.g. duplicate admission challenge consumption)
    #[error("Conflict: {0}")]
    Conflict(String),

    // ========================================================================
    // Internal
    // ========================================================================
    /// Downstream mesh dispatch failed after the emit was recorded
    #[error("Mesh transport dispatch failed")]
    TransportFailed,

    /// Storage or other internal failure (detail not exposed to clients)
    #[error("Internal error")]
    Internal(String),
}

impl BrokerError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingBearer
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::SessionExpired
            | Self::SessionRevoked
            | Self::BadRefresh => 401,

            Self::ProducerMismatch
            | Self::NotTrusted(_)
            | Self::PolicyDenied { .. }
            | Self::AdminRequired => 403,

            Self::UnknownAe(_)
            | Self::InvalidEnvelope(_)
            | Self::InvalidSignature
            | Self::UnknownSubject(_) => 400,

            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,

            Self::TransportFailed | Self::Internal(_) => 500,
        }
    }

    /// Machine-readable reason from the closed vocabulary
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingBearer => "missing_bearer",
            Self::InvalidToken => "invalid_token",
            Self::TokenExpired => "token_expired",
            Self::SessionExpired => "session_expired",
            Self::SessionRevoked => "session_revoked",
            Self::BadRefresh => "bad_refresh",
            Self::ProducerMismatch => "producer_mismatch",
            Self::UnknownAe(_) => "ae_not_found",
            Self::NotTrusted(_) => "not_trusted",
            Self::PolicyDenied { .. } => "policy_denied",
            Self::AdminRequired => "admin_required",
            Self::InvalidEnvelope(_) => "invalid_envelope",
            Self::InvalidSignature => "invalid_signature",
            Self::UnknownSubject(_) => "unknown_subject",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::TransportFailed => "transport_failed",
            Self::Internal(_) => "internal",
        }
    }

    /// Error kind name (coarse classification used in audit entries)
    pub fn kind(&self) -> &'static str {
        match self.status_code() {
            401 => "UNAUTHENTICATED",
            403 => "FORBIDDEN",
            400 => "BAD_REQUEST",
            404 => "NOT_FOUND",
            409 => "CONFLICT",
            _ => "INTERNAL",
        }
    }

    /// Whether this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Safe message for clients (does not leak internal details)
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

/// Wire-level error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Coarse kind (`UNAUTHENTICATED`, `FORBIDDEN`, ...)
    pub code: String,
    /// Closed-vocabulary reason (`policy_denied`, `invalid_signature`, ...)
    pub reason: String,
    /// Human-readable message
    pub message: String,
}

impl From<&BrokerError> for ErrorBody {
    fn from(err: &BrokerError) -> Self {
        Self {
            code: err.kind().to_string(),
            reason: err.reason().to_string(),
            message: err.client_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(BrokerError::MissingBearer.status_code(), 401);
        assert_eq!(BrokerError::ProducerMismatch.status_code(), 403);
        assert_eq!(BrokerError::InvalidSignature.status_code(), 400);
        assert_eq!(BrokerError::NotFound("session".into()).status_code(), 404);
        assert_eq!(BrokerError::Internal("db".into()).status_code(), 500);
    }

    #[test]
    fn test_reasons_are_closed_vocabulary() {
        assert_eq!(
            BrokerError::PolicyDenied { action: "publish", subject: "x".into() }.reason(),
            "policy_denied"
        );
        assert_eq!(BrokerError::UnknownAe("a".into()).reason(), "ae_not_found");
        assert_eq!(BrokerError::BadRefresh.reason(), "bad_refresh");
    }

    #[test]
    fn test_internal_detail_never_leaks() {
        let err = BrokerError::Internal("connection string with password".to_string());
        let body = ErrorBody::from(&err);
        assert!(!body.message.contains("password"));
        assert_eq!(body.code, "INTERNAL");
    }
}
