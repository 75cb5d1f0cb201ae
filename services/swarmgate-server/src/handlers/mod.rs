//! Request handlers
//!
//! Handlers take the shared `AppState` and translate between the wire and
//! the broker core; no broker logic lives here.

pub mod admin;
pub mod capabilities;
pub mod emit;
pub mod health;
pub mod register;
pub mod session;
pub mod subscribe;

use axum::http::{header, HeaderMap};

/// Raw `Authorization` header value, if present.
pub fn bearer_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}
