//! Route wiring
//!
//! Handlers take the shared state as a parameter; components never
//! reference routes. Admin endpoints live under `/admin` and are gated by
//! the shared admin token inside the handlers.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, capabilities, emit, health, register, session, subscribe};
use crate::state::AppState;

/// Build the full broker router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Admission
        .route("/register", post(register::register))
        .route("/verify", post(register::verify))
        // Session lifecycle
        .route("/session/refresh", post(session::refresh))
        .route("/session/heartbeat", post(session::heartbeat))
        // AE surface
        .route("/ae/heartbeat", post(session::ae_heartbeat))
        .route("/ae/capabilities", post(capabilities::declare))
        // Ingress / egress
        .route("/emit", post(emit::emit_envelope))
        .route("/subscribe/:topic", get(subscribe::subscribe_topic))
        // Operator surface
        .nest("/admin", admin_routes())
        // Health
        .route("/healthz", get(health::healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        // Keys
        .route("/keys", get(admin::list_keys))
        .route("/keys/add", post(admin::add_key))
        .route("/keys/revoke", post(admin::revoke_key))
        // Runtime partitions
        .route("/runtime/live", get(admin::runtime_live))
        .route("/runtime/stale", get(admin::runtime_stale))
        .route("/runtime/dead", get(admin::runtime_dead))
        .route("/runtime/all", get(admin::runtime_all))
        .route("/runtime/:ae_id", get(admin::runtime_one))
        // Reflection
        .route("/reflect/records", get(admin::reflect_records))
        .route("/reflect/aes", get(admin::reflect_aes))
        .route("/reflect/aes/:ae_id/sessions", get(admin::reflect_sessions))
        .route(
            "/reflect/aes/:ae_id/sessions/:session_id/timeline",
            get(admin::reflect_timeline),
        )
        .route(
            "/reflect/aes/:ae_id/sessions/:session_id/what-happened",
            get(admin::reflect_what_happened),
        )
        .route(
            "/reflect/aes/:ae_id/sessions/:session_id/why-stopped",
            get(admin::reflect_why_stopped),
        )
        .route(
            "/reflect/aes/:ae_id/sessions/:session_id/preceded-failure",
            get(admin::reflect_preceded_failure),
        )
        // Audit tail
        .route("/audit", get(admin::audit_tail))
}
