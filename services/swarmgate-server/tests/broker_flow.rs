//! End-to-end broker scenarios over the real router
//!
//! Each test wires a full broker (memory storage, local relay transport)
//! and drives it through HTTP, the way an AE client would.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use swarmgate_auth::{AdmissionService, AuthConfig, SessionManager, TokenService};
use swarmgate_broker::{BrokerContext, LocalRelayTransport};
use swarmgate_bus::EventBus;
use swarmgate_crypto::{b64d, sign_b64, sign_envelope, KeyPair};
use swarmgate_keyring::Keyring;
use swarmgate_policy::{PolicyEngine, PolicyHandle, StaticPolicy};
use swarmgate_reflect::{ReflectionSink, StorageReflectionStore};
use swarmgate_runtime::RuntimeRegistry;
use swarmgate_storage::{MemoryStorage, Storage};
use swarmgate_types::{Envelope, TrustStatus};

const ADMIN_TOKEN: &str = "test-admin-token";
const JWT_SECRET: &str = "integration-test-secret-32-bytes!!!!";

const FENCE: &str = r#"
subjects:
  fused.track:
    publishers: [fusion_ae]
    subscribers: [fusion_ae]
    labels: [CUI]
  fusion.topic:
    publishers: [fusion_ae]
    subscribers: [fusion_ae]
"#;

async fn build_broker(stale_after: Duration, dead_after: Duration) -> (Router, Arc<BrokerContext>) {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());

    let keyring = Arc::new(Keyring::new(storage.clone()));
    let policy = Arc::new(PolicyHandle::new(PolicyEngine::build(
        StaticPolicy::from_yaml(FENCE).unwrap(),
        vec![],
    )));

    let mut auth_config = AuthConfig::default();
    auth_config.jwt.secret = JWT_SECRET.to_string();
    let tokens = Arc::new(TokenService::new(&auth_config.jwt).unwrap());
    let sessions = Arc::new(SessionManager::new(storage.clone()));
    let admission = Arc::new(AdmissionService::new(keyring.clone()));

    let runtime = Arc::new(RuntimeRegistry::new(stale_after, dead_after));
    let bus = Arc::new(EventBus::default());
    let reflection = Arc::new(StorageReflectionStore::new(storage.clone()));
    ReflectionSink::new(reflection.clone()).attach(&bus);

    let ctx = Arc::new(BrokerContext {
        keyring,
        policy,
        sessions,
        admission,
        tokens,
        runtime,
        reflection,
        bus,
        transport: Arc::new(LocalRelayTransport),
        storage,
        auth_config,
        admin_token: Some(ADMIN_TOKEN.to_string()),
    });

    let app = build_router(ctx.clone());
    (app, ctx)
}

fn build_router(ctx: Arc<BrokerContext>) -> Router {
    // Short keepalive so SSE tests never wait on the interval.
    let state = swarmgate_server::state::AppState::new(ctx, Duration::from_secs(1));
    swarmgate_server::routes::create_router(state)
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_json_auth(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_admin(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("x-admin-token", ADMIN_TOKEN)
        .body(Body::empty())
        .unwrap()
}

/// Enroll an AE, run the challenge/response, declare capabilities.
/// Returns the keypair and the access token.
async fn enroll_and_verify(app: &Router, ctx: &BrokerContext, ae_id: &str) -> (KeyPair, String, String) {
    let keypair = KeyPair::generate();
    ctx.keyring
        .add_key(
            ae_id,
            &keypair.public_key_b64(),
            vec!["producer".to_string()],
            TrustStatus::Trusted,
        )
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(post_json("/register", json!({"ae_id": ae_id})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let nonce = b64d(body["nonce"].as_str().unwrap()).unwrap();

    let signed = sign_b64(&keypair, &nonce).unwrap();
    let response = app
        .clone()
        .oneshot(post_json(
            "/verify",
            json!({"ae_id": ae_id, "signed_nonce_b64": signed}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["verified"], true);

    let access_token = body["access_token"].as_str().unwrap().to_string();
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json_auth(
            "/ae/capabilities",
            &access_token,
            json!({
                "publishes": ["fused.track", "fusion.topic"],
                "subscribes": ["fusion.topic"],
                "meta": {"version": "1.0"}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    (keypair, access_token, session_id)
}

fn signed_envelope(keypair: &KeyPair, producer: &str, subject: &str, payload: Value) -> Value {
    let mut env = Envelope::make(producer, subject, payload, vec!["CUI".to_string()], keypair.fingerprint());
    sign_envelope(keypair, &mut env).unwrap();
    env.to_value()
}

#[tokio::test]
async fn test_happy_publish_flow() {
    let (app, ctx) = build_broker(Duration::from_secs(30), Duration::from_secs(120)).await;
    let (keypair, token, session_id) = enroll_and_verify(&app, &ctx, "fusion_ae").await;

    let envelope = signed_envelope(&keypair, "fusion_ae", "fused.track", json!({"lat": 38.7}));
    let response = app
        .clone()
        .oneshot(post_json_auth("/emit", &token, envelope))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["subject"], "fused.track");

    // Runtime registry shows the AE live, last activity from the emit.
    let response = app.clone().oneshot(get_admin("/admin/runtime/live")).await.unwrap();
    let body = read_json(response).await;
    let live = body["live"].as_array().unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0]["ae_id"], "fusion_ae");
    assert_eq!(live[0]["last_source"], "emit");

    // Reflection log holds the ae.runtime record correlated to the session.
    let response = app
        .clone()
        .oneshot(get_admin("/admin/reflect/records?event_type=ae.runtime&ae_id=fusion_ae"))
        .await
        .unwrap();
    let body = read_json(response).await;
    assert!(body["count"].as_u64().unwrap() >= 1);
    let records = body["records"].as_array().unwrap();
    assert!(records.iter().any(|r| {
        r["correlation"]["session_id"].as_str() == Some(session_id.as_str())
            && r["payload"]["source"].as_str() == Some("emit")
    }));
}

#[tokio::test]
async fn test_producer_mismatch_rejected() {
    let (app, ctx) = build_broker(Duration::from_secs(30), Duration::from_secs(120)).await;
    let (keypair, _token, _) = enroll_and_verify(&app, &ctx, "fusion_ae").await;

    // A second AE gets its own valid token but replays fusion_ae's envelope.
    let (_rogue_pair, rogue_token, _) = enroll_and_verify(&app, &ctx, "rogue_ae").await;

    let envelope = signed_envelope(&keypair, "fusion_ae", "fused.track", json!({}));
    let response = app
        .clone()
        .oneshot(post_json_auth("/emit", &rogue_token, envelope))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json(response).await;
    assert_eq!(body["reason"], "producer_mismatch");
}

#[tokio::test]
async fn test_policy_denied_subject_outside_capability() {
    let (app, ctx) = build_broker(Duration::from_secs(30), Duration::from_secs(120)).await;
    let (keypair, token, _) = enroll_and_verify(&app, &ctx, "fusion_ae").await;

    let envelope = signed_envelope(&keypair, "fusion_ae", "classified.data", json!({}));
    let response = app
        .clone()
        .oneshot(post_json_auth("/emit", &token, envelope))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json(response).await;
    assert_eq!(body["reason"], "policy_denied");

    // The rejection is audited; no accepted-emit entry exists.
    let response = app.clone().oneshot(get_admin("/admin/audit?limit=50")).await.unwrap();
    let body = read_json(response).await;
    let events: Vec<&str> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event"].as_str().unwrap())
        .collect();
    assert!(events.contains(&"emit_blocked_policy"));
    assert!(!events.contains(&"emit_received"));
}

#[tokio::test]
async fn test_invalid_signature_rejected() {
    let (app, ctx) = build_broker(Duration::from_secs(30), Duration::from_secs(120)).await;
    let (keypair, token, _) = enroll_and_verify(&app, &ctx, "fusion_ae").await;

    let mut envelope = signed_envelope(&keypair, "fusion_ae", "fused.track", json!({}));
    envelope["sig"] = json!("cmFuZG9tLWJ5dGVzLW5vdC1hLXNpZ25hdHVyZQ==");

    let response = app
        .clone()
        .oneshot(post_json_auth("/emit", &token, envelope))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["reason"], "invalid_signature");
}

#[tokio::test]
async fn test_missing_bearer_unauthenticated() {
    let (app, _ctx) = build_broker(Duration::from_secs(30), Duration::from_secs(120)).await;

    let response = app
        .clone()
        .oneshot(post_json("/emit", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["reason"], "missing_bearer");
}

#[tokio::test]
async fn test_capability_outside_fence_rejected() {
    let (app, ctx) = build_broker(Duration::from_secs(30), Duration::from_secs(120)).await;
    let (_keypair, token, _) = enroll_and_verify(&app, &ctx, "fusion_ae").await;

    let response = app
        .clone()
        .oneshot(post_json_auth(
            "/ae/capabilities",
            &token,
            json!({"publishes": ["classified.data"], "subscribes": []}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["reason"], "unknown_subject");
}

#[tokio::test]
async fn test_refresh_rotation_flow() {
    let (app, ctx) = build_broker(Duration::from_secs(30), Duration::from_secs(120)).await;
    let keypair = KeyPair::generate();
    ctx.keyring
        .add_key("fusion_ae", &keypair.public_key_b64(), vec![], TrustStatus::Trusted)
        .await
        .unwrap();

    // Register + verify by hand to keep the refresh token.
    let response = app
        .clone()
        .oneshot(post_json("/register", json!({"ae_id": "fusion_ae"})))
        .await
        .unwrap();
    let nonce = b64d(read_json(response).await["nonce"].as_str().unwrap()).unwrap();
    let signed = sign_b64(&keypair, &nonce).unwrap();
    let response = app
        .clone()
        .oneshot(post_json(
            "/verify",
            json!({"ae_id": "fusion_ae", "signed_nonce_b64": signed}),
        ))
        .await
        .unwrap();
    let grant = read_json(response).await;
    let session_id = grant["session_id"].as_str().unwrap().to_string();
    let refresh = grant["refresh_token"].as_str().unwrap().to_string();

    // Exchange the refresh token.
    let response = app
        .clone()
        .oneshot(post_json(
            "/session/refresh",
            json!({"session_id": session_id, "refresh_token": refresh}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = read_json(response).await;
    let new_refresh = rotated["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, refresh);

    // The old refresh token is dead.
    let response = app
        .clone()
        .oneshot(post_json(
            "/session/refresh",
            json!({"session_id": session_id, "refresh_token": refresh}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["reason"], "bad_refresh");
}

#[tokio::test]
async fn test_runtime_sweep_transitions_reach_reflection() {
    let (app, ctx) = build_broker(Duration::from_millis(1000), Duration::from_millis(2000)).await;
    let (_keypair, token, _) = enroll_and_verify(&app, &ctx, "fusion_ae").await;

    // Anchor liveness with an explicit heartbeat.
    let response = app
        .clone()
        .oneshot(post_json_auth("/ae/heartbeat", &token, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    ctx.sweep_and_publish().await;
    let response = app.clone().oneshot(get_admin("/admin/runtime/stale")).await.unwrap();
    let body = read_json(response).await;
    assert_eq!(body["stale"].as_array().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    ctx.sweep_and_publish().await;
    let response = app.clone().oneshot(get_admin("/admin/runtime/dead")).await.unwrap();
    let body = read_json(response).await;
    assert_eq!(body["dead"].as_array().unwrap().len(), 1);

    // Both demotions appear in the reflection log.
    let response = app
        .clone()
        .oneshot(get_admin(
            "/admin/reflect/records?event_type=abi.runtime.transition&ae_id=fusion_ae",
        ))
        .await
        .unwrap();
    let body = read_json(response).await;
    let transitions: Vec<(String, String)> = body["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| {
            (
                r["transitions"][0]["from_state"].as_str().unwrap_or("").to_string(),
                r["transitions"][0]["to_state"].as_str().unwrap_or("").to_string(),
            )
        })
        .collect();
    assert!(transitions.contains(&("live".to_string(), "stale".to_string())));
    assert!(transitions.contains(&("stale".to_string(), "dead".to_string())));
}

#[tokio::test]
async fn test_sse_loopback() {
    let (app, ctx) = build_broker(Duration::from_secs(30), Duration::from_secs(120)).await;
    let (_keypair, token, _) = enroll_and_verify(&app, &ctx, "fusion_ae").await;

    let request = Request::get("/subscribe/fusion.topic")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    // The queue is registered once the response exists.
    assert_eq!(ctx.bus.subscriber_count("fusion.topic"), 1);
    ctx.bus
        .publish("fusion.topic", json!({"track_id": "TEST-123"}))
        .await;

    let mut body = response.into_body().into_data_stream();
    let mut collected = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !collected.contains("data:") {
        let chunk = tokio::time::timeout_at(deadline, body.next())
            .await
            .expect("timed out waiting for SSE frame")
            .expect("stream ended early")
            .expect("body error");
        collected.push_str(&String::from_utf8_lossy(&chunk));
    }
    assert!(collected.contains(r#"data: {"track_id":"TEST-123"}"#), "{collected}");

    // Dropping the body deregisters the subscriber.
    drop(body);
    ctx.bus.publish("fusion.topic", json!({"n": 2})).await;
    assert_eq!(ctx.bus.subscriber_count("fusion.topic"), 0);
}

#[tokio::test]
async fn test_admin_requires_token() {
    let (app, _ctx) = build_broker(Duration::from_secs(30), Duration::from_secs(120)).await;

    let response = app
        .clone()
        .oneshot(Request::get("/admin/runtime/all").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_healthz() {
    let (app, _ctx) = build_broker(Duration::from_secs(30), Duration::from_secs(120)).await;
    let response = app
        .clone()
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "ok");
}
