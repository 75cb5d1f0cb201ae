//! The emit checkpoint
//!
//! One operation: `emit(bearer, envelope_json)`. Thirteen ordered stages;
//! the first failing stage short-circuits with a typed error, and every
//! rejection writes a structured audit entry before surfacing. Stages 1-8
//! are pure functions of inputs and broker state; stages 9-12 are side
//! effects. Best-effort side effects (heartbeat, audit, local fan-out) are
//! logged and swallowed; only mesh dispatch failure surfaces, as INTERNAL,
//! after the attempt has been recorded.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use swarmgate_runtime::Heartbeat;
use swarmgate_types::{ActivitySource, BrokerError, BrokerResult, Envelope};

use crate::context::BrokerContext;
use crate::transport::MeshTransport;

/// Acceptance receipt: ingress acceptance, not downstream delivery.
#[derive(Debug, Clone, Serialize)]
pub struct EmitReceipt {
    pub status: &'static str,
    pub subject: String,
    pub ts: i64,
}

/// Run the full checkpoint for one publish.
pub async fn emit(
    ctx: &BrokerContext,
    authorization: Option<&str>,
    body: Value,
) -> BrokerResult<EmitReceipt> {
    // Stage 1-2: bearer presence, token verify.
    let claims = match ctx.authenticate(authorization) {
        Ok(claims) => claims,
        Err(err) => {
            audit_rejection(ctx, "emit_blocked_auth", None, None, &err).await;
            return Err(err);
        }
    };
    let producer_hint = claims.sub.clone();

    // Stage 3: envelope decode.
    let envelope: Envelope = match serde_json::from_value(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            let err = BrokerError::InvalidEnvelope(e.to_string());
            audit_rejection(ctx, "emit_blocked_schema", Some(&producer_hint), None, &err).await;
            return Err(err);
        }
    };
    let subject = envelope.subject.to_string();

    // Stage 4: producer identity must match the token subject.
    if envelope.producer.as_str() != claims.sub {
        let err = BrokerError::ProducerMismatch;
        audit_rejection(ctx, "emit_blocked_producer", Some(&producer_hint), Some(&subject), &err)
            .await;
        return Err(err);
    }

    // Stage 5: session must still be active.
    let session_id = match claims.session_id() {
        Ok(session_id) => session_id,
        Err(err) => {
            audit_rejection(ctx, "emit_blocked_auth", Some(&producer_hint), Some(&subject), &err)
                .await;
            return Err(err);
        }
    };
    if let Err(err) = ctx.sessions.assert_session_active(&session_id).await {
        // A token referencing an unknown session is an invalid token, not a
        // 404: the caller only ever sees 401 here.
        let err = match err {
            BrokerError::NotFound(_) => BrokerError::InvalidToken,
            other => other,
        };
        audit_rejection(ctx, "emit_blocked_auth", Some(&producer_hint), Some(&subject), &err).await;
        return Err(err);
    }

    // Stage 6: keyring trust, by ae_id or by the envelope's key fingerprint.
    let record = ctx
        .keyring
        .get_by_aeid(&envelope.producer)
        .or_else(|| ctx.keyring.get_by_fingerprint(&envelope.key_id));
    let record = match record {
        Some(record) if record.is_trusted() => record,
        _ => {
            let err = BrokerError::NotTrusted(envelope.producer.to_string());
            audit_rejection(ctx, "emit_blocked_trust", Some(&producer_hint), Some(&subject), &err)
                .await;
            return Err(err);
        }
    };

    // Stage 7: layered policy. Keyring roles win over token roles.
    let effective_roles = if record.roles.is_empty() {
        claims.roles.clone()
    } else {
        record.roles.clone()
    };
    let policy = ctx.policy.current();
    if !policy.can_publish(&envelope.producer, &subject, &effective_roles) {
        let err = BrokerError::PolicyDenied {
            action: "publish",
            subject: subject.clone(),
        };
        audit_rejection(ctx, "emit_blocked_policy", Some(&producer_hint), Some(&subject), &err)
            .await;
        return Err(err);
    }

    // Stage 8: envelope signature over the canonical bytes.
    if !swarmgate_crypto::verify_envelope(&record.pubkey_b64, &envelope) {
        let err = BrokerError::InvalidSignature;
        audit_rejection(ctx, "emit_blocked_signature", Some(&producer_hint), Some(&subject), &err)
            .await;
        return Err(err);
    }

    // Stage 9: liveness heartbeat. Best-effort from here on.
    ctx.heartbeat(
        Heartbeat::new(envelope.producer.clone(), ActivitySource::Emit)
            .with_session(session_id.to_string())
            .with_intent("publish")
            .with_subject(subject.clone())
            .with_quality("normal"),
    )
    .await;

    // Stage 10: audit the acceptance.
    let ts = Utc::now().timestamp();
    ctx.audit(
        "emit_received",
        serde_json::json!({
            "subject": &subject,
            "producer": &envelope.producer,
            "labels": &envelope.labels,
            "ts": ts,
        }),
    )
    .await;

    // Stage 11: mesh dispatch - the sole trust-boundary crossing.
    if let Err(e) = ctx.transport.publish(&subject, &envelope.to_bytes()).await {
        tracing::error!(
            subject = %subject,
            transport = ctx.transport.name(),
            error = %e,
            "mesh dispatch failed"
        );
        return Err(BrokerError::TransportFailed);
    }

    // Stage 12: local fan-out to streaming subscribers.
    ctx.bus.publish(&subject, envelope.to_value()).await;

    ctx.audit(
        "emit_processed",
        serde_json::json!({
            "subject": &subject,
            "producer": &envelope.producer,
            "transport": ctx.transport.name(),
            "ts": ts,
        }),
    )
    .await;

    tracing::info!(subject = %subject, producer = %envelope.producer, "emit accepted");
    Ok(EmitReceipt {
        status: "accepted",
        subject,
        ts,
    })
}

async fn audit_rejection(
    ctx: &BrokerContext,
    event: &str,
    producer: Option<&str>,
    subject: Option<&str>,
    err: &BrokerError,
) {
    tracing::warn!(event, producer, subject, reason = err.reason(), "emit rejected");
    ctx.audit(
        event,
        serde_json::json!({
            "producer": producer,
            "subject": subject,
            "reason": err.reason(),
            "ts": Utc::now().timestamp(),
        }),
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LocalRelayTransport, MeshTransport, TransportError};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use swarmgate_auth::{AdmissionService, AuthConfig, SessionManager, TokenService};
    use swarmgate_bus::EventBus;
    use swarmgate_crypto::{sign_envelope, KeyPair};
    use swarmgate_keyring::Keyring;
    use swarmgate_policy::{PolicyEngine, PolicyHandle, StaticPolicy};
    use swarmgate_reflect::{InMemoryReflectionStore, ReflectionSink, ReflectionStore};
    use swarmgate_runtime::RuntimeRegistry;
    use swarmgate_storage::{MemoryStorage, Storage};
    use swarmgate_types::{AeId, Capability, Session, TrustStatus};
    use uuid::Uuid;

    const FENCE: &str = r#"
subjects:
  fused.track:
    publishers: [fusion_ae]
    subscribers: [subscriber]
"#;

    struct FailingTransport;

    #[async_trait]
    impl MeshTransport for FailingTransport {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn publish(&self, _subject: &str, _payload: &[u8]) -> Result<(), TransportError> {
            Err(TransportError::Dispatch("mesh down".to_string()))
        }
    }

    struct Harness {
        ctx: BrokerContext,
        keypair: KeyPair,
        session: Session,
        storage: Arc<MemoryStorage>,
        reflection: Arc<InMemoryReflectionStore>,
    }

    async fn harness_with_transport(transport: Arc<dyn MeshTransport>) -> Harness {
        let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
        let storage_dyn: Arc<dyn Storage> = storage.clone();

        let keyring = Arc::new(Keyring::new(storage_dyn.clone()));
        let keypair = KeyPair::generate();
        keyring
            .add_key("fusion_ae", &keypair.public_key_b64(), vec![], TrustStatus::Trusted)
            .await
            .unwrap();

        let capability = Capability {
            ae_id: AeId::new("fusion_ae"),
            publishes: ["fused.track".to_string()].into_iter().collect(),
            subscribes: ["fused.track".to_string()].into_iter().collect(),
            meta: Value::Null,
            updated_at: Utc::now(),
        };
        storage_dyn.upsert_capability(&capability).await.unwrap();

        let policy = Arc::new(PolicyHandle::new(PolicyEngine::build(
            StaticPolicy::from_yaml(FENCE).unwrap(),
            vec![capability],
        )));

        let mut auth_config = AuthConfig::default();
        auth_config.jwt.secret = "unit-test-secret-key-32-bytes-long!!".to_string();
        let tokens = Arc::new(TokenService::new(&auth_config.jwt).unwrap());

        let sessions = Arc::new(SessionManager::new(storage_dyn.clone()));
        let session = sessions
            .create_session(
                AeId::new("fusion_ae"),
                &keypair.fingerprint(),
                auth_config.default_profile(),
                Value::Null,
            )
            .await
            .unwrap();

        let bus = Arc::new(EventBus::default());
        let reflection = Arc::new(InMemoryReflectionStore::new());
        ReflectionSink::new(reflection.clone()).attach(&bus);

        let runtime = Arc::new(RuntimeRegistry::new(
            Duration::from_secs(30),
            Duration::from_secs(120),
        ));

        let ctx = BrokerContext {
            admission: Arc::new(AdmissionService::new(keyring.clone())),
            keyring,
            policy,
            sessions,
            tokens,
            runtime,
            reflection: reflection.clone(),
            bus,
            transport,
            storage: storage_dyn,
            auth_config,
            admin_token: None,
        };

        Harness {
            ctx,
            keypair,
            session,
            storage,
            reflection,
        }
    }

    async fn harness() -> Harness {
        harness_with_transport(Arc::new(LocalRelayTransport)).await
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    fn token_for(h: &Harness, ae: &str, sid: &Uuid) -> String {
        h.ctx
            .tokens
            .issue_access_token(&AeId::new(ae), sid, &["producer".to_string()])
            .unwrap()
    }

    fn signed_envelope(h: &Harness, subject: &str) -> Value {
        let mut env = Envelope::make(
            "fusion_ae",
            subject,
            serde_json::json!({"lat": 38.7, "lon": -104.7}),
            vec!["CUI".to_string()],
            h.keypair.fingerprint(),
        );
        sign_envelope(&h.keypair, &mut env).unwrap();
        env.to_value()
    }

    #[tokio::test]
    async fn test_happy_publish() {
        let h = harness().await;
        let token = token_for(&h, "fusion_ae", &h.session.id);
        let mut rx = h.ctx.bus.subscribe_queue("fused.track");

        let receipt = emit(&h.ctx, Some(&bearer(&token)), signed_envelope(&h, "fused.track"))
            .await
            .unwrap();
        assert_eq!(receipt.status, "accepted");
        assert_eq!(receipt.subject, "fused.track");

        // Runtime registry holds the producer in live.
        let live = h.ctx.runtime.get_live();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].ae_id.as_str(), "fusion_ae");
        assert_eq!(live[0].last_subject.as_deref(), Some("fused.track"));

        // Reflection store has the ae.runtime record with matching ids.
        let records = h.reflection.all().await.unwrap();
        let heartbeats: Vec<_> = records.iter().filter(|r| r.event_type == "ae.runtime").collect();
        assert_eq!(heartbeats.len(), 1);
        assert_eq!(heartbeats[0].correlation.ae_id.as_deref(), Some("fusion_ae"));
        assert_eq!(
            heartbeats[0].correlation.session_id.as_deref(),
            Some(h.session.id.to_string().as_str())
        );
        assert_eq!(heartbeats[0].source.as_deref(), Some("emit"));

        // Local fan-out delivered the envelope.
        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered["producer"], "fusion_ae");

        // Audit captured receipt + processing.
        let events = h.storage.recent_events(10).await.unwrap();
        let names: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();
        assert!(names.contains(&"emit_received"));
        assert!(names.contains(&"emit_processed"));
    }

    #[tokio::test]
    async fn test_missing_bearer() {
        let h = harness().await;
        let err = emit(&h.ctx, None, serde_json::json!({})).await.unwrap_err();
        assert_eq!(err.reason(), "missing_bearer");
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_bad_token() {
        let h = harness().await;
        let err = emit(&h.ctx, Some("Bearer not.a.token"), serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "invalid_token");
    }

    #[tokio::test]
    async fn test_producer_mismatch() {
        let h = harness().await;
        // Token belongs to another AE; envelope claims fusion_ae.
        let token = token_for(&h, "rogue_ae", &h.session.id);

        let err = emit(&h.ctx, Some(&bearer(&token)), signed_envelope(&h, "fused.track"))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "producer_mismatch");
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_policy_denied_writes_audit_and_skips_dispatch() {
        let h = harness().await;
        let token = token_for(&h, "fusion_ae", &h.session.id);

        let err = emit(&h.ctx, Some(&bearer(&token)), signed_envelope(&h, "classified.data"))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "policy_denied");

        let events = h.storage.recent_events(10).await.unwrap();
        let names: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();
        assert!(names.contains(&"emit_blocked_policy"));
        assert!(!names.contains(&"emit_received"));
    }

    #[tokio::test]
    async fn test_invalid_signature_emits_no_heartbeat() {
        let h = harness().await;
        let token = token_for(&h, "fusion_ae", &h.session.id);

        let mut body = signed_envelope(&h, "fused.track");
        body["sig"] = Value::String("cmFuZG9tLWJ5dGVz".to_string());

        let err = emit(&h.ctx, Some(&bearer(&token)), body).await.unwrap_err();
        assert_eq!(err.reason(), "invalid_signature");
        assert_eq!(err.status_code(), 400);

        assert!(h.ctx.runtime.get_live().is_empty());
        assert!(h.reflection.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revoked_key_is_not_trusted() {
        let h = harness().await;
        h.ctx.keyring.revoke(&AeId::new("fusion_ae")).await.unwrap();
        let token = token_for(&h, "fusion_ae", &h.session.id);

        let err = emit(&h.ctx, Some(&bearer(&token)), signed_envelope(&h, "fused.track"))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "not_trusted");
    }

    #[tokio::test]
    async fn test_revoked_session_rejected() {
        let h = harness().await;
        h.ctx
            .sessions
            .revoke_session(&h.session.id, "operator")
            .await
            .unwrap();
        let token = token_for(&h, "fusion_ae", &h.session.id);

        let err = emit(&h.ctx, Some(&bearer(&token)), signed_envelope(&h, "fused.track"))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "session_revoked");
    }

    #[tokio::test]
    async fn test_unknown_session_is_invalid_token() {
        let h = harness().await;
        let token = token_for(&h, "fusion_ae", &Uuid::new_v4());

        let err = emit(&h.ctx, Some(&bearer(&token)), signed_envelope(&h, "fused.track"))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "invalid_token");
    }

    #[tokio::test]
    async fn test_mesh_failure_surfaces_internal_after_recording() {
        let h = harness_with_transport(Arc::new(FailingTransport)).await;
        let token = token_for(&h, "fusion_ae", &h.session.id);

        let err = emit(&h.ctx, Some(&bearer(&token)), signed_envelope(&h, "fused.track"))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "transport_failed");
        assert_eq!(err.status_code(), 500);

        // The attempt was recorded before dispatch.
        let events = h.storage.recent_events(10).await.unwrap();
        let names: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();
        assert!(names.contains(&"emit_received"));
        assert!(!names.contains(&"emit_processed"));
    }

    #[tokio::test]
    async fn test_acceptance_biconditional_envelope_decode() {
        let h = harness().await;
        let token = token_for(&h, "fusion_ae", &h.session.id);

        let err = emit(
            &h.ctx,
            Some(&bearer(&token)),
            serde_json::json!({"producer": "fusion_ae"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
