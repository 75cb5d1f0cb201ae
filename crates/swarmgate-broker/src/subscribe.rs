//! The subscribe gate
//!
//! A streaming subscription passes the same trust checks as a publish -
//! token, keyring trust, policy - then receives a fresh queue registered on
//! the local bus. The transport-level stream (SSE) is wired by the server;
//! this gate only decides and allocates.

use serde_json::Value;
use tokio::sync::broadcast;

use swarmgate_runtime::Heartbeat;
use swarmgate_types::{ActivitySource, AeId, BrokerError, BrokerResult};

use crate::context::BrokerContext;

/// An authorized subscription: identity plus the registered queue.
#[derive(Debug)]
pub struct SubscribeGrant {
    pub ae_id: AeId,
    pub session_id: Option<String>,
    pub topic: String,
    pub receiver: broadcast::Receiver<Value>,
}

/// Gate one subscribe request. On success the returned receiver is already
/// registered for the topic; dropping it deregisters cleanly.
pub async fn authorize_subscribe(
    ctx: &BrokerContext,
    authorization: Option<&str>,
    topic: &str,
) -> BrokerResult<SubscribeGrant> {
    // Token verify.
    let claims = ctx.authenticate(authorization)?;
    let ae_id = claims.ae_id();

    // Keyring + trust check.
    let record = ctx
        .keyring
        .get_by_aeid(&ae_id)
        .ok_or_else(|| BrokerError::NotTrusted(ae_id.to_string()))?;
    if !record.is_trusted() {
        return Err(BrokerError::NotTrusted(ae_id.to_string()));
    }

    // Policy: fence + declared capability.
    let effective_roles = if record.roles.is_empty() {
        claims.roles.clone()
    } else {
        record.roles.clone()
    };
    if !ctx.policy.current().can_subscribe(&ae_id, topic, &effective_roles) {
        return Err(BrokerError::PolicyDenied {
            action: "subscribe",
            subject: topic.to_string(),
        });
    }

    // Liveness heartbeat for the subscriber.
    ctx.heartbeat(
        Heartbeat::new(ae_id.clone(), ActivitySource::Subscribe)
            .with_session(claims.sid.clone())
            .with_intent("subscribe")
            .with_subject(topic),
    )
    .await;

    let receiver = ctx.bus.subscribe_queue(topic);
    tracing::info!(ae_id = %ae_id, topic, "subscriber registered");

    Ok(SubscribeGrant {
        ae_id,
        session_id: Some(claims.sid),
        topic: topic.to_string(),
        receiver,
    })
}
