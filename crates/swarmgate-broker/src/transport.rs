//! Mesh transport port
//!
//! The downstream mesh is an opaque `publish(subject, bytes)` sink and the
//! sole trust-boundary crossing: AEs never dispatch to it directly. The
//! broker hands off once and records; mesh-level delivery guarantees are out
//! of scope.

use async_trait::async_trait;
use thiserror::Error;

/// Transport dispatch errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("mesh dispatch failed: {0}")]
    Dispatch(String),
}

/// The outbound mesh port.
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// Adapter name for logs and audit entries.
    fn name(&self) -> &'static str;

    /// Hand one envelope off to the mesh.
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), TransportError>;
}

/// Local relay: logs the dispatch instead of crossing a network. Default
/// adapter for development and tests.
#[derive(Default)]
pub struct LocalRelayTransport;

#[async_trait]
impl MeshTransport for LocalRelayTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), TransportError> {
        let preview: String = String::from_utf8_lossy(payload).chars().take(120).collect();
        tracing::info!(subject, payload = %preview, "local dispatch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_relay_accepts_everything() {
        let transport = LocalRelayTransport;
        assert_eq!(transport.name(), "local");
        transport
            .publish("fused.track", br#"{"payload": 1}"#)
            .await
            .unwrap();
    }
}
