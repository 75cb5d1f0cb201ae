//! The layered policy engine and its atomic snapshot handle

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use swarmgate_types::{AeId, Capability};

use crate::fence::StaticPolicy;

/// An immutable policy snapshot: fence + capability table at build time.
///
/// `can_publish` holds iff the subject exists in the fence with a rule
/// matching the AE or one of its roles, **and** the AE has declared the
/// subject in its capability. Symmetric for subscribe. Any miss is a deny.
#[derive(Debug, Default)]
pub struct PolicyEngine {
    fence: StaticPolicy,
    capabilities: HashMap<String, Capability>,
}

impl PolicyEngine {
    /// Build a snapshot from a fence and the current capability table.
    pub fn build(fence: StaticPolicy, capabilities: Vec<Capability>) -> Self {
        let capabilities = capabilities
            .into_iter()
            .map(|c| (c.ae_id.0.clone(), c))
            .collect();
        Self { fence, capabilities }
    }

    /// Whether the subject exists in the static fence at all.
    pub fn subject_known(&self, subject: &str) -> bool {
        self.fence.knows(subject)
    }

    /// Layered publish decision.
    pub fn can_publish(&self, ae_id: &AeId, subject: &str, roles: &[String]) -> bool {
        let Some(rule) = self.fence.rule(subject) else {
            return false;
        };
        if !rule.allows_publisher(ae_id.as_str(), roles) {
            return false;
        }
        self.capabilities
            .get(ae_id.as_str())
            .map(|cap| cap.publishes.contains(subject))
            .unwrap_or(false)
    }

    /// Layered subscribe decision.
    pub fn can_subscribe(&self, ae_id: &AeId, subject: &str, roles: &[String]) -> bool {
        let Some(rule) = self.fence.rule(subject) else {
            return false;
        };
        if !rule.allows_subscriber(ae_id.as_str(), roles) {
            return false;
        }
        self.capabilities
            .get(ae_id.as_str())
            .map(|cap| cap.subscribes.contains(subject))
            .unwrap_or(false)
    }

    /// The fence this snapshot was built from.
    pub fn fence(&self) -> &StaticPolicy {
        &self.fence
    }
}

/// Atomic snapshot pointer. Readers capture the current `Arc` once per
/// request; the reloader builds a full replacement and swaps it.
pub struct PolicyHandle {
    current: RwLock<Arc<PolicyEngine>>,
}

impl PolicyHandle {
    pub fn new(engine: PolicyEngine) -> Self {
        Self {
            current: RwLock::new(Arc::new(engine)),
        }
    }

    /// Capture the current snapshot.
    pub fn current(&self) -> Arc<PolicyEngine> {
        self.current.read().clone()
    }

    /// Install a freshly built snapshot.
    pub fn swap(&self, engine: PolicyEngine) {
        *self.current.write() = Arc::new(engine);
    }
}
