//! The static subject fence
//!
//! Loaded from a declarative YAML file:
//!
//! ```yaml
//! subjects:
//!   fused.track:
//!     publishers: [fusion_ae, producer]
//!     subscribers: [dashboard, subscriber]
//!     labels: [CUI]
//! ```
//!
//! Subjects absent from the fence do not exist: they are rejected at
//! capability declaration and at publish/subscribe time alike.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::PolicyError;

/// Per-subject rule. Entries in `publishers`/`subscribers` match either an
/// `ae_id` or a role name; `"*"` matches anyone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectRule {
    #[serde(default)]
    pub publishers: Vec<String>,
    #[serde(default)]
    pub subscribers: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl SubjectRule {
    fn matches(entries: &[String], ae_id: &str, roles: &[String]) -> bool {
        entries.iter().any(|entry| {
            entry == "*" || entry == ae_id || roles.iter().any(|role| role == entry)
        })
    }

    /// Whether the fence allows this AE (or one of its roles) to publish.
    pub fn allows_publisher(&self, ae_id: &str, roles: &[String]) -> bool {
        Self::matches(&self.publishers, ae_id, roles)
    }

    /// Whether the fence allows this AE (or one of its roles) to subscribe.
    pub fn allows_subscriber(&self, ae_id: &str, roles: &[String]) -> bool {
        Self::matches(&self.subscribers, ae_id, roles)
    }
}

/// The full fence: subject name -> rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticPolicy {
    #[serde(default)]
    pub subjects: BTreeMap<String, SubjectRule>,
}

impl StaticPolicy {
    /// Parse from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, PolicyError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load from a fence file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Whether a subject exists at all.
    pub fn knows(&self, subject: &str) -> bool {
        self.subjects.contains_key(subject)
    }

    /// Rule for one subject.
    pub fn rule(&self, subject: &str) -> Option<&SubjectRule> {
        self.subjects.get(subject)
    }
}
