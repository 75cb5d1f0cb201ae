//! Swarmgate Policy - layered publish/subscribe authorization
//!
//! Two layers, evaluated in order:
//!
//! 1. **Static subject fence**: the closed set of subjects an operator has
//!    declared to exist, each with allowed publisher/subscriber rules
//!    matching `ae_id`s or roles.
//! 2. **Dynamic capabilities**: per-AE declarations that narrow, never
//!    widen, what the fence allows.
//!
//! The engine is an immutable snapshot; a background reloader rebuilds it on
//! fence-file or capability-table changes and swaps it atomically. In-flight
//! decisions keep whichever snapshot they captured.

pub mod engine;
pub mod fence;
pub mod reload;

pub use engine::{PolicyEngine, PolicyHandle};
pub use fence::{StaticPolicy, SubjectRule};
pub use reload::PolicyReloader;

use thiserror::Error;

/// Policy layer errors (fence loading / parsing)
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse policy file: {0}")]
    Parse(#[from] serde_yaml::Error),
}
