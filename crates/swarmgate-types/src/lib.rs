//! Swarmgate Types - Canonical domain types for the agent broker
//!
//! This crate contains all foundational types for Swarmgate with zero
//! dependencies on other swarmgate crates. It defines the type system for:
//!
//! - Identity types (`AeId`, `Subject`)
//! - Keyring records and capability declarations
//! - Sessions and refresh tokens
//! - The signed envelope wire format
//! - Runtime liveness records and transitions
//! - Reflection records (append-only semantic memory)
//! - The broker error taxonomy with its closed reason vocabulary
//!
//! # Architectural Invariants
//!
//! 1. Every AE-to-mesh event passes through the broker checkpoint
//! 2. Refresh tokens are stored hash-only; the raw value is returned once
//! 3. An AE occupies exactly one runtime partition at any instant
//! 4. Reflection records are immutable after append

pub mod envelope;
pub mod error;
pub mod identity;
pub mod keyring;
pub mod reflection;
pub mod runtime;
pub mod session;

pub use envelope::*;
pub use error::*;
pub use identity::*;
pub use keyring::*;
pub use reflection::*;
pub use runtime::*;
pub use session::*;

/// Version of the Swarmgate types schema
pub const TYPES_VERSION: &str = "0.1.0";
