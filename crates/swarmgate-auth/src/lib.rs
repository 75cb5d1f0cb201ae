//! Swarmgate Auth - continuous trust for Atomic Experts
//!
//! Three cooperating services:
//!
//! - **Admission**: cryptographic challenge/response against keyring-held
//!   Ed25519 public keys. Nonces are one-shot with a short TTL.
//! - **Tokens**: short-lived HS256 access JWTs bound to `(ae_id, session)`.
//!   Refresh tokens are *not* JWTs; they are opaque random strings owned by
//!   the session manager, persisted hash-only.
//! - **Sessions**: sliding idle windows, absolute lifetimes, refresh token
//!   rotation with a monotonic counter, terminal revoke/expire states.

pub mod admission;
pub mod config;
pub mod sessions;
pub mod tokens;

pub use admission::AdmissionService;
pub use config::{AuthConfig, JwtConfig, SessionProfile};
pub use sessions::SessionManager;
pub use tokens::{AccessClaims, TokenService};
