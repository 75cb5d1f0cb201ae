//! Swarmgate Crypto - Ed25519 primitives for admission and envelope signing
//!
//! Everything identity-shaped in the broker reduces to three operations:
//! generating/parsing Ed25519 keys, fingerprinting public keys, and
//! verifying detached signatures over canonical bytes. Private keys only
//! exist on the AE side and in tests; the broker itself holds public keys.

pub mod keys;
pub mod signature;

pub use keys::*;
pub use signature::*;

use thiserror::Error;

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Crypto error types
#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    /// Key bytes malformed or wrong length
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Signature bytes malformed or wrong length
    #[error("Invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    /// Signing operation failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

/// Base64-encode bytes (standard alphabet, padded) for the wire.
pub fn b64e(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode wire base64.
pub fn b64d(s: &str) -> CryptoResult<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s.trim())
        .map_err(|e| CryptoError::InvalidSignatureFormat(e.to_string()))
}
