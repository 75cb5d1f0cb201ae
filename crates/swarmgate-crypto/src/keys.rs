//! Key management for Swarmgate

use crate::{b64d, b64e, CryptoError, CryptoResult};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// An Ed25519 key pair. AE-side only: the broker never holds signing keys
/// outside of tests and enrollment tooling.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create from existing signing key bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get the signing key (private - never expose!)
    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Get the verifying key (public)
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Public key in the wire encoding (base64 of the raw 32 bytes)
    pub fn public_key_b64(&self) -> String {
        b64e(self.verifying_key.as_bytes())
    }

    /// Fingerprint of this key pair's public half
    pub fn fingerprint(&self) -> String {
        fingerprint_bytes(self.verifying_key.as_bytes())
    }
}

/// Parse a wire-encoded (base64) Ed25519 public key.
pub fn parse_public_key(pubkey_b64: &str) -> CryptoResult<VerifyingKey> {
    let bytes = b64d(pubkey_b64)?;

    if bytes.len() != 32 {
        return Err(CryptoError::InvalidKeyFormat(
            "public key must be 32 bytes".to_string(),
        ));
    }

    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&bytes);

    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))
}

/// Deterministic fingerprint of raw public key bytes: SHA-256, hex-encoded.
pub fn fingerprint_bytes(raw: &[u8]) -> String {
    hex::encode(Sha256::digest(raw))
}

/// Fingerprint of a wire-encoded public key.
pub fn compute_fingerprint(pubkey_b64: &str) -> CryptoResult<String> {
    let key = parse_public_key(pubkey_b64)?;
    Ok(fingerprint_bytes(key.as_bytes()))
}
