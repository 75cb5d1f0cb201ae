//! Detached Ed25519 signatures over canonical bytes
//!
//! Verification is strict: the signature must cover exactly the canonical
//! bytes, with no trailing-byte tolerance. A structurally invalid signature
//! (wrong length, bad base64) verifies as `false` rather than erroring, so
//! callers can treat every mismatch uniformly.

use crate::{b64d, b64e, parse_public_key, CryptoError, CryptoResult, KeyPair};
use ed25519_dalek::{Signature as Ed25519Signature, Signer, Verifier, VerifyingKey};

use swarmgate_types::Envelope;

/// Sign a message, returning the wire encoding (base64 of 64 raw bytes).
pub fn sign_b64(keypair: &KeyPair, message: &[u8]) -> CryptoResult<String> {
    let signature = keypair
        .signing_key()
        .try_sign(message)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    Ok(b64e(&signature.to_bytes()))
}

/// Verify a detached wire-encoded signature with an already-parsed key.
pub fn verify_b64(key: &VerifyingKey, message: &[u8], sig_b64: &str) -> bool {
    let Ok(sig_bytes) = b64d(sig_b64) else {
        return false;
    };
    let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };

    let signature = Ed25519Signature::from_bytes(&sig_array);
    key.verify(message, &signature).is_ok()
}

/// Verify a detached signature against a wire-encoded public key.
pub fn verify_with_b64_key(pubkey_b64: &str, message: &[u8], sig_b64: &str) -> bool {
    match parse_public_key(pubkey_b64) {
        Ok(key) => verify_b64(&key, message, sig_b64),
        Err(_) => false,
    }
}

/// Sign an envelope in place: computes the canonical signing bytes and sets
/// `sig`. AE-side helper; the broker only verifies.
pub fn sign_envelope(keypair: &KeyPair, envelope: &mut Envelope) -> CryptoResult<()> {
    let sig = sign_b64(keypair, &envelope.to_signing_bytes())?;
    envelope.sig = Some(sig);
    Ok(())
}

/// Verify an envelope signature against a wire-encoded public key.
pub fn verify_envelope(pubkey_b64: &str, envelope: &Envelope) -> bool {
    let Some(sig) = envelope.sig.as_deref() else {
        return false;
    };
    verify_with_b64_key(pubkey_b64, &envelope.to_signing_bytes(), sig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmgate_types::Envelope;

    fn sample_envelope(keypair: &KeyPair) -> Envelope {
        Envelope::make(
            "fusion_ae",
            "fused.track",
            serde_json::json!({"lat": 38.7, "lon": -104.7}),
            vec!["CUI".to_string()],
            keypair.fingerprint(),
        )
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::generate();
        let message = b"challenge-nonce-bytes";

        let sig = sign_b64(&keypair, message).unwrap();
        assert!(verify_b64(keypair.verifying_key(), message, &sig));
    }

    #[test]
    fn test_wrong_message_fails() {
        let keypair = KeyPair::generate();
        let sig = sign_b64(&keypair, b"original").unwrap();
        assert!(!verify_b64(keypair.verifying_key(), b"tampered", &sig));
    }

    #[test]
    fn test_wrong_key_fails() {
        let keypair1 = KeyPair::generate();
        let keypair2 = KeyPair::generate();
        let sig = sign_b64(&keypair1, b"message").unwrap();
        assert!(!verify_b64(keypair2.verifying_key(), b"message", &sig));
    }

    #[test]
    fn test_garbage_signature_is_false_not_error() {
        let keypair = KeyPair::generate();
        assert!(!verify_b64(keypair.verifying_key(), b"message", "not-base64!!"));
        assert!(!verify_b64(keypair.verifying_key(), b"message", &b64e(b"too-short")));
    }

    #[test]
    fn test_envelope_roundtrip() {
        let keypair = KeyPair::generate();
        let mut env = sample_envelope(&keypair);

        sign_envelope(&keypair, &mut env).unwrap();
        assert!(verify_envelope(&keypair.public_key_b64(), &env));

        // Payload tamper invalidates the signature.
        env.payload = serde_json::json!({"lat": 0.0});
        assert!(!verify_envelope(&keypair.public_key_b64(), &env));
    }

    #[test]
    fn test_unsigned_envelope_fails() {
        let keypair = KeyPair::generate();
        let env = sample_envelope(&keypair);
        assert!(!verify_envelope(&keypair.public_key_b64(), &env));
    }
}
