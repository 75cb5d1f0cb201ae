//! Access token service
//!
//! Short-lived HS256 JWTs bound to a specific AE + session. Verification is
//! strict: zero leeway, so token clock skew is not compensated.

use std::str::FromStr;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use swarmgate_types::{AeId, BrokerError, BrokerResult};

use crate::config::JwtConfig;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// AE identifier
    pub sub: String,
    /// Session UUID
    pub sid: String,
    /// Roles granted at verify time
    pub roles: Vec<String>,
    /// Issued-at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

impl AccessClaims {
    /// Parse the session claim.
    pub fn session_id(&self) -> BrokerResult<Uuid> {
        Uuid::parse_str(&self.sid).map_err(|_| BrokerError::InvalidToken)
    }

    /// The subject as an `AeId`.
    pub fn ae_id(&self) -> AeId {
        AeId::new(self.sub.clone())
    }
}

/// JWT service for access tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_ttl_secs: i64,
}

impl TokenService {
    /// Create a new token service from configuration.
    pub fn new(config: &JwtConfig) -> BrokerResult<Self> {
        let algorithm = Algorithm::from_str(&config.algorithm)
            .map_err(|_| BrokerError::Internal(format!("unknown JWT algorithm '{}'", config.algorithm)))?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(BrokerError::Internal(
                "access tokens require an HMAC algorithm".to_string(),
            ));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            algorithm,
            access_ttl_secs: config.access_ttl.as_secs() as i64,
        })
    }

    /// Access token TTL in seconds (the `expires_in` of grant responses).
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    /// Issue a short-lived access JWT bound to `(ae_id, session)`.
    pub fn issue_access_token(
        &self,
        ae_id: &AeId,
        session_id: &Uuid,
        roles: &[String],
    ) -> BrokerResult<String> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: ae_id.0.clone(),
            sid: session_id.to_string(),
            roles: roles.to_vec(),
            iat: now,
            exp: now + self.access_ttl_secs,
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| BrokerError::Internal(format!("failed to encode access token: {e}")))
    }

    /// Decode and validate an access token.
    pub fn verify_access_token(&self, token: &str) -> BrokerResult<AccessClaims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        match decode::<AccessClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(BrokerError::TokenExpired),
                _ => Err(BrokerError::InvalidToken),
            },
        }
    }
}
