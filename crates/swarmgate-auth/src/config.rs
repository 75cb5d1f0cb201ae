//! Authentication configuration
//!
//! Session profiles are named presets; `default` and `long_lived` always
//! exist. Durations deserialize from humantime strings (`24h`, `10m`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Main authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Access JWT configuration
    pub jwt: JwtConfig,
    /// Named session presets
    pub profiles: BTreeMap<String, SessionProfile>,
}

/// Access JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HMAC secret (must be set in production; at least 256 bits)
    pub secret: String,
    /// Algorithm (HS256, HS384, HS512)
    pub algorithm: String,
    /// Access token lifetime
    #[serde(with = "humantime_serde")]
    pub access_ttl: Duration,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            algorithm: "HS256".to_string(),
            access_ttl: Duration::from_secs(300),
        }
    }
}

/// One named session preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProfile {
    /// Absolute session lifetime
    #[serde(with = "humantime_serde")]
    pub session_lifetime: Duration,
    /// Refresh token lifetime
    #[serde(with = "humantime_serde")]
    pub refresh_lifetime: Duration,
    /// Access token TTL granted under this profile
    #[serde(with = "humantime_serde")]
    pub access_ttl: Duration,
    /// Sliding idle window
    #[serde(with = "humantime_serde")]
    pub max_idle: Duration,
}

impl AuthConfig {
    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Option<&SessionProfile> {
        self.profiles.get(name)
    }

    /// The `default` profile (always present).
    pub fn default_profile(&self) -> &SessionProfile {
        self.profiles
            .get("default")
            .expect("default session profile always exists")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.jwt.secret.is_empty() {
            errors.push("JWT secret must be set".to_string());
        } else if self.jwt.secret.len() < 32 {
            errors.push("JWT secret should be at least 256 bits (32 bytes)".to_string());
        }
        if !self.profiles.contains_key("default") {
            errors.push("'default' session profile must exist".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "default".to_string(),
            SessionProfile {
                session_lifetime: Duration::from_secs(24 * 60 * 60), // 24 hours
                refresh_lifetime: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
                access_ttl: Duration::from_secs(300),
                max_idle: Duration::from_secs(10 * 60), // 10 minutes
            },
        );
        profiles.insert(
            "long_lived".to_string(),
            SessionProfile {
                session_lifetime: Duration::from_secs(30 * 24 * 60 * 60), // 30 days
                refresh_lifetime: Duration::from_secs(30 * 24 * 60 * 60),
                access_ttl: Duration::from_secs(300),
                max_idle: Duration::from_secs(24 * 60 * 60), // 24 hours
            },
        );

        Self {
            jwt: JwtConfig::default(),
            profiles,
        }
    }
}
