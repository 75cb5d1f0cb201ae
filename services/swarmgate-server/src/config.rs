//! Server configuration
//!
//! Layered the usual way: built-in defaults, then an optional TOML file,
//! then environment variables / CLI flags (applied in `main`). The
//! recognized environment options are the broker's public configuration
//! contract (`ABI_JWT_SECRET`, `ABI_JWT_ALGO`, `ABI_JWT_TTL_SECONDS`,
//! `ADMIN_TOKEN`, storage selector, sweeper thresholds).

use serde::Deserialize;

/// Full server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. `0.0.0.0:8088`
    pub bind: String,
    /// JWT signing secret (required)
    pub jwt_secret: String,
    /// JWT algorithm (HS256, HS384, HS512)
    pub jwt_algo: String,
    /// Access token TTL in seconds
    pub jwt_ttl_seconds: u64,
    /// Shared secret for the `/admin` surface
    #[serde(default)]
    pub admin_token: Option<String>,
    /// Path to the static policy fence (YAML)
    #[serde(default)]
    pub policy_file: Option<String>,
    /// Storage selector: `memory` or an SQLx SQLite URL
    pub storage: String,
    /// Sweeper: seconds of silence before live -> stale
    pub stale_after_secs: u64,
    /// Sweeper: seconds of silence before -> dead
    pub dead_after_secs: u64,
    /// Sweeper cadence in seconds
    pub sweep_interval_secs: u64,
    /// Policy reloader poll cadence in seconds
    pub policy_reload_secs: u64,
    /// SSE keepalive interval in seconds
    pub keepalive_secs: u64,
    /// Log level filter
    pub log_level: String,
}

impl ServerConfig {
    /// Load defaults, optionally overlaid with a TOML file.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("bind", "0.0.0.0:8088")?
            .set_default("jwt_secret", "")?
            .set_default("jwt_algo", "HS256")?
            .set_default("jwt_ttl_seconds", 300i64)?
            .set_default("storage", "memory")?
            .set_default("stale_after_secs", 30i64)?
            .set_default("dead_after_secs", 120i64)?
            .set_default("sweep_interval_secs", 5i64)?
            .set_default("policy_reload_secs", 2i64)?
            .set_default("keepalive_secs", 10i64)?
            .set_default("log_level", "info")?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Reject configurations the broker cannot safely start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt_secret.is_empty() {
            anyhow::bail!("ABI_JWT_SECRET must be set");
        }
        if self.jwt_secret.len() < 32 {
            anyhow::bail!("ABI_JWT_SECRET should be at least 256 bits (32 bytes)");
        }
        if self.stale_after_secs >= self.dead_after_secs {
            anyhow::bail!("stale_after_secs must be below dead_after_secs");
        }
        Ok(())
    }
}
