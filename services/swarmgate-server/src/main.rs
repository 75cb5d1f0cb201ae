//! Swarmgate Broker Service
//!
//! Trust-bounded ingress/egress broker for Atomic Experts: admission,
//! session lifecycle, the emit checkpoint, streaming egress, runtime
//! liveness, and the reflection log, wired onto one axum router.
//!
//! # Usage
//!
//! ```bash
//! # Start with environment configuration
//! ABI_JWT_SECRET=... swarmgate-server
//!
//! # Start with a config file and a durable store
//! swarmgate-server --config swarmgate.toml --storage sqlite:swarmgate.db
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use swarmgate_auth::{AdmissionService, AuthConfig, SessionManager, TokenService};
use swarmgate_broker::{BrokerContext, LocalRelayTransport};
use swarmgate_bus::EventBus;
use swarmgate_keyring::Keyring;
use swarmgate_policy::{PolicyEngine, PolicyHandle, PolicyReloader, StaticPolicy};
use swarmgate_reflect::{ReflectionSink, StorageReflectionStore};
use swarmgate_runtime::RuntimeRegistry;
use swarmgate_storage::{MemoryStorage, SqliteStorage, Storage};

use swarmgate_server::config::ServerConfig;
use swarmgate_server::routes;
use swarmgate_server::state::AppState;

/// Swarmgate Broker Service - agent publish/subscribe checkpoint
#[derive(Parser, Debug)]
#[command(name = "swarmgate-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, env = "SWARMGATE_CONFIG")]
    config: Option<String>,

    /// Address to bind to
    #[arg(long, env = "SWARMGATE_BIND")]
    bind: Option<String>,

    /// JWT signing secret
    #[arg(long, env = "ABI_JWT_SECRET")]
    jwt_secret: Option<String>,

    /// JWT algorithm (HS256, HS384, HS512)
    #[arg(long, env = "ABI_JWT_ALGO")]
    jwt_algo: Option<String>,

    /// Access token TTL in seconds
    #[arg(long, env = "ABI_JWT_TTL_SECONDS")]
    jwt_ttl_seconds: Option<u64>,

    /// Admin surface shared secret
    #[arg(long, env = "ADMIN_TOKEN")]
    admin_token: Option<String>,

    /// Static policy fence file (YAML)
    #[arg(long, env = "ABI_POLICY_FILE")]
    policy_file: Option<String>,

    /// Storage selector: `memory` or an SQLite URL
    #[arg(long, env = "ABI_STORAGE")]
    storage: Option<String>,

    /// Seconds of silence before live -> stale
    #[arg(long, env = "ABI_STALE_AFTER_SECS")]
    stale_after_secs: Option<u64>,

    /// Seconds of silence before -> dead
    #[arg(long, env = "ABI_DEAD_AFTER_SECS")]
    dead_after_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SWARMGATE_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut cfg = ServerConfig::load(args.config.as_deref())?;
    apply_overrides(&mut cfg, args);
    init_logging(&cfg);
    cfg.validate()?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting swarmgate broker");

    let storage = init_storage(&cfg).await?;
    let (ctx, reloader) = build_context(&cfg, storage).await?;
    let ctx = Arc::new(ctx);

    // Background tasks: policy hot-reload and the runtime sweeper. Both
    // ignore request-scoped cancellation and end with the process.
    tokio::spawn(reloader.run());
    tokio::spawn({
        let ctx = ctx.clone();
        let interval = Duration::from_secs(cfg.sweep_interval_secs);
        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                ctx.sweep_and_publish().await;
            }
        }
    });

    let state = AppState::new(ctx, Duration::from_secs(cfg.keepalive_secs));
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind).await?;
    tracing::info!(bind = %cfg.bind, "broker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("broker stopped");
    Ok(())
}

fn apply_overrides(cfg: &mut ServerConfig, args: Args) {
    if let Some(bind) = args.bind {
        cfg.bind = bind;
    }
    if let Some(secret) = args.jwt_secret {
        cfg.jwt_secret = secret;
    }
    if let Some(algo) = args.jwt_algo {
        cfg.jwt_algo = algo;
    }
    if let Some(ttl) = args.jwt_ttl_seconds {
        cfg.jwt_ttl_seconds = ttl;
    }
    if let Some(token) = args.admin_token {
        cfg.admin_token = Some(token);
    }
    if let Some(path) = args.policy_file {
        cfg.policy_file = Some(path);
    }
    if let Some(storage) = args.storage {
        cfg.storage = storage;
    }
    if let Some(secs) = args.stale_after_secs {
        cfg.stale_after_secs = secs;
    }
    if let Some(secs) = args.dead_after_secs {
        cfg.dead_after_secs = secs;
    }
    if let Some(level) = args.log_level {
        cfg.log_level = level;
    }
}

fn init_logging(cfg: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone()));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

async fn init_storage(cfg: &ServerConfig) -> anyhow::Result<Arc<dyn Storage>> {
    if cfg.storage == "memory" {
        tracing::info!("using in-memory storage");
        Ok(Arc::new(MemoryStorage::new()))
    } else {
        tracing::info!(url = %cfg.storage, "using sqlite storage");
        Ok(Arc::new(SqliteStorage::connect(&cfg.storage).await?))
    }
}

async fn build_context(
    cfg: &ServerConfig,
    storage: Arc<dyn Storage>,
) -> anyhow::Result<(BrokerContext, PolicyReloader)> {
    // Keyring, warmed from storage.
    let keyring = Arc::new(Keyring::new(storage.clone()));
    keyring.load().await?;

    // Static fence + current capability table -> first policy snapshot.
    let fence = match cfg.policy_file.as_deref() {
        Some(path) => match StaticPolicy::load(path) {
            Ok(fence) => {
                tracing::info!(path, subjects = fence.subjects.len(), "fence loaded");
                fence
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "fence unavailable, starting closed");
                StaticPolicy::default()
            }
        },
        None => {
            tracing::warn!("no policy file configured, starting closed");
            StaticPolicy::default()
        }
    };
    let capabilities = storage.list_capabilities().await?;
    let policy = Arc::new(PolicyHandle::new(PolicyEngine::build(
        fence.clone(),
        capabilities,
    )));

    let reloader = PolicyReloader::new(
        cfg.policy_file.as_deref().map(Into::into),
        fence,
        storage.clone(),
        policy.clone(),
        Duration::from_secs(cfg.policy_reload_secs),
    );

    // Auth stack.
    let mut auth_config = AuthConfig::default();
    auth_config.jwt.secret = cfg.jwt_secret.clone();
    auth_config.jwt.algorithm = cfg.jwt_algo.clone();
    auth_config.jwt.access_ttl = Duration::from_secs(cfg.jwt_ttl_seconds);
    let tokens = Arc::new(TokenService::new(&auth_config.jwt).map_err(|e| anyhow::anyhow!("{e}"))?);
    let sessions = Arc::new(SessionManager::new(storage.clone()));
    let admission = Arc::new(AdmissionService::new(keyring.clone()));

    // Runtime registry + bus + reflection sink.
    let runtime = Arc::new(RuntimeRegistry::new(
        Duration::from_secs(cfg.stale_after_secs),
        Duration::from_secs(cfg.dead_after_secs),
    ));
    let bus = Arc::new(EventBus::default());
    let reflection = Arc::new(StorageReflectionStore::new(storage.clone()));
    ReflectionSink::new(reflection.clone()).attach(&bus);

    let ctx = BrokerContext {
        keyring,
        policy,
        sessions,
        admission,
        tokens,
        runtime,
        reflection,
        bus,
        transport: Arc::new(LocalRelayTransport),
        storage,
        auth_config,
        admin_token: cfg.admin_token.clone(),
    };
    Ok((ctx, reloader))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
