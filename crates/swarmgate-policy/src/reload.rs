//! Background policy reloader
//!
//! Polls the fence file's mtime and the capability-table snapshot; when
//! either changes, builds a complete new engine and swaps it into the
//! handle. The swap is atomic; in-flight decisions keep the snapshot they
//! captured.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use swarmgate_storage::Storage;
use swarmgate_types::Capability;

use crate::{PolicyEngine, PolicyHandle, StaticPolicy};

/// Capability snapshot used for change detection.
type CapsSnapshot = Vec<(String, Vec<String>, Vec<String>, i64)>;

/// The reloader task state.
pub struct PolicyReloader {
    fence_path: Option<PathBuf>,
    storage: Arc<dyn Storage>,
    handle: Arc<PolicyHandle>,
    interval: Duration,
    last_mtime: Option<SystemTime>,
    last_caps: CapsSnapshot,
    last_fence: StaticPolicy,
}

impl PolicyReloader {
    /// Create a reloader seeded with the fence the handle was built from.
    pub fn new(
        fence_path: Option<PathBuf>,
        initial_fence: StaticPolicy,
        storage: Arc<dyn Storage>,
        handle: Arc<PolicyHandle>,
        interval: Duration,
    ) -> Self {
        let last_mtime = fence_path
            .as_deref()
            .and_then(|p| std::fs::metadata(p).ok())
            .and_then(|m| m.modified().ok());

        Self {
            fence_path,
            storage,
            handle,
            interval,
            last_mtime,
            last_caps: Vec::new(),
            last_fence: initial_fence,
        }
    }

    /// Run forever. Spawned as a background task; terminates only with the
    /// broker process.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once().await {
                tracing::error!(error = %e, "policy reload failed");
            }
        }
    }

    /// One poll: rebuild + swap if the fence or capability table changed.
    /// Returns whether a swap happened.
    pub async fn poll_once(&mut self) -> Result<bool, swarmgate_storage::StorageError> {
        let mut changed = false;

        if let Some(path) = self.fence_path.as_deref() {
            let mtime = std::fs::metadata(path).ok().and_then(|m| m.modified().ok());
            if mtime != self.last_mtime {
                match StaticPolicy::load(path) {
                    Ok(fence) => {
                        self.last_fence = fence;
                        self.last_mtime = mtime;
                        changed = true;
                        tracing::info!(path = %path.display(), "fence file reloaded");
                    }
                    Err(e) => {
                        // Keep serving the previous fence on a bad edit.
                        tracing::error!(path = %path.display(), error = %e, "fence reload failed");
                        self.last_mtime = mtime;
                    }
                }
            }
        }

        let capabilities = self.storage.list_capabilities().await?;
        let snapshot = caps_snapshot(&capabilities);
        if snapshot != self.last_caps {
            self.last_caps = snapshot;
            changed = true;
        }

        if changed {
            self.handle
                .swap(PolicyEngine::build(self.last_fence.clone(), capabilities));
            tracing::info!("policy engine rebuilt");
        }
        Ok(changed)
    }
}

fn caps_snapshot(capabilities: &[Capability]) -> CapsSnapshot {
    let mut snapshot: CapsSnapshot = capabilities.iter().map(|c| c.snapshot_key()).collect();
    snapshot.sort();
    snapshot
}
