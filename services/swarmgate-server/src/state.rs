//! Application state shared across handlers

use std::sync::Arc;
use std::time::Duration;

use swarmgate_broker::BrokerContext;

/// Shared handler state: the broker context plus a few transport knobs.
#[derive(Clone)]
pub struct AppState {
    /// The broker itself
    pub ctx: Arc<BrokerContext>,
    /// SSE keepalive interval
    pub keepalive: Duration,
}

impl AppState {
    pub fn new(ctx: Arc<BrokerContext>, keepalive: Duration) -> Self {
        Self { ctx, keepalive }
    }
}
