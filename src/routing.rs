use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::api;
use crate::config::RelayConfig;
use crate::connectors::{self, UpstreamClient};
use crate::metrics;
use crate::relay::Relay;
use crate::tools::{N8nTools, ToolRunner, ToolTrigger};

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub tools: Arc<dyn ToolRunner>,
}

impl AppState {
    pub fn new(upstream: Arc<dyn UpstreamClient>, tools: Arc<dyn ToolRunner>, trigger: ToolTrigger) -> Self {
        Self {
            relay: Arc::new(Relay::new(upstream, Arc::clone(&tools), trigger)),
            tools,
        }
    }

    pub fn from_config(cfg: &RelayConfig) -> anyhow::Result<Self> {
        let upstream = connectors::build_upstream(&cfg.upstream)?;
        let tools: Arc<dyn ToolRunner> = Arc::new(N8nTools::new(&cfg.tools)?);
        Ok(Self::new(upstream, tools, ToolTrigger::from_config(&cfg.tools)))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat-relay", post(api::chat::chat_relay))
        .route("/tool-status", get(api::tools::tool_status))
        .route("/tool-invoke", post(api::tools::tool_invoke))
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
