use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use thiserror::Error;

pub mod demo;
pub mod openrouter;
pub mod webhook;

use crate::config::{UpstreamConfig, UpstreamKind};
use crate::core::entities::ChatRequest;
use crate::core::reply::UpstreamReply;

pub type ByteStream = BoxStream<'static, Result<Bytes, UpstreamError>>;

/// Where the assistant's text comes from. One implementation per upstream shape.
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, req: &ChatRequest) -> Result<UpstreamResponse, UpstreamError>;
}

pub enum UpstreamResponse {
    Streaming(ByteStream),
    Complete(UpstreamReply),
}

impl UpstreamResponse {
    pub fn mode(&self) -> &'static str {
        match self {
            UpstreamResponse::Streaming(_) => "stream",
            UpstreamResponse::Complete(_) => "single",
        }
    }

    /// A complete reply becomes a stream of exactly one chunk.
    pub fn into_stream(self) -> ByteStream {
        match self {
            UpstreamResponse::Streaming(s) => s,
            UpstreamResponse::Complete(reply) => {
                Box::pin(stream::once(async move { Ok(Bytes::from(reply.into_text())) }))
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),
    #[error("upstream unreachable: {0}")]
    Transport(String),
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("unreadable upstream reply: {0}")]
    Decode(String),
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            UpstreamError::Decode(e.to_string())
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

/// Run an upstream call under a hard deadline.
pub async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, UpstreamError>
where
    F: Future<Output = Result<T, UpstreamError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| UpstreamError::Timeout(limit))?
}

/// Turn a non-2xx response into [`UpstreamError::Status`] carrying the body text.
pub async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), %body, "upstream rejected request");
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Resolve the configured upstream once at startup. Missing credentials fall back to the demo upstream.
pub fn build_upstream(cfg: &UpstreamConfig) -> anyhow::Result<Arc<dyn UpstreamClient>> {
    let timeout = Duration::from_secs(cfg.timeout_secs);
    let client: Arc<dyn UpstreamClient> = match cfg.kind {
        UpstreamKind::Webhook => match &cfg.webhook_url {
            Some(url) => Arc::new(webhook::WebhookUpstream::new(url.clone(), timeout)?),
            None => {
                tracing::warn!("upstream.kind = webhook but no webhook_url configured, using demo upstream");
                Arc::new(demo::DemoUpstream::default())
            }
        },
        UpstreamKind::Provider => match &cfg.provider.api_key {
            Some(_) => Arc::new(openrouter::OpenRouterUpstream::new(&cfg.provider, timeout)?),
            None => {
                tracing::warn!("upstream.kind = provider but no API key configured, using demo upstream");
                Arc::new(demo::DemoUpstream::default())
            }
        },
        UpstreamKind::Demo => Arc::new(demo::DemoUpstream::default()),
    };
    tracing::info!(upstream = client.name(), "upstream resolved");
    Ok(client)
}
