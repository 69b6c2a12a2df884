#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use bytes::Bytes;
use futures_util::stream;
use serde_json::Value;

use gwen_relay::config::ToolsConfig;
use gwen_relay::connectors::webhook::WebhookUpstream;
use gwen_relay::connectors::{UpstreamClient, UpstreamError, UpstreamResponse};
use gwen_relay::core::entities::ChatRequest;
use gwen_relay::core::reply::UpstreamReply;
use gwen_relay::routing::{self, AppState};
use gwen_relay::tools::{N8nTools, ToolError, ToolRunner, ToolStatusReport, ToolTrigger};

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Upstream that replays a fixed script and counts calls.
pub struct ScriptedUpstream {
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<ChatRequest>>,
    script: Script,
}

#[derive(Clone)]
pub enum Script {
    Reply(String),
    Chunks(Vec<Result<&'static str, &'static str>>),
    Fail { status: u16, body: &'static str },
}

impl ScriptedUpstream {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            script,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl UpstreamClient for ScriptedUpstream {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn send(&self, req: &ChatRequest) -> Result<UpstreamResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(req.clone());
        match &self.script {
            Script::Reply(text) => Ok(UpstreamResponse::Complete(UpstreamReply::Output(text.clone()))),
            Script::Chunks(chunks) => {
                let items: Vec<Result<Bytes, UpstreamError>> = chunks
                    .iter()
                    .map(|c| match c {
                        Ok(text) => Ok(Bytes::from_static(text.as_bytes())),
                        Err(msg) => Err(UpstreamError::Stream(msg.to_string())),
                    })
                    .collect();
                Ok(UpstreamResponse::Streaming(Box::pin(stream::iter(items))))
            }
            Script::Fail { status, body } => Err(UpstreamError::Status {
                status: *status,
                body: body.to_string(),
            }),
        }
    }
}

/// Tool backend that answers every call with `reply`.
pub struct FakeTools {
    pub calls: Mutex<Vec<(String, Value, bool)>>,
    reply: Result<Value, &'static str>,
}

impl FakeTools {
    pub fn ok(reply: Value) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: Ok(reply),
        })
    }

    pub fn failing(msg: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: Err(msg),
        })
    }
}

#[async_trait::async_trait]
impl ToolRunner for FakeTools {
    async fn status(&self) -> ToolStatusReport {
        ToolStatusReport {
            connected: true,
            ..ToolStatusReport::default()
        }
    }

    async fn invoke(&self, tool: &str, params: Value, use_mcp_test: bool) -> Result<Value, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((tool.to_string(), params, use_mcp_test));
        self.reply.clone().map_err(|msg| {
            ToolError::Upstream(UpstreamError::Status {
                status: 500,
                body: msg.to_string(),
            })
        })
    }
}

pub fn app(upstream: Arc<dyn UpstreamClient>, tools: Arc<dyn ToolRunner>) -> Router {
    let trigger = ToolTrigger::from_config(&ToolsConfig::default());
    routing::router(AppState::new(upstream, tools, trigger))
}

/// Relay in front of a webhook served at `{base}/hook`, with no tool backend configured.
pub fn webhook_app(base: &str) -> Router {
    webhook_app_with_timeout(base, Duration::from_secs(5))
}

pub fn webhook_app_with_timeout(base: &str, timeout: Duration) -> Router {
    let upstream = WebhookUpstream::new(format!("{base}/hook"), timeout).unwrap();
    let tools = N8nTools::new(&ToolsConfig::default()).unwrap();
    app(Arc::new(upstream), Arc::new(tools))
}
