use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::connectors::{ByteStream, UpstreamClient, UpstreamError};
use crate::core::entities::{timestamp_now, ChatRequest, InvocationStatus, ToolInvocation};
use crate::metrics::{TOOL_CALLS_TOTAL, UPSTREAM_DURATION};
use crate::parser::markers::encode_tool_call;
use crate::tools::{ToolRunner, ToolTrigger};

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Forwards one chat request to the configured upstream and hands back the body to stream.
pub struct Relay {
    upstream: Arc<dyn UpstreamClient>,
    tools: Arc<dyn ToolRunner>,
    trigger: ToolTrigger,
}

impl Relay {
    pub fn new(upstream: Arc<dyn UpstreamClient>, tools: Arc<dyn ToolRunner>, trigger: ToolTrigger) -> Self {
        Self {
            upstream,
            tools,
            trigger,
        }
    }

    pub fn upstream_name(&self) -> &'static str {
        self.upstream.name()
    }

    /// Validation and the upstream call happen before any byte is returned, so their
    /// failures are plain errors. Failures after that point travel in-band.
    pub async fn relay(&self, req: ChatRequest) -> Result<ByteStream, RelayError> {
        if !req.has_content() {
            return Err(RelayError::InvalidRequest("Message or images required".into()));
        }

        let started = Instant::now();
        let response = self.upstream.send(&req).await;
        let mode = response.as_ref().map(|r| r.mode()).unwrap_or("failed");
        UPSTREAM_DURATION
            .with_label_values(&[self.upstream.name(), mode])
            .observe(started.elapsed().as_secs_f64());
        let body = response?.into_stream();

        match self.trigger.tool_for(&req) {
            Some(tool) => {
                tracing::info!(tool, "tool mode request triggers side channel");
                Ok(side_channel(Arc::clone(&self.tools), tool.to_string(), &req)
                    .chain(body)
                    .boxed())
            }
            None => Ok(body),
        }
    }
}

/// Announce the call, run it, then report its outcome. The announcement is always first.
fn side_channel(tools: Arc<dyn ToolRunner>, tool: String, req: &ChatRequest) -> ByteStream {
    let mut args = Map::new();
    args.insert("message".into(), json!(req.message));
    args.insert("timestamp".into(), json!(timestamp_now()));

    let announce = encode_tool_call(&ToolInvocation::pending(tool.clone(), args.clone()));
    let outcome = async move {
        let mut call = ToolInvocation::pending(tool.clone(), args.clone());
        match tools.invoke(&tool, Value::Object(args), false).await {
            Ok(result) => {
                call.status = InvocationStatus::Success;
                call.result = Some(result);
            }
            Err(e) => {
                tracing::warn!(tool = %tool, error = %e, "side-channel tool failed");
                call.status = InvocationStatus::Error;
                call.result = Some(json!({ "error": e.to_string() }));
            }
        }
        TOOL_CALLS_TOTAL
            .with_label_values(&[tool.as_str(), call.status.as_str()])
            .inc();
        Ok(Bytes::from(format!("{}\n\n", encode_tool_call(&call))))
    };

    stream::once(async move { Ok(Bytes::from(announce)) })
        .chain(stream::once(outcome))
        .boxed()
}
