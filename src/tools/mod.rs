use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub mod trigger;

pub use trigger::ToolTrigger;

use crate::config::ToolsConfig;
use crate::connectors::{ensure_success, with_deadline, UpstreamError};
use crate::core::entities::{timestamp_now, ToolDescriptor};

pub const MCP_TEST_TOOL: &str = "mcp-test";
const API_KEY_HEADER: &str = "X-N8N-API-KEY";

/// Body of `GET /tool-status`. Never an HTTP error: an unreachable backend is `connected: false`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStatusReport {
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_test_endpoint: Option<String>,
    #[serde(default)]
    pub mcp_test_available: bool,
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool backend not configured: {0}")]
    NotConfigured(&'static str),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Workflow-automation backend reachable from the relay.
#[async_trait::async_trait]
pub trait ToolRunner: Send + Sync {
    async fn status(&self) -> ToolStatusReport;
    async fn invoke(&self, tool: &str, params: Value, use_mcp_test: bool) -> Result<Value, ToolError>;
}

#[derive(Deserialize)]
struct Workflow {
    id: Value,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    active: bool,
}

/// The public API answers `{data: [...]}`; older instances return the bare array.
fn parse_workflows(value: Value) -> Result<Vec<Workflow>, UpstreamError> {
    let list = match value {
        Value::Object(mut obj) => obj.remove("data").unwrap_or(Value::Array(Vec::new())),
        other => other,
    };
    serde_json::from_value(list).map_err(|e| UpstreamError::Decode(e.to_string()))
}

pub struct N8nTools {
    client: Client,
    base_url: Option<String>,
    api_key: Option<String>,
    mcp_test_endpoint: Option<String>,
    timeout: Duration,
}

impl N8nTools {
    pub fn new(cfg: &ToolsConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(cfg.timeout_secs);
        let client = Client::builder().connect_timeout(timeout).build()?;
        if cfg.api_key.is_none() {
            tracing::warn!("N8N API key not configured, tool calls are sent unauthenticated");
        }
        Ok(Self {
            client,
            base_url: cfg.base_url.as_ref().map(|u| u.trim_end_matches('/').to_string()),
            api_key: cfg.api_key.clone(),
            mcp_test_endpoint: cfg.mcp_test_endpoint.clone(),
            timeout,
        })
    }

    fn authed(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => rb.header(API_KEY_HEADER, key),
            None => rb,
        }
    }

    fn endpoint_for(&self, tool: &str, use_mcp_test: bool) -> Result<String, ToolError> {
        if use_mcp_test || tool == MCP_TEST_TOOL {
            return self
                .mcp_test_endpoint
                .clone()
                .ok_or(ToolError::NotConfigured("mcp_test_endpoint"));
        }
        let base = self
            .base_url
            .as_ref()
            .ok_or(ToolError::NotConfigured("base_url"))?;
        Ok(format!("{base}/webhook/{tool}"))
    }

    async fn list_workflows(&self, base: &str) -> Result<Vec<ToolDescriptor>, UpstreamError> {
        let url = format!("{base}/api/v1/workflows");
        let value: Value = with_deadline(self.timeout, async {
            let resp = self.authed(self.client.get(&url)).send().await?;
            Ok::<_, UpstreamError>(ensure_success(resp).await?.json().await?)
        })
        .await?;

        let tools = parse_workflows(value)?
            .into_iter()
            .map(|w| {
                let id = match w.id {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                ToolDescriptor {
                    name: w.name,
                    description: w.description.unwrap_or_else(|| "n8n workflow".to_string()),
                    endpoint: format!("{base}/webhook/{id}"),
                    active: w.active,
                }
            })
            .collect();
        Ok(tools)
    }

    async fn check_mcp_test(&self, endpoint: &str) -> bool {
        let body = json!({"action": "test", "timestamp": timestamp_now()});
        let res = with_deadline(self.timeout, async {
            let resp = self.authed(self.client.post(endpoint)).json(&body).send().await?;
            ensure_success(resp).await
        })
        .await;
        if let Err(e) = &res {
            tracing::debug!(error = %e, "MCP test endpoint unavailable");
        }
        res.is_ok()
    }
}

#[async_trait::async_trait]
impl ToolRunner for N8nTools {
    async fn status(&self) -> ToolStatusReport {
        let mut report = ToolStatusReport {
            endpoint: self.base_url.clone(),
            mcp_test_endpoint: self.mcp_test_endpoint.clone(),
            ..ToolStatusReport::default()
        };

        match &self.base_url {
            Some(base) => match self.list_workflows(base).await {
                Ok(tools) => {
                    report.connected = true;
                    report.tools = tools;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to list workflows");
                    report.error = Some(e.to_string());
                }
            },
            None => report.error = Some(ToolError::NotConfigured("base_url").to_string()),
        }

        // the MCP test endpoint works without the workflow API
        if let Some(endpoint) = &self.mcp_test_endpoint {
            report.mcp_test_available = self.check_mcp_test(endpoint).await;
            if report.mcp_test_available {
                report.connected = true;
                report.tools.push(ToolDescriptor {
                    name: MCP_TEST_TOOL.to_string(),
                    description: "MCP Test Endpoint".to_string(),
                    endpoint: endpoint.clone(),
                    active: true,
                });
            }
        }
        report
    }

    async fn invoke(&self, tool: &str, params: Value, use_mcp_test: bool) -> Result<Value, ToolError> {
        let endpoint = self.endpoint_for(tool, use_mcp_test)?;
        tracing::info!(tool, %endpoint, "invoking tool");

        let text = with_deadline(self.timeout, async {
            let resp = self.authed(self.client.post(&endpoint)).json(&params).send().await?;
            Ok::<_, UpstreamError>(ensure_success(resp).await?.text().await?)
        })
        .await?;

        // webhooks may answer with plain text ("Workflow was started")
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}
