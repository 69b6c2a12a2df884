use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Process configuration, loaded once at startup and passed down explicitly.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamKind {
    #[default]
    Webhook,
    Provider,
    Demo,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub kind: UpstreamKind,

    /// Workflow webhook receiving `{message, timestamp, images?, toolMode?}`
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Deadline for the upstream call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub provider: ProviderConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
}

/// When a tool-mode request should also run the side-channel tool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerPolicy {
    /// Case-insensitive substring match against `tools.keywords`
    #[default]
    Keywords,
    Always,
    Never,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// n8n base URL; workflows are listed from `{base_url}/api/v1/workflows`
    #[serde(default)]
    pub base_url: Option<String>,

    /// Sent as `X-N8N-API-KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub mcp_test_endpoint: Option<String>,

    /// Tool invoked when a chat request triggers the side channel
    #[serde(default = "default_tool")]
    pub default_tool: String,

    #[serde(default)]
    pub trigger: TriggerPolicy,

    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_provider_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "qwen/qwen-2.5-72b-instruct".to_string()
}

fn default_tool() -> String {
    "mcp-test".to_string()
}

fn default_keywords() -> Vec<String> {
    ["run workflow", "workflow", "n8n", "automation", "trigger"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            kind: UpstreamKind::default(),
            webhook_url: None,
            timeout_secs: default_timeout_secs(),
            provider: ProviderConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            api_key: None,
            model: default_model(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            mcp_test_endpoint: None,
            default_tool: default_tool(),
            trigger: TriggerPolicy::default(),
            keywords: default_keywords(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RelayConfig {
    /// Read `path` (a missing file means defaults), then apply environment overrides.
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut cfg: RelayConfig = match tokio::fs::read_to_string(path).await {
            Ok(text) => toml::from_str(&text)
                .with_context(|| format!("invalid config file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                RelayConfig::default()
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Write the whole config back; the last writer wins.
    pub async fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let text = toml::to_string_pretty(self)?;
        tokio::fs::write(path, text)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GWEN_HOST") {
            self.server.host = v;
        }
        if let Some(port) = get("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        match get("GWEN_UPSTREAM").as_deref() {
            Some("webhook") => self.upstream.kind = UpstreamKind::Webhook,
            Some("provider") => self.upstream.kind = UpstreamKind::Provider,
            Some("demo") => self.upstream.kind = UpstreamKind::Demo,
            Some(other) => tracing::warn!(value = other, "ignoring unknown GWEN_UPSTREAM"),
            None => {}
        }
        if let Some(v) = get("WEBHOOK_URL") {
            self.upstream.webhook_url = Some(v);
        }
        if let Some(v) = get("OPENROUTER_API_KEY") {
            self.upstream.provider.api_key = Some(v);
        }
        if let Some(v) = get("OPENROUTER_BASE_URL") {
            self.upstream.provider.base_url = v;
        }
        if let Some(v) = get("GWEN_MODEL") {
            self.upstream.provider.model = v;
        }
        if let Some(v) = get("N8N_ENDPOINT") {
            self.tools.base_url = Some(v);
        }
        if let Some(v) = get("N8N_API_KEY") {
            self.tools.api_key = Some(v);
        }
        if let Some(v) = get("N8N_MCP_TEST_ENDPOINT") {
            self.tools.mcp_test_endpoint = Some(v);
        }
    }
}
