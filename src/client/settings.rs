use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Client preferences persisted between sessions.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientSettings {
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default)]
    pub tool_mode: bool,
}

fn default_relay_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            tool_mode: false,
        }
    }
}

impl ClientSettings {
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(text) => toml::from_str(&text)
                .with_context(|| format!("invalid settings file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(path, toml::to_string_pretty(self)?)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }
}
