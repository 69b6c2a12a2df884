use crate::config::{ToolsConfig, TriggerPolicy};
use crate::core::entities::ChatRequest;

/// Decides whether a tool-mode chat request also runs the side-channel tool.
///
/// This is a policy, not intent detection: with `Keywords` a message that merely
/// mentions a keyword triggers the tool too.
#[derive(Clone, Debug)]
pub struct ToolTrigger {
    policy: TriggerPolicy,
    keywords: Vec<String>,
    tool: String,
}

impl ToolTrigger {
    pub fn new(policy: TriggerPolicy, keywords: &[String], tool: impl Into<String>) -> Self {
        Self {
            policy,
            keywords: keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            tool: tool.into(),
        }
    }

    pub fn from_config(cfg: &ToolsConfig) -> Self {
        Self::new(cfg.trigger, &cfg.keywords, cfg.default_tool.clone())
    }

    /// Name of the tool to run for `req`, if any.
    pub fn tool_for(&self, req: &ChatRequest) -> Option<&str> {
        if !req.tool_mode {
            return None;
        }
        let fire = match self.policy {
            TriggerPolicy::Always => true,
            TriggerPolicy::Never => false,
            TriggerPolicy::Keywords => {
                let text = req.message.to_lowercase();
                self.keywords.iter().any(|k| text.contains(k.as_str()))
            }
        };
        fire.then_some(self.tool.as_str())
    }
}
