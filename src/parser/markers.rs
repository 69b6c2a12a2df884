use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::entities::{InvocationStatus, ToolInvocation};

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";
pub const TOOL_OPEN: &str = "[TOOL_CALL]";
pub const TOOL_CLOSE: &str = "[/TOOL_CALL]";
pub const FENCE: &str = "```";

#[derive(Deserialize)]
struct ToolCallPayload {
    name: String,
    #[serde(default, alias = "params")]
    arguments: Map<String, Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    status: Option<InvocationStatus>,
}

/// Decode the JSON between tool-call delimiters. `None` means the span is not a usable call.
pub fn parse_tool_call(raw: &str) -> Option<ToolInvocation> {
    let payload: ToolCallPayload = serde_json::from_str(raw.trim()).ok()?;
    if payload.name.trim().is_empty() {
        return None;
    }

    let status = payload.status.unwrap_or(if payload.error.is_some() {
        InvocationStatus::Error
    } else if payload.result.is_some() {
        InvocationStatus::Success
    } else {
        InvocationStatus::Pending
    });
    let result = match (payload.result, payload.error) {
        (Some(result), _) => Some(result),
        (None, Some(err)) => Some(serde_json::json!({ "error": err })),
        (None, None) => None,
    };

    Some(ToolInvocation {
        name: payload.name,
        arguments: payload.arguments,
        result,
        status,
    })
}

/// Wire form of a tool call, as the relay writes it into the text stream.
pub fn encode_tool_call(call: &ToolInvocation) -> String {
    let json = serde_json::to_string(call).unwrap_or_else(|_| format!(r#"{{"name":"{}"}}"#, call.name));
    format!("{TOOL_OPEN}{json}{TOOL_CLOSE}")
}
