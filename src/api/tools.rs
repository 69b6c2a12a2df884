use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::ApiError;
use crate::metrics::TOOL_CALLS_TOTAL;
use crate::routing::AppState;
use crate::tools::{ToolStatusReport, MCP_TEST_TOOL};

/// `GET /tool-status`
pub async fn tool_status(State(app): State<AppState>) -> Json<ToolStatusReport> {
    Json(app.tools.status().await)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvokeRequest {
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub use_mcp_test: bool,
}

/// `POST /tool-invoke`
pub async fn tool_invoke(
    State(app): State<AppState>,
    payload: Result<Json<ToolInvokeRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let tool = match (req.tool, req.use_mcp_test) {
        (Some(t), _) if !t.trim().is_empty() => t,
        (_, true) => MCP_TEST_TOOL.to_string(),
        _ => return Err(ApiError::BadRequest("Tool name required".into())),
    };
    let params = req.params.unwrap_or_else(|| json!({}));

    let outcome = app.tools.invoke(&tool, params, req.use_mcp_test).await;
    let status = if outcome.is_ok() { "success" } else { "error" };
    TOOL_CALLS_TOTAL.with_label_values(&[tool.as_str(), status]).inc();

    Ok(Json(outcome?))
}
