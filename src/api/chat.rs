use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;

use crate::api::ApiError;
use crate::core::entities::ChatRequest;
use crate::metrics::RELAY_REQUESTS_TOTAL;
use crate::routing::AppState;
use crate::stream::text_stream_response;

/// `POST /chat-relay`
pub async fn chat_relay(
    State(app): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let upstream = app.relay.upstream_name();
    let Json(req) = payload.map_err(|e| {
        RELAY_REQUESTS_TOTAL.with_label_values(&[upstream, "rejected"]).inc();
        ApiError::BadRequest(e.body_text())
    })?;

    tracing::info!(
        upstream,
        chars = req.message.len(),
        images = req.images.len(),
        files = req.attachments.len(),
        tool_mode = req.tool_mode,
        "chat relay request"
    );

    match app.relay.relay(req).await {
        Ok(body) => {
            RELAY_REQUESTS_TOTAL.with_label_values(&[upstream, "ok"]).inc();
            Ok(text_stream_response(body))
        }
        Err(e) => {
            let err = ApiError::from(e);
            let label = if err.status().is_client_error() { "rejected" } else { "failed" };
            RELAY_REQUESTS_TOTAL.with_label_values(&[upstream, label]).inc();
            Err(err)
        }
    }
}
