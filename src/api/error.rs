use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::relay::RelayError;
use crate::tools::ToolError;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Relay(RelayError::InvalidRequest(_)) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status();
        if code.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::UpstreamError;

    #[test]
    fn status_mapping() {
        let bad = ApiError::from(RelayError::InvalidRequest("Message or images required".into()));
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let upstream = ApiError::from(RelayError::Upstream(UpstreamError::Status {
            status: 500,
            body: "boom".into(),
        }));
        assert_eq!(upstream.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(upstream.to_string().contains("boom"));

        let tool = ApiError::from(ToolError::NotConfigured("base_url"));
        assert_eq!(tool.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
