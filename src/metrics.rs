use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Chat relay requests by upstream and outcome
    pub static ref RELAY_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gwen_relay_requests_total",
        "Total number of chat relay requests",
        &["upstream", "status"]
    )
    .unwrap();

    /// Time until the upstream answered (headers for streams, full body otherwise)
    pub static ref UPSTREAM_DURATION: HistogramVec = register_histogram_vec!(
        "gwen_upstream_duration_seconds",
        "Upstream response time in seconds",
        &["upstream", "mode"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    /// Side-channel and direct tool invocations
    pub static ref TOOL_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gwen_tool_calls_total",
        "Total number of tool invocations",
        &["tool", "status"]
    )
    .unwrap();

    /// Response bodies currently being relayed
    pub static ref ACTIVE_STREAMS: IntGauge =
        register_int_gauge!("gwen_active_streams", "Number of responses currently streaming").unwrap();
}

/// Render every registered metric in the Prometheus text format.
pub fn export_metrics() -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// `GET /metrics`
pub async fn metrics_handler() -> Response {
    match export_metrics() {
        Ok(text) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "metrics export failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
