use std::convert::Infallible;
use std::fmt::Display;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};

use crate::connectors::ByteStream;
use crate::metrics::ACTIVE_STREAMS;

pub const ERROR_PREFIX: &str = "\n\n[relay error] ";

/// The in-band line that replaces a failure once bytes have been sent. Always a single line.
pub fn error_line(err: impl Display) -> String {
    let message = err.to_string().split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{ERROR_PREFIX}{message}")
}

struct ActiveStream;

impl ActiveStream {
    fn enter() -> Self {
        ACTIVE_STREAMS.inc();
        ActiveStream
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        ACTIVE_STREAMS.dec();
    }
}

/// Pass chunks through untouched. The first error becomes a final text line and ends the stream.
pub fn in_band_errors(upstream: ByteStream) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    stream::unfold(
        (upstream, false, ActiveStream::enter()),
        |(mut upstream, done, guard)| async move {
            if done {
                return None;
            }
            match upstream.next().await {
                Some(Ok(bytes)) => Some((Ok(bytes), (upstream, false, guard))),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "upstream stream failed mid-response");
                    Some((Ok(Bytes::from(error_line(&e))), (upstream, true, guard)))
                }
                None => None,
            }
        },
    )
}

/// `200 text/plain` response streaming `upstream` as it arrives.
pub fn text_stream_response(upstream: ByteStream) -> Response {
    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        ),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache, no-transform")),
        (
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        ),
    ];
    (headers, Body::from_stream(in_band_errors(upstream))).into_response()
}
