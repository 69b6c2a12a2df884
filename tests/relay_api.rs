//! HTTP tests for the relay endpoints.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures_util::stream;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use gwen_relay::core::entities::InvocationStatus;
use gwen_relay::parser::MarkerParser;

mod common;
use common::{
    app, spawn_server, webhook_app, webhook_app_with_timeout, FakeTools, Script, ScriptedUpstream,
};

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

#[tokio::test]
async fn empty_request_is_rejected_before_upstream() {
    let upstream = ScriptedUpstream::new(Script::Reply("unused".into()));
    let app = app(upstream.clone(), FakeTools::ok(json!({})));

    let response = app
        .oneshot(post_json("/chat-relay", json!({ "message": "   ", "images": [] })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Message or images required");
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let upstream = ScriptedUpstream::new(Script::Reply("unused".into()));
    let app = app(upstream.clone(), FakeTools::ok(json!({})));

    let request = Request::builder()
        .uri("/chat-relay")
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn image_only_request_is_accepted() {
    let upstream = ScriptedUpstream::new(Script::Reply("nice picture".into()));
    let app = app(upstream.clone(), FakeTools::ok(json!({})));

    let response = app
        .oneshot(post_json(
            "/chat-relay",
            json!({ "message": "", "images": ["data:image/png;base64,AA=="] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "nice picture");
    assert_eq!(upstream.seen.lock().unwrap()[0].images.len(), 1);
}

#[tokio::test]
async fn streamed_webhook_body_passes_through() {
    let hook = Router::new().route(
        "/hook",
        post(|| async {
            let chunks = stream::iter(vec![
                Ok::<_, std::convert::Infallible>(Bytes::from("Hi")),
                Ok(Bytes::from(" there")),
            ]);
            ([(header::CONTENT_TYPE, "text/plain")], Body::from_stream(chunks)).into_response()
        }),
    );
    let base = spawn_server(hook).await;

    let response = webhook_app(&base)
        .oneshot(post_json("/chat-relay", json!({ "message": "hello" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert!(headers[header::CACHE_CONTROL]
        .to_str()
        .unwrap()
        .contains("no-cache"));
    assert_eq!(body_text(response).await, "Hi there");
}

#[tokio::test]
async fn json_webhook_reply_uses_field_fallback() {
    let hook = Router::new().route(
        "/hook",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["message"], "hello");
            assert!(body["timestamp"].is_string());
            Json(json!({ "output": "", "message": "from message field" }))
        }),
    );
    let base = spawn_server(hook).await;

    let response = webhook_app(&base)
        .oneshot(post_json("/chat-relay", json!({ "message": "hello" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "from message field");
}

#[tokio::test]
async fn array_webhook_reply_is_unwrapped() {
    let hook = Router::new().route(
        "/hook",
        post(|| async { Json(json!([{ "output": "first item" }])) }),
    );
    let base = spawn_server(hook).await;

    let response = webhook_app(&base)
        .oneshot(post_json("/chat-relay", json!({ "message": "hello" })))
        .await
        .unwrap();

    assert_eq!(body_text(response).await, "first item");
}

#[tokio::test]
async fn webhook_failure_is_a_server_error_with_upstream_text() {
    let hook = Router::new().route(
        "/hook",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let base = spawn_server(hook).await;

    let response = webhook_app(&base)
        .oneshot(post_json("/chat-relay", json!({ "message": "hello" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = body_json(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("500"), "{error}");
    assert!(error.contains("boom"), "{error}");
}

#[tokio::test]
async fn slow_webhook_times_out_as_server_error() {
    let hook = Router::new().route(
        "/hook",
        post(|| async {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            "too late"
        }),
    );
    let base = spawn_server(hook).await;

    let started = std::time::Instant::now();
    let response = webhook_app_with_timeout(&base, std::time::Duration::from_millis(200))
        .oneshot(post_json("/chat-relay", json!({ "message": "hello" })))
        .await
        .unwrap();

    assert!(started.elapsed() < std::time::Duration::from_secs(4));
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = body_json(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("timed out after 200ms"), "{error}");
}

#[tokio::test]
async fn mid_stream_failure_keeps_partial_output() {
    let upstream = ScriptedUpstream::new(Script::Chunks(vec![
        Ok("partial "),
        Ok("answer"),
        Err("connection reset"),
    ]));
    let app = app(upstream, FakeTools::ok(json!({})));

    let response = app
        .oneshot(post_json("/chat-relay", json!({ "message": "hello" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        "partial answer\n\n[relay error] stream interrupted: connection reset"
    );
}

#[tokio::test]
async fn tool_mode_emits_markers_before_the_answer() {
    let upstream = ScriptedUpstream::new(Script::Reply("Workflow finished.".into()));
    let tools = FakeTools::ok(json!({ "executionId": 42 }));
    let app = app(upstream, tools.clone());

    let response = app
        .oneshot(post_json(
            "/chat-relay",
            json!({ "message": "please run workflow now", "toolMode": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;

    assert!(body.starts_with("[TOOL_CALL]"));
    let pending = body.find("\"pending\"").unwrap();
    let success = body.find("\"success\"").unwrap();
    let answer = body.find("Workflow finished.").unwrap();
    assert!(pending < success && success < answer);

    let calls = tools.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "mcp-test");
    assert_eq!(calls[0].1["message"], "please run workflow now");

    let mut parser = MarkerParser::new(Uuid::now_v7());
    parser.push_str(&body);
    let snap = parser.finish();
    assert_eq!(snap.tool_invocations.len(), 1);
    assert_eq!(snap.tool_invocations[0].status, InvocationStatus::Success);
    assert_eq!(
        snap.tool_invocations[0].result,
        Some(json!({ "executionId": 42 }))
    );
    assert_eq!(snap.content, "Workflow finished.");
}

#[tokio::test]
async fn keywords_without_tool_mode_do_not_call_tools() {
    let upstream = ScriptedUpstream::new(Script::Reply("ok".into()));
    let tools = FakeTools::ok(json!({}));
    let app = app(upstream, tools.clone());

    let response = app
        .oneshot(post_json("/chat-relay", json!({ "message": "run workflow" })))
        .await
        .unwrap();

    assert_eq!(body_text(response).await, "ok");
    assert!(tools.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn upstream_failure_skips_the_tool_call() {
    let upstream = ScriptedUpstream::new(Script::Fail {
        status: 502,
        body: "bad gateway",
    });
    let tools = FakeTools::ok(json!({}));
    let app = app(upstream, tools.clone());

    let response = app
        .oneshot(post_json(
            "/chat-relay",
            json!({ "message": "run workflow", "toolMode": true }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(tools.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tool_status_without_backend_is_disconnected() {
    let response = webhook_app("http://127.0.0.1:9")
        .oneshot(
            Request::builder()
                .uri("/tool-status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["connected"], false);
    assert_eq!(report["tools"], json!([]));
    assert!(report["error"].is_string());
}

#[tokio::test]
async fn tool_invoke_requires_a_tool_name() {
    let tools = FakeTools::ok(json!({}));
    let app = app(ScriptedUpstream::new(Script::Reply(String::new())), tools.clone());

    let response = app
        .oneshot(post_json("/tool-invoke", json!({ "params": { "a": 1 } })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Tool name required");
    assert!(tools.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tool_invoke_malformed_body_is_a_json_bad_request() {
    let tools = FakeTools::ok(json!({}));
    let app = app(ScriptedUpstream::new(Script::Reply(String::new())), tools.clone());

    let request = Request::builder()
        .uri("/tool-invoke")
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{oops"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    assert!(body_json(response).await["error"].is_string());
    assert!(tools.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tool_invoke_passes_the_backend_reply_through() {
    let tools = FakeTools::ok(json!({ "started": true }));
    let app = app(ScriptedUpstream::new(Script::Reply(String::new())), tools.clone());

    let response = app
        .oneshot(post_json("/tool-invoke", json!({ "tool": "deploy" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "started": true }));
    let calls = tools.calls.lock().unwrap();
    assert_eq!(calls[0], ("deploy".to_string(), json!({}), false));
}

#[tokio::test]
async fn tool_invoke_failure_is_a_server_error() {
    let app = app(
        ScriptedUpstream::new(Script::Reply(String::new())),
        FakeTools::failing("workflow crashed"),
    );

    let response = app
        .oneshot(post_json("/tool-invoke", json!({ "useMcpTest": true })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = body_json(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("workflow crashed"));
}

#[tokio::test]
async fn health_and_metrics() {
    let app = app(ScriptedUpstream::new(Script::Reply(String::new())), FakeTools::ok(json!({})));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
