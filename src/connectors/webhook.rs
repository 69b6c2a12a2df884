use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{header, Client};
use serde_json::{json, Value};

use crate::connectors::{
    ensure_success, with_deadline, UpstreamClient, UpstreamError, UpstreamResponse,
};
use crate::core::entities::{timestamp_now, ChatRequest};
use crate::core::reply::UpstreamReply;

/// Workflow webhook (n8n "Webhook" trigger node).
pub struct WebhookUpstream {
    client: Client,
    url: String,
    timeout: Duration,
}

impl WebhookUpstream {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    fn payload(req: &ChatRequest) -> Value {
        let mut body = json!({
            "message": req.message,
            "timestamp": timestamp_now(),
        });
        if !req.images.is_empty() {
            body["images"] = json!(req.images);
        }
        if !req.attachments.is_empty() {
            body["attachments"] = json!(req.attachments);
        }
        if req.tool_mode {
            body["toolMode"] = json!(true);
        }
        body
    }
}

/// JSON replies are decoded as a whole; everything else is relayed as it arrives.
fn is_json_reply(resp: &reqwest::Response) -> bool {
    match resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        Some(ct) => ct.contains("json") && !ct.contains("ndjson"),
        None => true,
    }
}

#[async_trait::async_trait]
impl UpstreamClient for WebhookUpstream {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, req: &ChatRequest) -> Result<UpstreamResponse, UpstreamError> {
        let body = Self::payload(req);
        tracing::debug!(url = %self.url, images = req.images.len(), "calling webhook");

        let resp = with_deadline(self.timeout, async {
            let resp = self
                .client
                .post(&self.url)
                .header(header::CONTENT_TYPE, "application/json")
                .json(&body)
                .send()
                .await?;
            ensure_success(resp).await
        })
        .await?;

        if !is_json_reply(&resp) {
            let stream = resp
                .bytes_stream()
                .map(|item| item.map_err(|e| UpstreamError::Stream(e.to_string())));
            return Ok(UpstreamResponse::Streaming(Box::pin(stream)));
        }

        let value: Value = with_deadline(self.timeout, async {
            Ok::<_, UpstreamError>(resp.json().await?)
        })
        .await?;
        let reply = UpstreamReply::decode(value);
        tracing::debug!(shape = reply.shape(), "webhook replied");
        Ok(UpstreamResponse::Complete(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entities::FileRef;

    #[test]
    fn payload_omits_empty_optionals() {
        let req = ChatRequest {
            message: "hello".into(),
            ..ChatRequest::default()
        };
        let body = WebhookUpstream::payload(&req);
        assert_eq!(body["message"], "hello");
        assert!(body["timestamp"].is_string());
        assert!(body.get("images").is_none());
        assert!(body.get("toolMode").is_none());
    }

    #[test]
    fn payload_carries_images_files_and_tool_mode() {
        let req = ChatRequest {
            message: String::new(),
            tool_mode: true,
            images: vec!["data:image/png;base64,AA==".into()],
            attachments: vec![FileRef {
                name: "notes.txt".into(),
                data_url: "data:text/plain;base64,aGk=".into(),
            }],
        };
        let body = WebhookUpstream::payload(&req);
        assert_eq!(body["images"][0], "data:image/png;base64,AA==");
        assert_eq!(body["attachments"][0]["name"], "notes.txt");
        assert_eq!(body["toolMode"], true);
    }
}
