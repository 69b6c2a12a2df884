use std::time::Duration;

use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures_util::{stream, StreamExt};
use reqwest::{header, Client};
use serde_json::{json, Value};

use crate::config::ProviderConfig;
use crate::connectors::{
    ensure_success, with_deadline, UpstreamClient, UpstreamError, UpstreamResponse,
};
use crate::core::entities::ChatRequest;
use crate::parser::markers::{THINK_CLOSE, THINK_OPEN};

/// OpenAI-compatible streaming chat completions (OpenRouter by default).
pub struct OpenRouterUpstream {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OpenRouterUpstream {
    pub fn new(cfg: &ProviderConfig, timeout: Duration) -> anyhow::Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("provider API key not configured"))?;
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            timeout,
        })
    }

    fn messages(req: &ChatRequest) -> Vec<Value> {
        let content = if req.images.is_empty() {
            json!(req.message)
        } else {
            let mut parts = Vec::with_capacity(req.images.len() + 1);
            if !req.message.is_empty() {
                parts.push(json!({"type": "text", "text": req.message}));
            }
            for url in &req.images {
                parts.push(json!({"type": "image_url", "image_url": {"url": url}}));
            }
            json!(parts)
        };
        vec![json!({"role": "user", "content": content})]
    }
}

#[derive(Debug, PartialEq)]
enum Delta {
    Reasoning(String),
    Content(String),
    Done,
}

fn decode_event(data: &str) -> Result<Option<Delta>, UpstreamError> {
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == "[DONE]" {
        return Ok(Some(Delta::Done));
    }
    let v: Value = serde_json::from_str(data).map_err(|e| UpstreamError::Decode(e.to_string()))?;
    if let Some(err) = v.get("error") {
        let msg = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| err.to_string());
        return Err(UpstreamError::Stream(msg));
    }

    let delta = &v["choices"][0]["delta"];
    let reasoning = delta["reasoning"]
        .as_str()
        .or_else(|| delta["reasoning_content"].as_str())
        .filter(|s| !s.is_empty());
    if let Some(text) = reasoning {
        return Ok(Some(Delta::Reasoning(text.to_string())));
    }
    Ok(delta["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| Delta::Content(s.to_string())))
}

/// Wraps reasoning deltas in think tags so the client sees one reasoning block.
#[derive(Default)]
struct ThinkFramer {
    open: bool,
}

impl ThinkFramer {
    fn frame(&mut self, delta: Delta) -> Option<String> {
        match delta {
            Delta::Reasoning(text) if !self.open => {
                self.open = true;
                Some(format!("{THINK_OPEN}{text}"))
            }
            Delta::Reasoning(text) => Some(text),
            Delta::Content(text) if self.open => {
                self.open = false;
                Some(format!("{THINK_CLOSE}{text}"))
            }
            Delta::Content(text) => Some(text),
            Delta::Done => self.close(),
        }
    }

    fn close(&mut self) -> Option<String> {
        if self.open {
            self.open = false;
            Some(THINK_CLOSE.to_string())
        } else {
            None
        }
    }
}

#[async_trait::async_trait]
impl UpstreamClient for OpenRouterUpstream {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn send(&self, req: &ChatRequest) -> Result<UpstreamResponse, UpstreamError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": Self::messages(req),
            "stream": true,
        });
        tracing::debug!(model = %self.model, "calling provider");

        let resp = with_deadline(self.timeout, async {
            let resp = self
                .client
                .post(&url)
                .header(header::CONTENT_TYPE, "application/json")
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;
            ensure_success(resp).await
        })
        .await?;

        let events = Box::pin(resp.bytes_stream().eventsource());
        let framed = stream::unfold(
            (events, ThinkFramer::default(), false),
            |(mut events, mut framer, finished)| async move {
                if finished {
                    return None;
                }
                loop {
                    let delta = match events.next().await {
                        Some(Ok(event)) => decode_event(&event.data),
                        Some(Err(e)) => Err(UpstreamError::Stream(e.to_string())),
                        None => Ok(Some(Delta::Done)),
                    };
                    match delta {
                        Ok(Some(Delta::Done)) => {
                            let tail = framer.close()?;
                            return Some((Ok(Bytes::from(tail)), (events, framer, true)));
                        }
                        Ok(Some(delta)) => {
                            if let Some(text) = framer.frame(delta) {
                                return Some((Ok(Bytes::from(text)), (events, framer, false)));
                            }
                        }
                        Ok(None) => continue,
                        Err(e) => return Some((Err(e), (events, framer, true))),
                    }
                }
            },
        );

        Ok(UpstreamResponse::Streaming(Box::pin(framed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_content_and_done() {
        let ev = r#"{"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(decode_event(ev).unwrap(), Some(Delta::Content("Hi".into())));
        assert_eq!(decode_event("[DONE]").unwrap(), Some(Delta::Done));
        assert_eq!(decode_event("").unwrap(), None);
    }

    #[test]
    fn error_event_interrupts_stream() {
        let ev = r#"{"error":{"message":"overloaded"}}"#;
        let err = decode_event(ev).unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn reasoning_is_framed_once() {
        let mut framer = ThinkFramer::default();
        let out: Vec<String> = [
            Delta::Reasoning("plan".into()),
            Delta::Reasoning(" more".into()),
            Delta::Content("answer".into()),
        ]
        .into_iter()
        .filter_map(|d| framer.frame(d))
        .collect();
        assert_eq!(out.concat(), "<think>plan more</think>answer");
        assert_eq!(framer.close(), None);
    }

    #[test]
    fn dangling_reasoning_is_closed_at_end() {
        let mut framer = ThinkFramer::default();
        framer.frame(Delta::Reasoning("x".into()));
        assert_eq!(framer.frame(Delta::Done).as_deref(), Some("</think>"));
    }

    #[test]
    fn images_become_content_parts() {
        let req = ChatRequest {
            message: "what is this".into(),
            images: vec!["data:image/png;base64,AA==".into()],
            ..ChatRequest::default()
        };
        let msgs = OpenRouterUpstream::messages(&req);
        assert_eq!(msgs[0]["content"][0]["type"], "text");
        assert_eq!(msgs[0]["content"][1]["image_url"]["url"], "data:image/png;base64,AA==");
    }
}
