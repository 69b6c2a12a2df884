use std::time::Duration;

use bytes::Bytes;
use futures_util::{stream, StreamExt};

use crate::connectors::{UpstreamClient, UpstreamError, UpstreamResponse};
use crate::core::entities::ChatRequest;

/// Fallback used when no real upstream is configured: streams a canned echo word by word.
pub struct DemoUpstream {
    delay: Duration,
}

impl Default for DemoUpstream {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(25),
        }
    }
}

impl DemoUpstream {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    fn reply_text(req: &ChatRequest) -> String {
        let mut text = String::from("Demo mode: no upstream is configured. ");
        if req.message.trim().is_empty() {
            text.push_str("You sent ");
        } else {
            text.push_str(&format!("You said: \"{}\". ", req.message.trim()));
            if !req.images.is_empty() {
                text.push_str("You also sent ");
            }
        }
        if !req.images.is_empty() {
            text.push_str(&format!("{} image(s).", req.images.len()));
        }
        text.trim_end().to_string()
    }
}

#[async_trait::async_trait]
impl UpstreamClient for DemoUpstream {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn send(&self, req: &ChatRequest) -> Result<UpstreamResponse, UpstreamError> {
        let text = Self::reply_text(req);
        let words: Vec<String> = text.split_inclusive(' ').map(str::to_owned).collect();
        let delay = self.delay;
        let stream = stream::iter(words).then(move |word| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(Bytes::from(word))
        });
        Ok(UpstreamResponse::Streaming(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_message_in_chunks() {
        let upstream = DemoUpstream::with_delay(Duration::ZERO);
        let req = ChatRequest {
            message: "ping".into(),
            ..ChatRequest::default()
        };
        let chunks: Vec<Bytes> = upstream
            .send(&req)
            .await
            .unwrap()
            .into_stream()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert!(chunks.len() > 1);
        let text: String = chunks
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect();
        assert!(text.contains("You said: \"ping\"."));
    }

    #[test]
    fn image_only_request_is_described() {
        let req = ChatRequest {
            images: vec!["data:image/png;base64,AA==".into()],
            ..ChatRequest::default()
        };
        assert!(DemoUpstream::reply_text(&req).ends_with("You sent 1 image(s)."));
    }
}
