//! Client side of the relay: sends a chat request, reads the text stream and
//! keeps a [`ChatStore`] in step with the parser after every chunk.

use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

pub mod settings;
pub mod store;

pub use settings::ClientSettings;
pub use store::ChatStore;

use crate::core::entities::{AttachmentKind, ChatRequest, Message};
use crate::parser::MarkerParser;
use crate::stream::ERROR_PREFIX;
use crate::tools::ToolStatusReport;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("message or attachment required")]
    EmptyInput,
    #[error("a response is already in progress")]
    Busy,
    #[error("relay returned {status}: {message}")]
    Relay { status: u16, message: String },
    /// Reported by the relay inside the body after streaming started.
    #[error("{0}")]
    Stream(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub struct RelayClient {
    http: Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, ClientError> {
        Ok(Self {
            http: Client::builder().build()?,
            base_url: settings.relay_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Submit `input` plus the queued attachments and stream the answer into `store`.
    /// Returns the id of the assistant message.
    pub async fn send(&self, store: &mut ChatStore, input: &str) -> Result<Uuid, ClientError> {
        let text = input.trim();
        if text.is_empty() && store.attachments.is_empty() {
            return Err(ClientError::EmptyInput);
        }
        if store.is_loading {
            return Err(ClientError::Busy);
        }

        let attachments = store.take_attachments();
        let mut req = ChatRequest {
            message: text.to_string(),
            tool_mode: store.tool_mode,
            ..ChatRequest::default()
        };
        for att in &attachments {
            match att.kind {
                AttachmentKind::Image => req.images.push(att.preview.clone()),
                AttachmentKind::File => req.attachments.push(att.file_ref()),
            }
        }
        store.add_message(Message::user(text, attachments));
        store.set_loading(true);
        store.set_error(None);

        let result = self.stream_reply(store, &req).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "chat request failed");
            store.set_error(Some(e.to_string()));
        }
        store.set_loading(false);
        result
    }

    async fn stream_reply(&self, store: &mut ChatStore, req: &ChatRequest) -> Result<Uuid, ClientError> {
        let assistant = Message::assistant();
        let id = assistant.id;
        store.add_message(assistant);

        let mut parser = MarkerParser::new(id);
        let mut last_chunk_at = 0;
        let read = self.read_body(store, &mut parser, req, &mut last_chunk_at).await;
        // partial output is kept either way
        let snap = parser.finish();
        store.apply_snapshot(id, &snap);

        read?;
        match in_band_error(parser.accumulated(), last_chunk_at) {
            Some(message) => Err(ClientError::Stream(message)),
            None => Ok(id),
        }
    }

    async fn read_body(
        &self,
        store: &mut ChatStore,
        parser: &mut MarkerParser,
        req: &ChatRequest,
        last_chunk_at: &mut usize,
    ) -> Result<(), ClientError> {
        let resp = self.http.post(self.url("/chat-relay")).json(req).send().await?;
        let mut body = check_status(resp).await?.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            *last_chunk_at = parser.accumulated().len();
            let snap = parser.push(&chunk);
            store.apply_snapshot(parser.message_id(), &snap);
        }
        Ok(())
    }

    /// Refresh the tool list in `store`. An unreachable relay marks tools disconnected.
    pub async fn refresh_tools(&self, store: &mut ChatStore) -> Result<ToolStatusReport, ClientError> {
        let fetched = async {
            let resp = self.http.get(self.url("/tool-status")).send().await?;
            Ok::<_, ClientError>(check_status(resp).await?.json::<ToolStatusReport>().await?)
        }
        .await;

        match fetched {
            Ok(report) => {
                store.set_tools_connected(report.connected);
                store.set_available_tools(report.tools.clone());
                Ok(report)
            }
            Err(e) => {
                store.set_tools_connected(false);
                store.set_available_tools(Vec::new());
                Err(e)
            }
        }
    }

    pub async fn invoke_tool(&self, tool: &str, params: Value) -> Result<Value, ClientError> {
        let resp = self
            .http
            .post(self.url("/tool-invoke"))
            .json(&json!({ "tool": tool, "params": params }))
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from))
        .unwrap_or(body);
    Err(ClientError::Relay {
        status: status.as_u16(),
        message,
    })
}

/// The relay's error line, if the body ends with one. It has to reach into the final
/// chunk and be the last line, so quoted error text earlier in an answer does not count.
fn in_band_error(body: &str, last_chunk_at: usize) -> Option<String> {
    let at = body.rfind(ERROR_PREFIX)?;
    let message = body[at + ERROR_PREFIX.len()..].trim_end();
    if at + ERROR_PREFIX.len() <= last_chunk_at || message.contains('\n') {
        return None;
    }
    Some(message.trim().to_string())
}
