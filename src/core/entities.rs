use base64::prelude::{Engine as _, BASE64_STANDARD};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// Current UTC time as RFC 3339, the format webhook payloads carry.
pub fn timestamp_now() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// Body of `POST /chat-relay`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub tool_mode: bool,
    /// Image attachments as data URLs, in selection order.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<FileRef>,
}

impl ChatRequest {
    pub fn has_content(&self) -> bool {
        !self.message.trim().is_empty() || !self.images.is_empty() || !self.attachments.is_empty()
    }
}

/// Non-image file forwarded alongside a chat request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub name: String,
    pub data_url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Pending,
    Success,
    Error,
}

impl InvocationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, InvocationStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InvocationStatus::Pending => "pending",
            InvocationStatus::Success => "success",
            InvocationStatus::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub status: InvocationStatus,
}

impl ToolInvocation {
    pub fn pending(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            result: None,
            status: InvocationStatus::Pending,
        }
    }

    /// Merge a later sighting of the same call. A finished call never goes back to pending.
    pub fn merge(&mut self, update: ToolInvocation) {
        if !update.arguments.is_empty() {
            self.arguments = update.arguments;
        }
        if self.status.is_terminal() {
            return;
        }
        if update.result.is_some() {
            self.result = update.result;
        }
        self.status = update.status;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
}

#[derive(Clone, Debug)]
pub struct Attachment {
    pub id: Uuid,
    pub name: String,
    pub kind: AttachmentKind,
    /// Raw file bytes; cloning shares the buffer.
    pub content: Bytes,
    /// `data:<mime>;base64,...`
    pub preview: String,
}

impl Attachment {
    pub fn from_bytes(name: impl Into<String>, kind: AttachmentKind, mime: &str, content: Bytes) -> Self {
        let preview = format!("data:{mime};base64,{}", BASE64_STANDARD.encode(&content));
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            kind,
            content,
            preview,
        }
    }

    pub fn file_ref(&self) -> FileRef {
        FileRef {
            name: self.name.clone(),
            data_url: self.preview.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub reasoning: Option<String>,
    pub tool_invocations: Vec<ToolInvocation>,
    pub attachments: Vec<Attachment>,
    pub timestamp: OffsetDateTime,
    pub frozen: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            content: content.into(),
            reasoning: None,
            tool_invocations: Vec::new(),
            attachments: Vec::new(),
            timestamp: OffsetDateTime::now_utc(),
            frozen: false,
        }
    }

    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        let mut msg = Self::new(Role::User, content);
        msg.attachments = attachments;
        msg.frozen = true;
        msg
    }

    pub fn assistant() -> Self {
        Self::new(Role::Assistant, String::new())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Code,
    Json,
    Markdown,
    Text,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedArtifact {
    pub id: String,
    pub name: String,
    pub language: String,
    pub kind: ArtifactKind,
    pub content: String,
}

/// One workflow exposed by the tool backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub endpoint: String,
    pub active: bool,
}
