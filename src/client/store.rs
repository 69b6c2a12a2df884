use uuid::Uuid;

use crate::core::entities::{Attachment, ExtractedArtifact, Message, ToolDescriptor};
use crate::parser::Snapshot;

/// UI state for one chat session. One request may be in flight at a time.
#[derive(Debug, Default)]
pub struct ChatStore {
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub tool_mode: bool,
    /// Files queued for the next message.
    pub attachments: Vec<Attachment>,
    pub available_tools: Vec<ToolDescriptor>,
    pub tools_connected: bool,
    /// Code blocks of every message, in message order.
    pub artifacts: Vec<ExtractedArtifact>,
}

impl ChatStore {
    pub fn new(tool_mode: bool) -> Self {
        Self {
            tool_mode,
            ..Self::default()
        }
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn message(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Replace the content of a message. Frozen messages are left alone.
    pub fn update_message(&mut self, id: Uuid, content: impl Into<String>) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(msg) if !msg.frozen => {
                msg.content = content.into();
                true
            }
            _ => false,
        }
    }

    pub fn apply_snapshot(&mut self, id: Uuid, snapshot: &Snapshot) -> bool {
        let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        if msg.frozen {
            return false;
        }
        snapshot.apply_to(msg);

        let prefix = format!("{id}-");
        self.artifacts.retain(|a| !a.id.starts_with(&prefix));
        self.artifacts.extend(snapshot.artifacts.iter().cloned());
        true
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.artifacts.clear();
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    pub fn toggle_tool_mode(&mut self) -> bool {
        self.tool_mode = !self.tool_mode;
        self.tool_mode
    }

    pub fn set_available_tools(&mut self, tools: Vec<ToolDescriptor>) {
        self.available_tools = tools;
    }

    pub fn set_tools_connected(&mut self, connected: bool) {
        self.tools_connected = connected;
    }

    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    pub fn remove_attachment(&mut self, id: Uuid) -> Option<Attachment> {
        let idx = self.attachments.iter().position(|a| a.id == id)?;
        Some(self.attachments.remove(idx))
    }

    pub fn clear_attachments(&mut self) {
        self.attachments.clear();
    }

    pub fn take_attachments(&mut self) -> Vec<Attachment> {
        std::mem::take(&mut self.attachments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entities::{AttachmentKind, Role};
    use crate::parser::MarkerParser;
    use bytes::Bytes;

    #[test]
    fn frozen_messages_are_not_updated() {
        let mut store = ChatStore::default();
        let user = Message::user("hello", Vec::new());
        let id = user.id;
        store.add_message(user);
        assert!(!store.update_message(id, "changed"));
        assert_eq!(store.message(id).unwrap().content, "hello");
    }

    #[test]
    fn snapshots_replace_artifacts_of_the_same_message() {
        let mut store = ChatStore::default();
        let msg = Message::assistant();
        let id = msg.id;
        store.add_message(msg);

        let mut parser = MarkerParser::new(id);
        let snap = parser.push_str("```rust\nfn a() {}\n```\n");
        assert!(store.apply_snapshot(id, &snap));
        let snap = parser.push_str("```py\nprint(1)\n```");
        store.apply_snapshot(id, &snap);
        assert_eq!(store.artifacts.len(), 2);

        let snap = parser.finish();
        store.apply_snapshot(id, &snap);
        assert_eq!(store.artifacts.len(), 2);
        let msg = store.message(id).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.frozen);
        assert!(!store.apply_snapshot(id, &snap));
    }

    #[test]
    fn attachment_queue() {
        let mut store = ChatStore::new(true);
        assert!(store.tool_mode);
        assert!(!store.toggle_tool_mode());

        let a = Attachment::from_bytes("a.png", AttachmentKind::Image, "image/png", Bytes::new());
        let b = Attachment::from_bytes("b.txt", AttachmentKind::File, "text/plain", Bytes::new());
        let a_id = a.id;
        store.add_attachment(a);
        store.add_attachment(b);
        assert_eq!(store.remove_attachment(a_id).map(|a| a.name), Some("a.png".into()));
        assert!(store.remove_attachment(a_id).is_none());
        assert_eq!(store.take_attachments().len(), 1);
        assert!(store.attachments.is_empty());
    }
}
