use serde_json::Value;

/// A single (non-streamed) upstream JSON reply, decoded by shape.
///
/// Webhooks answer with whatever the workflow's last node produced, so the
/// text is looked up in a fixed order: `output`, `message`, `response`.
/// Anything else is kept as [`UpstreamReply::Unknown`] and forwarded as its
/// JSON serialization.
#[derive(Clone, Debug, PartialEq)]
pub enum UpstreamReply {
    Output(String),
    Message(String),
    Response(String),
    Unknown(Value),
}

const TEXT_FIELDS: [&str; 3] = ["output", "message", "response"];

impl UpstreamReply {
    pub fn decode(value: Value) -> Self {
        // n8n "respond with all items" wraps the item in an array
        let item = match &value {
            Value::Array(items) if items.len() == 1 && items[0].is_object() => &items[0],
            _ => &value,
        };

        for field in TEXT_FIELDS {
            let Some(text) = item.get(field).and_then(Value::as_str) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            let text = text.to_string();
            return match field {
                "output" => UpstreamReply::Output(text),
                "message" => UpstreamReply::Message(text),
                _ => UpstreamReply::Response(text),
            };
        }

        UpstreamReply::Unknown(value)
    }

    pub fn shape(&self) -> &'static str {
        match self {
            UpstreamReply::Output(_) => "output",
            UpstreamReply::Message(_) => "message",
            UpstreamReply::Response(_) => "response",
            UpstreamReply::Unknown(_) => "unknown",
        }
    }

    pub fn into_text(self) -> String {
        match self {
            UpstreamReply::Output(t) | UpstreamReply::Message(t) | UpstreamReply::Response(t) => t,
            UpstreamReply::Unknown(v) => serde_json::to_string(&v).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_wins_over_message() {
        let reply = UpstreamReply::decode(json!({"output": "a", "message": "b"}));
        assert_eq!(reply, UpstreamReply::Output("a".into()));
    }

    #[test]
    fn empty_output_falls_through() {
        let reply = UpstreamReply::decode(json!({"output": "", "response": "c"}));
        assert_eq!(reply, UpstreamReply::Response("c".into()));
    }

    #[test]
    fn single_item_array_is_unwrapped() {
        let reply = UpstreamReply::decode(json!([{"message": "from n8n"}]));
        assert_eq!(reply.into_text(), "from n8n");
    }

    #[test]
    fn unknown_shape_is_stringified() {
        let reply = UpstreamReply::decode(json!({"status": 1}));
        assert_eq!(reply.shape(), "unknown");
        assert_eq!(reply.into_text(), r#"{"status":1}"#);
    }
}
