//! Incremental marker parser for one streamed assistant message.
//!
//! The relay's body is plain text with three in-band conventions: a single
//! `<think>…</think>` reasoning block, any number of `[TOOL_CALL]{json}[/TOOL_CALL]`
//! spans, and fenced code blocks. [`MarkerParser`] consumes the raw chunks in
//! arrival order and, after each one, publishes a [`Snapshot`] of what the UI
//! should show. Scanning resumes where the previous chunk left off, so a whole
//! response is processed in time linear in its length.

pub mod artifacts;
pub mod markers;

use uuid::Uuid;

use crate::core::entities::{ExtractedArtifact, Message, ToolInvocation};
use markers::{parse_tool_call, THINK_CLOSE, THINK_OPEN, TOOL_CLOSE, TOOL_OPEN};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Marker {
    Reasoning,
    ToolCall,
}

impl Marker {
    fn open(self) -> &'static str {
        match self {
            Marker::Reasoning => THINK_OPEN,
            Marker::ToolCall => TOOL_OPEN,
        }
    }

    fn close(self) -> &'static str {
        match self {
            Marker::Reasoning => THINK_CLOSE,
            Marker::ToolCall => TOOL_CLOSE,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum ScanState {
    /// Plain text; looking for the next opening tag.
    Text,
    /// Opening tag seen at `open_at`; the close tag is searched from `search_from`.
    Awaiting {
        marker: Marker,
        open_at: usize,
        search_from: usize,
    },
}

/// What the UI should show for the message right now.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub content: String,
    pub reasoning: Option<String>,
    /// Text of a reasoning block whose close tag has not arrived yet.
    pub pending_reasoning: Option<String>,
    pub tool_invocations: Vec<ToolInvocation>,
    pub artifacts: Vec<ExtractedArtifact>,
    pub finished: bool,
}

impl Snapshot {
    pub fn apply_to(&self, msg: &mut Message) {
        msg.content.clone_from(&self.content);
        msg.reasoning.clone_from(&self.reasoning);
        msg.tool_invocations.clone_from(&self.tool_invocations);
        msg.frozen = self.finished;
    }
}

pub struct MarkerParser {
    message_id: Uuid,
    /// Bytes of a UTF-8 sequence split across chunks.
    utf8_tail: Vec<u8>,
    buffer: String,
    pos: usize,
    state: ScanState,
    content: String,
    reasoning: Option<String>,
    reasoning_seen: bool,
    tools: Vec<ToolInvocation>,
    finished: bool,
}

impl MarkerParser {
    pub fn new(message_id: Uuid) -> Self {
        Self {
            message_id,
            utf8_tail: Vec::new(),
            buffer: String::new(),
            pos: 0,
            state: ScanState::Text,
            content: String::new(),
            reasoning: None,
            reasoning_seen: false,
            tools: Vec::new(),
            finished: false,
        }
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    /// Everything received so far, markers included.
    pub fn accumulated(&self) -> &str {
        &self.buffer
    }

    pub fn push(&mut self, chunk: &[u8]) -> Snapshot {
        if self.finished {
            tracing::warn!(message_id = %self.message_id, "chunk after end of stream ignored");
            return self.snapshot();
        }
        self.decode(chunk);
        self.scan();
        self.snapshot()
    }

    pub fn push_str(&mut self, chunk: &str) -> Snapshot {
        self.push(chunk.as_bytes())
    }

    /// End of stream. Unterminated markers stay in the content verbatim.
    pub fn finish(&mut self) -> Snapshot {
        if self.finished {
            return self.snapshot();
        }
        if !self.utf8_tail.is_empty() {
            let tail = std::mem::take(&mut self.utf8_tail);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }
        self.scan();

        let rest_from = match self.state {
            ScanState::Text => self.pos,
            ScanState::Awaiting { open_at, .. } => open_at,
        };
        self.content.push_str(&self.buffer[rest_from..]);
        self.pos = self.buffer.len();
        self.state = ScanState::Text;
        self.finished = true;
        self.snapshot()
    }

    pub fn snapshot(&self) -> Snapshot {
        let content = self.content.trim().to_string();
        let artifacts = artifacts::extract_artifacts(self.message_id, &content);
        let pending_reasoning = match self.state {
            ScanState::Awaiting {
                marker: Marker::Reasoning,
                open_at,
                ..
            } => {
                let body = &self.buffer[open_at + THINK_OPEN.len()..];
                let held = partial_suffix(body, &[THINK_CLOSE]);
                Some(body[..body.len() - held].to_string())
            }
            _ => None,
        };
        Snapshot {
            content,
            reasoning: self.reasoning.clone(),
            pending_reasoning,
            tool_invocations: self.tools.clone(),
            artifacts,
            finished: self.finished,
        }
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.utf8_tail.extend_from_slice(chunk);
        let mut input = std::mem::take(&mut self.utf8_tail);
        let mut start = 0;
        loop {
            match std::str::from_utf8(&input[start..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    break;
                }
                Err(e) => {
                    let valid = start + e.valid_up_to();
                    self.buffer
                        .push_str(std::str::from_utf8(&input[start..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            start = valid + bad;
                        }
                        None => {
                            self.utf8_tail = input.split_off(valid);
                            break;
                        }
                    }
                }
            }
        }
    }

    fn openers(&self) -> &'static [Marker] {
        if self.reasoning_seen {
            &[Marker::ToolCall]
        } else {
            &[Marker::Reasoning, Marker::ToolCall]
        }
    }

    fn scan(&mut self) {
        loop {
            match self.state {
                ScanState::Text => {
                    let rest = &self.buffer[self.pos..];
                    let next = self
                        .openers()
                        .iter()
                        .filter_map(|m| rest.find(m.open()).map(|i| (i, *m)))
                        .min_by_key(|(i, _)| *i);

                    match next {
                        Some((i, marker)) => {
                            let open_at = self.pos + i;
                            self.content.push_str(&self.buffer[self.pos..open_at]);
                            self.pos = open_at;
                            self.state = ScanState::Awaiting {
                                marker,
                                open_at,
                                search_from: open_at + marker.open().len(),
                            };
                        }
                        None => {
                            let tags: Vec<&str> = self.openers().iter().map(|m| m.open()).collect();
                            let held = partial_suffix(rest, &tags);
                            let commit_to = self.buffer.len() - held;
                            self.content.push_str(&self.buffer[self.pos..commit_to]);
                            self.pos = commit_to;
                            return;
                        }
                    }
                }
                ScanState::Awaiting {
                    marker,
                    open_at,
                    search_from,
                } => {
                    let body_start = open_at + marker.open().len();
                    let window = &self.buffer[search_from..];
                    let close = window.find(marker.close());
                    // a tool-call span that another opening tag interrupts was never a marker
                    let reopen = match marker {
                        Marker::ToolCall => self
                            .openers()
                            .iter()
                            .filter_map(|m| window.find(m.open()))
                            .min(),
                        Marker::Reasoning => None,
                    };
                    match (close, reopen) {
                        (_, Some(r)) if close.map_or(true, |c| r < c) => {
                            let release_to = search_from + r;
                            self.content.push_str(&self.buffer[open_at..release_to]);
                            self.pos = release_to;
                            self.state = ScanState::Text;
                        }
                        (Some(i), _) => {
                            let close_at = search_from + i;
                            let end = close_at + marker.close().len();
                            let inner = self.buffer[body_start..close_at].to_string();
                            self.close_marker(marker, &inner, open_at, end);
                            self.pos = end;
                            self.state = ScanState::Text;
                        }
                        (None, _) => {
                            let longest_tag = self
                                .openers()
                                .iter()
                                .map(|m| m.open().len())
                                .chain([marker.close().len()])
                                .max()
                                .unwrap_or(1);
                            let mut from = self
                                .buffer
                                .len()
                                .saturating_sub(longest_tag - 1)
                                .max(body_start);
                            while !self.buffer.is_char_boundary(from) {
                                from -= 1;
                            }
                            self.state = ScanState::Awaiting {
                                marker,
                                open_at,
                                search_from: from,
                            };
                            return;
                        }
                    }
                }
            }
        }
    }

    fn close_marker(&mut self, marker: Marker, inner: &str, open_at: usize, end: usize) {
        match marker {
            Marker::Reasoning => {
                self.reasoning_seen = true;
                let text = inner.trim();
                self.reasoning = (!text.is_empty()).then(|| text.to_string());
            }
            Marker::ToolCall => match parse_tool_call(inner) {
                Some(call) => {
                    tracing::debug!(tool = %call.name, status = call.status.as_str(), "tool-call marker");
                    match self.tools.iter_mut().find(|t| t.name == call.name) {
                        Some(existing) => existing.merge(call),
                        None => self.tools.push(call),
                    }
                }
                None => {
                    tracing::debug!(message_id = %self.message_id, "malformed tool-call marker left in place");
                    let raw = self.buffer[open_at..end].to_string();
                    self.content.push_str(&raw);
                }
            },
        }
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of one of `tags`.
fn partial_suffix(text: &str, tags: &[&str]) -> usize {
    let longest = tags.iter().map(|t| t.len()).max().unwrap_or(0);
    for k in (1..longest).rev() {
        if k > text.len() || !text.is_char_boundary(text.len() - k) {
            continue;
        }
        let tail = &text[text.len() - k..];
        if tags.iter().any(|t| t.len() > k && t.starts_with(tail)) {
            return k;
        }
    }
    0
}
