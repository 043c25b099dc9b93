use serde::Serialize;
use serde_json::Value;

use super::types::{StopReason, Usage};

/// One SSE frame of an Anthropic Messages stream (§4.7 encode, stream).
/// Each variant's `event:` name is its snake_case tag.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: MessageStartStub,
    },
    ContentBlockStart {
        index: u32,
        content_block: ContentBlockStub,
    },
    ContentBlockDelta {
        index: u32,
        delta: Delta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: MessageDeltaStub,
        usage: Usage,
    },
    MessageStop,
    Error {
        error: ErrorStub,
    },
}

impl StreamEvent {
    /// The `event:` name used alongside `data:` in SSE framing — matches
    /// the serde tag exactly, since Anthropic names SSE events after the
    /// payload's own `type` field.
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::MessageStart { .. } => "message_start",
            StreamEvent::ContentBlockStart { .. } => "content_block_start",
            StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            StreamEvent::ContentBlockStop { .. } => "content_block_stop",
            StreamEvent::MessageDelta { .. } => "message_delta",
            StreamEvent::MessageStop => "message_stop",
            StreamEvent::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageStartStub {
    pub id: String,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub role: &'static str,
    pub model: String,
    pub content: Vec<Value>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockStub {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageDeltaStub {
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorStub {
    #[serde(rename = "type")]
    pub r#type: String,
    pub message: String,
}
