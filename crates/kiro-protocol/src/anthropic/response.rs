use serde::Serialize;

use super::types::{OutboundBlock, StopReason, Usage};

#[derive(Debug, Clone, Serialize)]
pub struct CreateMessageResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub role: &'static str,
    pub content: Vec<OutboundBlock>,
    pub model: String,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl CreateMessageResponse {
    pub fn new(
        id: String,
        model: String,
        content: Vec<OutboundBlock>,
        stop_reason: StopReason,
        usage: Usage,
    ) -> Self {
        Self {
            id,
            r#type: "message",
            role: "assistant",
            content,
            model,
            stop_reason,
            usage,
        }
    }
}

/// Anthropic's `{"type":"error","error":{...}}` envelope (§6, §7).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub r#type: String,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            r#type: "error",
            error: ErrorBody {
                r#type: error_type.into(),
                message: message.into(),
            },
        }
    }
}
