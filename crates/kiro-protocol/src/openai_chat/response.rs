use serde::Serialize;

use super::types::{FinishReason, OutboundMessage, Usage};

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: OutboundMessage,
    pub finish_reason: FinishReason,
}

impl ChatCompletionResponse {
    pub fn new(
        id: String,
        created: i64,
        model: String,
        message: OutboundMessage,
        finish_reason: FinishReason,
        usage: Usage,
    ) -> Self {
        Self {
            id,
            object: "chat.completion",
            created,
            model,
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason,
            }],
            usage,
        }
    }
}

/// OpenAI's `{"error":{"message":..,"type":..,"code":..}}` envelope (§6).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub code: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                r#type: error_type.into(),
                code: None,
            },
        }
    }
}
