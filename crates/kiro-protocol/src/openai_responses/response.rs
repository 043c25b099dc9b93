use serde::Serialize;

use super::types::{OutboundUsage, OutputItem};

#[derive(Debug, Clone, Serialize)]
pub struct ResponseObject {
    pub id: String,
    pub object: &'static str,
    pub created_at: i64,
    pub status: &'static str,
    pub model: String,
    pub output: Vec<OutputItem>,
    pub usage: OutboundUsage,
}

impl ResponseObject {
    pub fn new(id: String, created_at: i64, model: String, output: Vec<OutputItem>, usage: OutboundUsage) -> Self {
        Self {
            id,
            object: "response",
            created_at,
            status: "completed",
            model,
            output,
            usage,
        }
    }
}

/// Responses' `{"type":"error","error":{...}}` envelope (§6).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub r#type: String,
}

impl ErrorEnvelope {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            r#type: "error",
            error: ErrorBody {
                message: message.into(),
                r#type: error_type.into(),
            },
        }
    }
}
