use serde::Serialize;

use super::types::{Candidate, OutboundContent, OutboundPart, UsageMetadata};

#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentResponse {
    pub candidates: Vec<Candidate>,
    pub usage_metadata: UsageMetadata,
}

impl GenerateContentResponse {
    pub fn new(text: String, finish_reason: &'static str, usage: UsageMetadata) -> Self {
        Self {
            candidates: vec![Candidate {
                content: OutboundContent {
                    role: "model",
                    parts: vec![OutboundPart { text }],
                },
                finish_reason,
                index: 0,
            }],
            usage_metadata: usage,
        }
    }
}

/// Gemini's error envelope (§6, modelled after the REST API's wrapped shape).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    pub status: String,
}

impl ErrorEnvelope {
    pub fn new(code: u16, status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                status: status.into(),
                message: message.into(),
            },
        }
    }
}
