use serde::Serialize;

use super::response::ResponseObject;

/// Responses stream events, emitted in the fixed order from §4.7:
/// `response.created` -> `response.output_text.delta`* -> `response.output_text.done`
/// -> `response.completed` -> `[DONE]` (the sentinel is framed separately, see `sse::encode_done`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "response.created")]
    Created { response: ResponseStub },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { item_id: String, delta: String },
    #[serde(rename = "response.output_text.done")]
    OutputTextDone { item_id: String, text: String },
    #[serde(rename = "response.completed")]
    Completed { response: ResponseObject },
    #[serde(rename = "error")]
    Error { error: ErrorStub },
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseStub {
    pub id: String,
    pub object: &'static str,
    pub status: &'static str,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorStub {
    pub message: String,
    #[serde(rename = "type")]
    pub r#type: String,
}
