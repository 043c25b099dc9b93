//! Gemini generateContent dialect adapter (§4.7). Streams as
//! newline-delimited JSON, not SSE (§6 `content_type_for_stream`).

use bytes::Bytes;

use kiro_protocol::gemini::request::GenerateContentRequest;
use kiro_protocol::gemini::response::{ErrorEnvelope, GenerateContentResponse};
use kiro_protocol::gemini::types::{Role as GeminiRole, UsageMetadata};
use kiro_protocol::{InternalResponse, StopReason, Turn, UpstreamRequest};

use crate::model_map;

/// Decode: `systemInstruction.parts[].text` concatenated;
/// `contents[].role` with `.parts[].text`. Gemini tool calls are not
/// required on decode by the core (§4.7 Gemini decode).
pub fn decode(request: &GenerateContentRequest, model: &str) -> UpstreamRequest {
    let mut history = Vec::new();
    if let Some(system) = &request.system_instruction {
        let text = system.parts.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join("\n");
        if !text.is_empty() {
            history.push(Turn::UserText(format!("System: {text}")));
        }
    }

    let mut current_user_text = String::new();
    let last_index = request.contents.len().saturating_sub(1);
    for (index, content) in request.contents.iter().enumerate() {
        let is_last = index == last_index;
        let text = content.parts.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join("\n");
        if text.is_empty() {
            continue;
        }
        match content.role {
            GeminiRole::User => {
                if is_last {
                    current_user_text = text;
                } else {
                    history.push(Turn::UserText(text));
                }
            }
            GeminiRole::Model => history.push(Turn::AssistantText(text)),
        }
    }

    UpstreamRequest {
        // Filled in by the router handler from the raw request's fingerprint.
        conversation_id: String::new(),
        model_id: model_map::to_upstream_model(model),
        history,
        current_user_text,
        current_tool_results: Vec::new(),
        tool_catalog: None,
        origin: UpstreamRequest::ORIGIN.to_string(),
    }
}

fn finish_reason(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn => "STOP",
        StopReason::ToolUse => "STOP",
        StopReason::MaxTokens => "MAX_TOKENS",
        StopReason::Error => "OTHER",
    }
}

pub fn encode_response(response: &InternalResponse) -> GenerateContentResponse {
    GenerateContentResponse::new(
        response.text(),
        finish_reason(response.stop_reason),
        UsageMetadata {
            prompt_token_count: response.usage.input_tokens,
            candidates_token_count: response.usage.output_tokens,
            total_token_count: response.usage.input_tokens + response.usage.output_tokens,
        },
    )
}

pub fn encode_error(code: u16, status: &str, message: &str) -> ErrorEnvelope {
    ErrorEnvelope::new(code, status, message)
}

/// Streaming just re-emits the same shape as a non-stream response, one
/// JSON object per delta, newline-terminated (no SSE framing).
pub fn encode_stream_chunk(text_so_far: &str, stop_reason: Option<StopReason>, usage: kiro_protocol::Usage) -> Bytes {
    let reason = stop_reason.map(finish_reason).unwrap_or("");
    let chunk = GenerateContentResponse::new(
        text_so_far.to_string(),
        reason,
        UsageMetadata {
            prompt_token_count: usage.input_tokens,
            candidates_token_count: usage.output_tokens,
            total_token_count: usage.input_tokens + usage.output_tokens,
        },
    );
    let mut data = serde_json::to_vec(&chunk).unwrap_or_default();
    data.push(b'\n');
    Bytes::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiro_protocol::gemini::types::{InboundContent, Part};

    #[test]
    fn decode_last_user_turn_becomes_current_text() {
        let request = GenerateContentRequest {
            system_instruction: None,
            contents: vec![
                InboundContent { role: GeminiRole::User, parts: vec![Part { text: "hi".to_string() }] },
                InboundContent { role: GeminiRole::Model, parts: vec![Part { text: "hello".to_string() }] },
                InboundContent { role: GeminiRole::User, parts: vec![Part { text: "how are you".to_string() }] },
            ],
        };
        let upstream = decode(&request, "gemini-2.5-pro");
        assert_eq!(upstream.current_user_text, "how are you");
        assert_eq!(upstream.history, vec![Turn::UserText("hi".into()), Turn::AssistantText("hello".into())]);
    }

    #[test]
    fn stream_chunk_is_newline_terminated_json() {
        let bytes = encode_stream_chunk("partial", None, kiro_protocol::Usage { input_tokens: 1, output_tokens: 1 });
        assert!(bytes.ends_with(b"\n"));
        assert!(bytes.starts_with(b"{"));
    }
}
