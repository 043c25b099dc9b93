//! OpenAI Chat Completions dialect adapter (§4.7).

use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use kiro_protocol::openai_chat::request::CreateChatCompletionRequest;
use kiro_protocol::openai_chat::response::ChatCompletionResponse;
use kiro_protocol::openai_chat::stream::{ChatCompletionChunk, Delta, DeltaFunctionCall, DeltaToolCall};
use kiro_protocol::openai_chat::types::{
    FinishReason, InboundContent, InboundContentBlock, OutboundFunctionCall, OutboundMessage, OutboundToolCall,
    Usage as ChatUsage,
};
use kiro_protocol::{sse, Block, InternalResponse, StopReason, ToolUseItem, Turn, UpstreamRequest};

use crate::model_map;

/// Decode: flatten list-content to text; prepend system-role content onto
/// the first user turn (§4.7 OpenAI Chat decode).
pub fn decode(request: &CreateChatCompletionRequest) -> UpstreamRequest {
    let tool_catalog = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|t| kiro_protocol::ToolSpec {
                name: t.function.name.clone(),
                description: t.function.description.clone(),
                input_schema: t.function.parameters.clone(),
            })
            .collect()
    });

    let mut history = Vec::new();
    let mut pending_system = String::new();
    let mut current_user_text = String::new();
    let last_index = request.messages.len().saturating_sub(1);

    for (index, message) in request.messages.iter().enumerate() {
        let is_last = index == last_index;
        let text = message.content.as_ref().map(flatten_text).unwrap_or_default();
        match message.role.as_str() {
            "system" => {
                if !pending_system.is_empty() {
                    pending_system.push('\n');
                }
                pending_system.push_str(&text);
            }
            "user" => {
                let merged = if !pending_system.is_empty() {
                    let merged = format!("{pending_system}\n{text}");
                    pending_system.clear();
                    merged
                } else {
                    text
                };
                if is_last {
                    current_user_text = merged;
                } else if !merged.is_empty() {
                    history.push(Turn::UserText(merged));
                }
            }
            "assistant" => {
                if let Some(tool_calls) = &message.tool_calls {
                    let uses: Vec<ToolUseItem> = tool_calls
                        .iter()
                        .map(|call| ToolUseItem {
                            id: call.id.clone(),
                            name: call.function.name.clone(),
                            input: serde_json::from_str(&call.function.arguments).unwrap_or(serde_json::Value::Null),
                        })
                        .collect();
                    history.push(Turn::AssistantToolUse(uses));
                }
                if !text.is_empty() {
                    history.push(Turn::AssistantText(text));
                }
            }
            "tool" => {
                let result = kiro_protocol::ToolResultItem {
                    tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                    content: text,
                    is_error: false,
                };
                history.push(Turn::UserToolResults(vec![result]));
            }
            _ => {}
        }
    }

    UpstreamRequest {
        // Filled in by the router handler from the raw request's fingerprint.
        conversation_id: String::new(),
        model_id: model_map::to_upstream_model(&request.model),
        history,
        current_user_text,
        current_tool_results: Vec::new(),
        tool_catalog,
        origin: UpstreamRequest::ORIGIN.to_string(),
    }
}

/// Flattens message content to text, normalising every block into
/// `kiro_protocol::Block` first (§9 "Normalise once at the dialect
/// boundary"), including image blocks (§4.7 "record as {format, bytes}")
/// so they're captured rather than matched straight to `None`. This
/// dialect has no history slot for images, so — like Anthropic's
/// `split_content` — the block is built and then dropped by `split_blocks`,
/// not discarded at decode time.
fn flatten_text(content: &InboundContent) -> String {
    match content {
        InboundContent::Text(text) => text.clone(),
        InboundContent::Blocks(blocks) => {
            let blocks: Vec<Block> = blocks.iter().map(to_block).collect();
            let (text, _, _) = kiro_protocol::split_blocks(&blocks);
            text
        }
    }
}

fn to_block(block: &InboundContentBlock) -> Block {
    match block {
        InboundContentBlock::Text { text } => Block::Text(text.clone()),
        InboundContentBlock::ImageUrl { image_url } => {
            let (format, bytes) = parse_data_url(&image_url.url);
            Block::Image { format, bytes }
        }
    }
}

/// Splits a `data:<mime>;base64,<payload>` URL into `(format, bytes)`. Falls
/// back to treating the whole string as the payload with an empty format
/// when it isn't a data URL (e.g. an `https://` image reference).
fn parse_data_url(url: &str) -> (String, String) {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((meta, payload)) = rest.split_once(',')
    {
        let format = meta.strip_suffix(";base64").unwrap_or(meta).to_string();
        return (format, payload.to_string());
    }
    (String::new(), url.to_string())
}

fn map_finish_reason(reason: StopReason) -> FinishReason {
    match reason {
        StopReason::EndTurn => FinishReason::Stop,
        StopReason::ToolUse => FinishReason::ToolCalls,
        StopReason::MaxTokens => FinishReason::Length,
        StopReason::Error => FinishReason::Stop,
    }
}

pub fn encode_response(model: &str, response: &InternalResponse) -> ChatCompletionResponse {
    let text = response.text();
    let tool_calls = if response.tool_uses.is_empty() {
        None
    } else {
        Some(
            response
                .tool_uses
                .iter()
                .enumerate()
                .map(|(index, tool_use)| OutboundToolCall {
                    index: index as u32,
                    id: tool_use.id.clone(),
                    r#type: "function",
                    function: OutboundFunctionCall {
                        name: tool_use.name.clone(),
                        arguments: tool_use.input.to_string(),
                    },
                })
                .collect(),
        )
    };
    let message = OutboundMessage {
        role: "assistant",
        content: if text.is_empty() { None } else { Some(text) },
        tool_calls,
    };
    ChatCompletionResponse::new(
        format!("chatcmpl-{}", Uuid::new_v4().simple()),
        OffsetDateTime::now_utc().unix_timestamp(),
        model.to_string(),
        message,
        map_finish_reason(response.stop_reason),
        ChatUsage {
            prompt_tokens: response.usage.input_tokens,
            completion_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        },
    )
}

fn frame(chunk: &ChatCompletionChunk) -> Bytes {
    let data = serde_json::to_string(chunk).unwrap_or_default();
    sse::encode_sse(None, &data)
}

/// Stateful stream encoder: a leading role-only delta, then content or
/// tool-call deltas, then a finish-reason-only chunk (§4.7 OpenAI Chat
/// stream).
pub struct StreamEncoder {
    id: String,
    model: String,
    created: i64,
}

impl StreamEncoder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
            model: model.into(),
            created: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    pub fn role_start(&self) -> Bytes {
        let delta = Delta { role: Some("assistant"), content: None, tool_calls: None };
        frame(&ChatCompletionChunk::new(self.id.clone(), self.created, self.model.clone(), delta, None))
    }

    pub fn text_delta(&self, text: &str) -> Bytes {
        let delta = Delta { role: None, content: Some(text.to_string()), tool_calls: None };
        frame(&ChatCompletionChunk::new(self.id.clone(), self.created, self.model.clone(), delta, None))
    }

    pub fn tool_call_delta(&self, index: u32, id: Option<&str>, name: Option<&str>, arguments: &str) -> Bytes {
        let delta = Delta {
            role: None,
            content: None,
            tool_calls: Some(vec![DeltaToolCall {
                index,
                id: id.map(str::to_string),
                function: Some(DeltaFunctionCall { name: name.map(str::to_string), arguments: arguments.to_string() }),
            }]),
        };
        frame(&ChatCompletionChunk::new(self.id.clone(), self.created, self.model.clone(), delta, None))
    }

    pub fn finish(&self, stop_reason: StopReason) -> Vec<Bytes> {
        let delta = Delta::default();
        let chunk_frame = frame(&ChatCompletionChunk::new(
            self.id.clone(),
            self.created,
            self.model.clone(),
            delta,
            Some(map_finish_reason(stop_reason)),
        ));
        vec![chunk_frame, sse::encode_done()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiro_protocol::openai_chat::types::{ImageUrl, InboundContent, InboundContentBlock, InboundMessage};

    fn message(role: &str, content: &str) -> InboundMessage {
        InboundMessage {
            role: role.to_string(),
            content: Some(InboundContent::Text(content.to_string())),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    #[test]
    fn system_prompt_prepends_onto_first_user_turn() {
        let request = CreateChatCompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![message("system", "be terse"), message("user", "hi")],
            tools: None,
            stream: false,
        };
        let upstream = decode(&request);
        assert_eq!(upstream.current_user_text, "be terse\nhi");
        assert!(upstream.history.is_empty());
    }

    #[test]
    fn image_block_is_parsed_and_dropped_from_flattened_text() {
        let request = CreateChatCompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![InboundMessage {
                role: "user".to_string(),
                content: Some(InboundContent::Blocks(vec![
                    InboundContentBlock::Text { text: "what is this".to_string() },
                    InboundContentBlock::ImageUrl {
                        image_url: ImageUrl { url: "data:image/png;base64,AAAA".to_string() },
                    },
                ])),
                tool_calls: None,
                tool_call_id: None,
            }],
            tools: None,
            stream: false,
        };
        let upstream = decode(&request);
        assert_eq!(upstream.current_user_text, "what is this");
    }

    #[test]
    fn parses_data_url_into_format_and_payload() {
        let (format, bytes) = parse_data_url("data:image/png;base64,AAAA");
        assert_eq!(format, "image/png");
        assert_eq!(bytes, "AAAA");
    }

    #[test]
    fn finish_frame_ends_with_done_sentinel() {
        let encoder = StreamEncoder::new("gpt-4o");
        let frames = encoder.finish(StopReason::EndTurn);
        assert_eq!(frames.len(), 2);
        assert!(frames[1].as_ref().starts_with(b"data: [DONE]"));
    }
}
