//! Anthropic Messages dialect adapter (§4.7).

use bytes::Bytes;
use serde_json::json;
use uuid::Uuid;

use kiro_protocol::anthropic::request::CreateMessageRequest;
use kiro_protocol::anthropic::response::CreateMessageResponse;
use kiro_protocol::anthropic::stream::{
    ContentBlockStub, Delta, ErrorStub, MessageDeltaStub, MessageStartStub, StreamEvent,
};
use kiro_protocol::anthropic::types::{
    InboundBlock, MessageContent, OutboundBlock, Role as AnthropicRole, StopReason as AnthropicStopReason,
    Usage as AnthropicUsage,
};
use kiro_protocol::{
    sse, Block, InternalResponse, StopReason, ToolResultItem, ToolSpec, ToolUseItem, Turn, Usage, UpstreamRequest,
};

use crate::model_map;

/// Decodes a client `CreateMessageRequest` into the internal shape. The
/// final message is treated as the current turn; everything before it
/// becomes history (§4.7 Anthropic decode).
pub fn decode(request: &CreateMessageRequest) -> UpstreamRequest {
    let mut history = Vec::new();
    if let Some(system) = &request.system {
        let text = system.flatten();
        if !text.is_empty() {
            history.push(Turn::UserText(format!("System: {text}")));
        }
    }

    let tool_catalog = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect()
    });

    let mut current_user_text = String::new();
    let mut current_tool_results = Vec::new();
    let last_index = request.messages.len().saturating_sub(1);

    for (index, message) in request.messages.iter().enumerate() {
        let is_last = index == last_index;
        let (text, tool_uses, tool_results) = split_content(&message.content);
        match message.role {
            AnthropicRole::User => {
                if !tool_results.is_empty() {
                    if is_last {
                        current_tool_results = tool_results;
                    } else {
                        history.push(Turn::UserToolResults(tool_results));
                    }
                }
                if !text.is_empty() {
                    if is_last {
                        current_user_text = text;
                    } else {
                        history.push(Turn::UserText(text));
                    }
                }
            }
            AnthropicRole::Assistant => {
                if !tool_uses.is_empty() {
                    history.push(Turn::AssistantToolUse(tool_uses));
                }
                if !text.is_empty() {
                    history.push(Turn::AssistantText(text));
                }
            }
        }
    }

    UpstreamRequest {
        // Filled in by the router handler from the raw request's fingerprint.
        conversation_id: String::new(),
        model_id: model_map::to_upstream_model(&request.model),
        history,
        current_user_text,
        current_tool_results,
        tool_catalog,
        origin: UpstreamRequest::ORIGIN.to_string(),
    }
}

/// Extracts flattened text, tool-use blocks, and tool-result blocks from
/// a message's content. Every block is normalised into `kiro_protocol::Block`
/// first (§9 "Normalise once at the dialect boundary"), including image
/// blocks (§4.7 "record as {format, bytes}") — only then split by variant,
/// so nothing is silently discarded at decode time.
fn split_content(content: &MessageContent) -> (String, Vec<ToolUseItem>, Vec<ToolResultItem>) {
    match content {
        MessageContent::Text(text) => (text.clone(), Vec::new(), Vec::new()),
        MessageContent::Blocks(blocks) => {
            let blocks: Vec<Block> = blocks.iter().map(to_block).collect();
            kiro_protocol::split_blocks(&blocks)
        }
    }
}

fn to_block(block: &InboundBlock) -> Block {
    match block {
        InboundBlock::Text { text } => Block::Text(text.clone()),
        InboundBlock::Image { source } => Block::Image { format: source.media_type.clone(), bytes: source.data.clone() },
        InboundBlock::ToolUse { id, name, input } => {
            Block::ToolUse(ToolUseItem { id: id.clone(), name: name.clone(), input: input.clone() })
        }
        InboundBlock::ToolResult { tool_use_id, content, is_error } => Block::ToolResult(ToolResultItem {
            tool_use_id: tool_use_id.clone(),
            content: content.flatten(),
            is_error: *is_error,
        }),
    }
}

fn map_stop_reason(reason: StopReason) -> AnthropicStopReason {
    match reason {
        StopReason::EndTurn => AnthropicStopReason::EndTurn,
        StopReason::ToolUse => AnthropicStopReason::ToolUse,
        StopReason::MaxTokens => AnthropicStopReason::MaxTokens,
        // Anthropic's dialect has no "error" stop_reason; a terminal error
        // is always surfaced as an error envelope instead (§4.9 state machine).
        StopReason::Error => AnthropicStopReason::EndTurn,
    }
}

pub fn encode_response(model: &str, response: &InternalResponse) -> CreateMessageResponse {
    let mut content = Vec::new();
    let text = response.text();
    if !text.is_empty() {
        content.push(OutboundBlock::Text { text });
    }
    for tool_use in &response.tool_uses {
        content.push(OutboundBlock::ToolUse {
            id: tool_use.id.clone(),
            name: tool_use.name.clone(),
            input: tool_use.input.clone(),
        });
    }
    CreateMessageResponse::new(
        format!("msg_{}", Uuid::new_v4().simple()),
        model.to_string(),
        content,
        map_stop_reason(response.stop_reason),
        AnthropicUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        },
    )
}

fn frame(event: &StreamEvent) -> Bytes {
    let data = serde_json::to_string(event).unwrap_or_default();
    sse::encode_sse(Some(event.event_name()), &data)
}

/// Stateful stream encoder: one `content_block_start`+`...stop` pair per
/// text run or tool call, emitted in the fixed order from §4.7.
pub struct StreamEncoder {
    id: String,
    model: String,
    next_index: u32,
    open_text: bool,
    open_tool: bool,
}

impl StreamEncoder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            model: model.into(),
            next_index: 0,
            open_text: false,
            open_tool: false,
        }
    }

    pub fn message_start(&self) -> Bytes {
        frame(&StreamEvent::MessageStart {
            message: MessageStartStub {
                id: self.id.clone(),
                r#type: "message",
                role: "assistant",
                model: self.model.clone(),
                content: Vec::new(),
                usage: AnthropicUsage { input_tokens: 0, output_tokens: 0 },
            },
        })
    }

    pub fn text_delta(&mut self, text: &str) -> Vec<Bytes> {
        let mut frames = Vec::new();
        if !self.open_text {
            frames.push(frame(&StreamEvent::ContentBlockStart {
                index: self.next_index,
                content_block: ContentBlockStub::Text { text: String::new() },
            }));
            self.open_text = true;
        }
        frames.push(frame(&StreamEvent::ContentBlockDelta {
            index: self.next_index,
            delta: Delta::TextDelta { text: text.to_string() },
        }));
        frames
    }

    fn close_text(&mut self) -> Option<Bytes> {
        if !self.open_text {
            return None;
        }
        self.open_text = false;
        let frame = frame(&StreamEvent::ContentBlockStop { index: self.next_index });
        self.next_index += 1;
        Some(frame)
    }

    pub fn tool_use_start(&mut self, id: &str, name: &str) -> Vec<Bytes> {
        let mut frames: Vec<Bytes> = self.close_text().into_iter().collect();
        frames.push(frame(&StreamEvent::ContentBlockStart {
            index: self.next_index,
            content_block: ContentBlockStub::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input: json!({}),
            },
        }));
        self.open_tool = true;
        frames
    }

    pub fn tool_use_delta(&self, partial_json: &str) -> Bytes {
        frame(&StreamEvent::ContentBlockDelta {
            index: self.next_index,
            delta: Delta::InputJsonDelta { partial_json: partial_json.to_string() },
        })
    }

    fn close_tool(&mut self) -> Option<Bytes> {
        if !self.open_tool {
            return None;
        }
        self.open_tool = false;
        let frame = frame(&StreamEvent::ContentBlockStop { index: self.next_index });
        self.next_index += 1;
        Some(frame)
    }

    pub fn finish(&mut self, stop_reason: StopReason, usage: Usage) -> Vec<Bytes> {
        let mut frames: Vec<Bytes> = self.close_text().into_iter().collect();
        frames.extend(self.close_tool());
        frames.push(frame(&StreamEvent::MessageDelta {
            delta: MessageDeltaStub { stop_reason: map_stop_reason(stop_reason) },
            usage: AnthropicUsage { input_tokens: usage.input_tokens, output_tokens: usage.output_tokens },
        }));
        frames.push(frame(&StreamEvent::MessageStop));
        frames
    }

    pub fn error(&self, message: &str) -> Bytes {
        frame(&StreamEvent::Error {
            error: ErrorStub { r#type: "overloaded_error".to_string(), message: message.to_string() },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiro_protocol::anthropic::types::{InboundMessage, Role};

    fn text_message(role: Role, text: &str) -> InboundMessage {
        InboundMessage { role, content: MessageContent::Text(text.to_string()) }
    }

    #[test]
    fn decode_treats_last_message_as_current_turn() {
        let request = CreateMessageRequest {
            model: "claude-sonnet-4-5".to_string(),
            messages: vec![
                text_message(Role::User, "hi"),
                text_message(Role::Assistant, "hello"),
                text_message(Role::User, "how are you"),
            ],
            system: None,
            tools: None,
            stream: false,
            max_tokens: 1024,
        };
        let upstream = decode(&request);
        assert_eq!(upstream.current_user_text, "how are you");
        assert_eq!(upstream.history, vec![Turn::UserText("hi".into()), Turn::AssistantText("hello".into())]);
    }

    #[test]
    fn decode_flattens_system_blocks_into_a_leading_history_turn() {
        let request = CreateMessageRequest {
            model: "claude-sonnet-4-5".to_string(),
            messages: vec![text_message(Role::User, "hi")],
            system: Some(kiro_protocol::anthropic::types::SystemField::Text("be terse".to_string())),
            tools: None,
            stream: false,
            max_tokens: 1024,
        };
        let upstream = decode(&request);
        assert_eq!(upstream.history, vec![Turn::UserText("System: be terse".into())]);
    }

    #[test]
    fn stream_encoder_closes_text_before_opening_a_tool_block() {
        let mut encoder = StreamEncoder::new("claude-sonnet-4-5");
        let delta_frames = encoder.text_delta("hi");
        assert_eq!(delta_frames.len(), 2);
        let tool_frames = encoder.tool_use_start("tool_1", "search");
        assert_eq!(tool_frames.len(), 2);
    }
}
