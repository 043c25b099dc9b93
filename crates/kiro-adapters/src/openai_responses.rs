//! OpenAI Responses dialect adapter (§4.7).

use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use kiro_protocol::openai_responses::request::CreateResponseRequest;
use kiro_protocol::openai_responses::response::{ErrorEnvelope, ResponseObject};
use kiro_protocol::openai_responses::stream::{ErrorStub, ResponseStub, StreamEvent};
use kiro_protocol::openai_responses::types::{InboundInput, InboundItem, OutboundUsage, OutputContent, OutputItem};
use kiro_protocol::{sse, InternalResponse, StopReason, ToolUseItem, Turn, UpstreamRequest};

use crate::model_map;

/// Decode: `input` is a string or a list of message/function_call_output
/// items; `instructions` becomes a leading system turn (§4.7 Responses
/// decode).
pub fn decode(request: &CreateResponseRequest) -> UpstreamRequest {
    let tool_catalog = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|t| kiro_protocol::ToolSpec {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    });

    let mut history = Vec::new();
    if let Some(instructions) = &request.instructions
        && !instructions.is_empty()
    {
        history.push(Turn::UserText(format!("System: {instructions}")));
    }

    let mut current_user_text = String::new();
    let mut current_tool_results = Vec::new();

    match &request.input {
        InboundInput::Text(text) => current_user_text = text.clone(),
        InboundInput::Items(items) => {
            let last_index = items.len().saturating_sub(1);
            for (index, item) in items.iter().enumerate() {
                let is_last = index == last_index;
                match item {
                    InboundItem::Message { role, content } => {
                        let text = content.flatten();
                        if text.is_empty() {
                            continue;
                        }
                        match role.as_str() {
                            "user" => {
                                if is_last {
                                    current_user_text = text;
                                } else {
                                    history.push(Turn::UserText(text));
                                }
                            }
                            "assistant" => history.push(Turn::AssistantText(text)),
                            _ => history.push(Turn::UserText(text)),
                        }
                    }
                    InboundItem::FunctionCallOutput { call_id, output } => {
                        let result = kiro_protocol::ToolResultItem {
                            tool_use_id: call_id.clone(),
                            content: output.clone(),
                            is_error: false,
                        };
                        if is_last {
                            current_tool_results.push(result);
                        } else {
                            history.push(Turn::UserToolResults(vec![result]));
                        }
                    }
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

pub fn encode_response(model: &str, response: &InternalResponse) -> ResponseObject {
    let mut output = Vec::new();
    let text = response.text();
    if !text.is_empty() {
        output.push(OutputItem::Message {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            status: "completed",
            role: "assistant",
            content: vec![OutputContent::OutputText { text, annotations: Vec::new() }],
        });
    }
    for tool_use in &response.tool_uses {
        output.push(OutputItem::FunctionCall {
            id: format!("fc_{}", Uuid::new_v4().simple()),
            call_id: tool_use.id.clone(),
            name: tool_use.name.clone(),
            arguments: tool_use.input.to_string(),
        });
    }
    ResponseObject::new(
        format!("resp_{}", Uuid::new_v4().simple()),
        OffsetDateTime::now_utc().unix_timestamp(),
        model.to_string(),
        output,
        OutboundUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        },
    )
}

pub fn encode_error(status_label: &str, message: &str) -> ErrorEnvelope {
    ErrorEnvelope::new(status_label, message)
}

fn frame(event: &StreamEvent) -> Bytes {
    let data = serde_json::to_string(event).unwrap_or_default();
    sse::encode_sse(None, &data)
}

/// Stateful stream encoder emitting the fixed order from §4.7:
/// `response.created` -> `response.output_text.delta`* ->
/// `response.output_text.done` -> `response.completed` -> `[DONE]`.
pub struct StreamEncoder {
    id: String,
    model: String,
    item_id: String,
    text: String,
}

impl StreamEncoder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("resp_{}", Uuid::new_v4().simple()),
            model: model.into(),
            item_id: format!("msg_{}", Uuid::new_v4().simple()),
            text: String::new(),
        }
    }

    pub fn created(&self) -> Bytes {
        frame(&StreamEvent::Created {
            response: ResponseStub {
                id: self.id.clone(),
                object: "response",
                status: "in_progress",
                model: self.model.clone(),
            },
        })
    }

    pub fn text_delta(&mut self, text: &str) -> Bytes {
        self.text.push_str(text);
        frame(&StreamEvent::OutputTextDelta { item_id: self.item_id.clone(), delta: text.to_string() })
    }

    pub fn finish(&self, stop_reason: StopReason, usage: kiro_protocol::Usage, tool_uses: &[ToolUseItem]) -> Vec<Bytes> {
        let mut frames = vec![frame(&StreamEvent::OutputTextDone {
            item_id: self.item_id.clone(),
            text: self.text.clone(),
        })];

        let mut output = Vec::new();
        if !self.text.is_empty() {
            output.push(OutputItem::Message {
                id: self.item_id.clone(),
                status: "completed",
                role: "assistant",
                content: vec![OutputContent::OutputText { text: self.text.clone(), annotations: Vec::new() }],
            });
        }
        for tool_use in tool_uses {
            output.push(OutputItem::FunctionCall {
                id: format!("fc_{}", Uuid::new_v4().simple()),
                call_id: tool_use.id.clone(),
                name: tool_use.name.clone(),
                arguments: tool_use.input.to_string(),
            });
        }
        let _ = stop_reason;
        let response = ResponseObject::new(
            self.id.clone(),
            OffsetDateTime::now_utc().unix_timestamp(),
            self.model.clone(),
            output,
            OutboundUsage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                total_tokens: usage.input_tokens + usage.output_tokens,
            },
        );
        frames.push(frame(&StreamEvent::Completed { response }));
        frames.push(sse::encode_done());
        frames
    }

    pub fn error(&self, message: &str) -> Bytes {
        frame(&StreamEvent::Error { error: ErrorStub { message: message.to_string(), r#type: "server_error".to_string() } })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_plain_string_input_becomes_current_user_text() {
        let request = CreateResponseRequest {
            model: "gpt-4o".to_string(),
            input: InboundInput::Text("hello".to_string()),
            instructions: None,
            tools: None,
            stream: false,
        };
        let upstream = decode(&request);
        assert_eq!(upstream.current_user_text, "hello");
        assert!(upstream.history.is_empty());
    }

    #[test]
    fn instructions_become_a_leading_system_turn() {
        let request = CreateResponseRequest {
            model: "gpt-4o".to_string(),
            input: InboundInput::Text("hello".to_string()),
            instructions: Some("be terse".to_string()),
            tools: None,
            stream: false,
        };
        let upstream = decode(&request);
        assert_eq!(upstream.history, vec![Turn::UserText("System: be terse".into())]);
    }

    #[test]
    fn stream_finish_ends_with_done_sentinel() {
        let encoder = StreamEncoder::new("gpt-4o");
        let frames = encoder.finish(StopReason::EndTurn, kiro_protocol::Usage { input_tokens: 1, output_tokens: 2 }, &[]);
        assert!(frames.last().unwrap().as_ref().starts_with(b"data: [DONE]"));
    }
}
