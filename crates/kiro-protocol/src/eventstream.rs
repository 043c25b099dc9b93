//! Binary event-stream framing used by the upstream protocol (§4.1 C1).
//!
//! Frame layout: 4-byte BE total_length, 4-byte BE headers_length, 4-byte
//! prelude CRC (ignored), `headers_length` bytes of headers (ignored),
//! payload bytes, 4-byte trailing CRC (ignored). The decoder never aborts
//! on a malformed frame: it advances by a single byte and tries again.

use std::collections::HashMap;

use bytes::{Buf, Bytes, BytesMut};
use serde_json::Value;

/// Frames larger than this are treated as malformed rather than waited on
/// forever; the upstream protocol never legitimately emits frames this
/// large, so this only guards against a corrupted length prefix stalling
/// the decoder indefinitely.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// A decoded upstream frame payload, narrowed to the shapes the core reads.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamFrame {
    AssistantResponse {
        content: String,
    },
    ToolUse {
        tool_use_id: String,
        name: Option<String>,
        input_fragment: Option<String>,
        stop: bool,
    },
    /// An error delivered as a frame payload rather than an HTTP status
    /// (§9 Open Questions: this must still drive `Streaming -> Errored`).
    Error {
        message: String,
    },
    /// A well-formed JSON payload that didn't match a known shape.
    Unknown(Value),
}

enum FrameStep {
    Frame(Bytes),
    Resync,
    NeedMore,
}

/// Incremental parser: feed it chunks as they arrive off the wire, it
/// buffers partial frames across calls and emits complete ones.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buf: BytesMut,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<UpstreamFrame> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        loop {
            match self.try_take_frame() {
                FrameStep::Frame(payload) => {
                    if let Some(frame) = decode_payload(&payload) {
                        out.push(frame);
                    }
                }
                FrameStep::Resync => {
                    tracing::trace!("event-stream: malformed frame, resynchronising by 1 byte");
                }
                FrameStep::NeedMore => break,
            }
        }
        out
    }

    /// Called once the upstream connection closes; any residual bytes are a
    /// truncated frame and are dropped (there is nothing valid to recover).
    pub fn finish(&mut self) -> Vec<UpstreamFrame> {
        if !self.buf.is_empty() {
            tracing::trace!(
                residual = self.buf.len(),
                "event-stream: discarding truncated trailing bytes"
            );
            self.buf.clear();
        }
        Vec::new()
    }

    fn try_take_frame(&mut self) -> FrameStep {
        if self.buf.len() < 12 {
            return FrameStep::NeedMore;
        }
        let total_len = u32::from_be_bytes(self.buf[0..4].try_into().unwrap()) as usize;
        let headers_len = u32::from_be_bytes(self.buf[4..8].try_into().unwrap()) as usize;

        if total_len < 16 || total_len > MAX_FRAME_LEN || headers_len > total_len - 16 {
            self.buf.advance(1);
            return FrameStep::Resync;
        }
        if self.buf.len() < total_len {
            return FrameStep::NeedMore;
        }

        let frame = self.buf.split_to(total_len).freeze();
        let payload_start = 12 + headers_len;
        let payload_end = total_len - 4;
        FrameStep::Frame(frame.slice(payload_start..payload_end))
    }
}

fn decode_payload(payload: &[u8]) -> Option<UpstreamFrame> {
    let value: Value = serde_json::from_slice(payload).ok()?;
    let obj = value.as_object()?;

    if let Some(type_tag) = obj.get("__type").and_then(|v| v.as_str())
        && type_tag.ends_with("Exception")
    {
        let message = obj
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or(type_tag)
            .to_string();
        return Some(UpstreamFrame::Error { message });
    }

    // The upstream wraps each event in a `{"<eventName>Event": {...}}`
    // envelope (`assistantResponseEvent`, `toolUseEvent`); unwrap it before
    // falling back to the flat top-level keys below.
    if let Some(inner) = obj.get("assistantResponseEvent").and_then(Value::as_object) {
        if let Some(content) = inner.get("content").and_then(|v| v.as_str()) {
            return Some(UpstreamFrame::AssistantResponse {
                content: content.to_string(),
            });
        }
    }
    if let Some(inner) = obj.get("toolUseEvent").and_then(Value::as_object) {
        return decode_tool_use(inner);
    }

    if obj.contains_key("toolUseId") {
        return decode_tool_use(obj);
    }

    if let Some(content) = obj.get("content").and_then(|v| v.as_str()) {
        return Some(UpstreamFrame::AssistantResponse {
            content: content.to_string(),
        });
    }

    if let Some(message) = obj.get("message").and_then(|v| v.as_str()) {
        return Some(UpstreamFrame::Error {
            message: message.to_string(),
        });
    }

    Some(UpstreamFrame::Unknown(value))
}

fn decode_tool_use(obj: &serde_json::Map<String, Value>) -> Option<UpstreamFrame> {
    let tool_use_id = obj.get("toolUseId")?.as_str()?.to_string();
    let name = obj.get("name").and_then(|v| v.as_str()).map(|s| s.to_string());
    let input_fragment = obj.get("input").and_then(|v| v.as_str()).map(|s| s.to_string());
    let stop = obj.get("stop").and_then(|v| v.as_bool()).unwrap_or(false);
    Some(UpstreamFrame::ToolUse {
        tool_use_id,
        name,
        input_fragment,
        stop,
    })
}

/// A fully assembled tool call, produced once all of a `toolUseId`'s
/// fragments have arrived and `stop=true`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUseComplete {
    pub tool_use_id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Default)]
struct PendingToolUse {
    name: String,
    fragments: String,
}

/// Assembles `ToolUse` frame fragments (possibly interleaved across
/// multiple concurrent `toolUseId`s) into completed tool calls.
#[derive(Debug, Default)]
pub struct ToolUseAssembler {
    pending: HashMap<String, PendingToolUse>,
}

impl ToolUseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        tool_use_id: &str,
        name: Option<&str>,
        input_fragment: Option<&str>,
        stop: bool,
    ) -> Option<ToolUseComplete> {
        let entry = self.pending.entry(tool_use_id.to_string()).or_default();
        if let Some(name) = name
            && entry.name.is_empty()
        {
            entry.name = name.to_string();
        }
        if let Some(fragment) = input_fragment {
            entry.fragments.push_str(fragment);
        }
        if !stop {
            return None;
        }

        let pending = self.pending.remove(tool_use_id)?;
        let input = if pending.fragments.trim().is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str::<Value>(&pending.fragments) {
                Ok(value) => value,
                Err(error) => {
                    tracing::warn!(
                        tool_use_id,
                        %error,
                        "tool-use fragment did not parse as JSON at stop=true; using empty object"
                    );
                    serde_json::json!({})
                }
            }
        };
        Some(ToolUseComplete {
            tool_use_id: tool_use_id.to_string(),
            name: pending.name,
            input,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let headers_len: u32 = 0;
        let total_len = (16 + headers_len as usize + payload.len()) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(&total_len.to_be_bytes());
        out.extend_from_slice(&headers_len.to_be_bytes());
        out.extend_from_slice(&[0u8; 4]); // prelude crc, ignored
        out.extend_from_slice(payload);
        out.extend_from_slice(&[0u8; 4]); // trailing crc, ignored
        out
    }

    #[test]
    fn decodes_assistant_response_frame() {
        let mut dec = EventStreamDecoder::new();
        let payload = br#"{"content":"hello"}"#;
        let events = dec.push_bytes(&frame(payload));
        assert_eq!(
            events,
            vec![UpstreamFrame::AssistantResponse {
                content: "hello".into()
            }]
        );
    }

    #[test]
    fn buffers_partial_frame_across_chunks() {
        let mut dec = EventStreamDecoder::new();
        let bytes = frame(br#"{"content":"he"}"#);
        let (first, second) = bytes.split_at(5);
        assert!(dec.push_bytes(first).is_empty());
        let events = dec.push_bytes(second);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn resynchronises_on_malformed_length_without_aborting() {
        let mut dec = EventStreamDecoder::new();
        let mut bytes = vec![0xFF; 4]; // bogus huge total_len
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&frame(br#"{"content":"ok"}"#));
        let events = dec.push_bytes(&bytes);
        assert_eq!(
            events,
            vec![UpstreamFrame::AssistantResponse { content: "ok".into() }]
        );
    }

    #[test]
    fn assembles_tool_use_fragments_in_arrival_order() {
        let mut asm = ToolUseAssembler::new();
        assert!(asm.push("t1", Some("get_time"), Some("{\""), false).is_none());
        assert!(asm.push("t1", None, Some("a\":1}"), false).is_none());
        let complete = asm.push("t1", None, None, true).unwrap();
        assert_eq!(complete.name, "get_time");
        assert_eq!(complete.input, serde_json::json!({"a": 1}));
    }

    #[test]
    fn non_json_final_fragment_yields_empty_object() {
        let mut asm = ToolUseAssembler::new();
        let complete = asm.push("t2", Some("f"), Some("not json"), true).unwrap();
        assert_eq!(complete.input, serde_json::json!({}));
    }

    #[test]
    fn decodes_nested_assistant_response_event_wrapper() {
        let mut dec = EventStreamDecoder::new();
        let payload = br#"{"assistantResponseEvent":{"content":"he"}}"#;
        let events = dec.push_bytes(&frame(payload));
        assert_eq!(events, vec![UpstreamFrame::AssistantResponse { content: "he".into() }]);
    }

    #[test]
    fn decodes_nested_tool_use_event_wrapper() {
        let mut dec = EventStreamDecoder::new();
        let payload = br#"{"toolUseEvent":{"toolUseId":"t1","name":"get_time","input":"{}","stop":true}}"#;
        let events = dec.push_bytes(&frame(payload));
        assert_eq!(
            events,
            vec![UpstreamFrame::ToolUse {
                tool_use_id: "t1".into(),
                name: Some("get_time".into()),
                input_fragment: Some("{}".into()),
                stop: true,
            }]
        );
    }

    #[test]
    fn decoder_is_idempotent_on_refed_buffer_prefix() {
        let mut dec = EventStreamDecoder::new();
        let bytes = frame(br#"{"content":"x"}"#);
        let first = dec.push_bytes(&bytes);
        // Re-feeding the same already-consumed prefix must not duplicate events:
        // the decoder's internal buffer was drained, so there's nothing to redecode.
        let second = dec.push_bytes(&[]);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }
}
