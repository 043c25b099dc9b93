//! Minimal SSE framing helper shared by every dialect's stream encoder
//! (§6 EXTERNAL INTERFACES: `data: <json>\n\n`, optionally named events).

use bytes::Bytes;

/// Encodes one SSE event. `event` is omitted for OpenAI-family dialects,
/// which frame every chunk as a bare `data:` line; Anthropic supplies a
/// named event per chunk.
pub fn encode_sse(event: Option<&str>, data: &str) -> Bytes {
    let mut out = String::new();
    if let Some(event) = event {
        out.push_str("event: ");
        out.push_str(event);
        out.push('\n');
    }
    for line in data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    Bytes::from(out)
}

/// The OpenAI-family `[DONE]` sentinel that terminates a chat/responses
/// stream (§6).
pub fn encode_done() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}
