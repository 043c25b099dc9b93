//! The internal request/response shape every dialect adapter round-trips
//! through (§3 DATA MODEL, §4.7 "Internal shape", §9 DESIGN NOTES).

use serde_json::Value;
use sha2::{Digest, Sha256};

/// A single block of message content, normalised once at the dialect
/// boundary so the rest of the core only ever sees this shape (§9).
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Text(String),
    Image { format: String, bytes: String },
    ToolUse(ToolUseItem),
    ToolResult(ToolResultItem),
}

/// Message content as the client sent it: a bare string, or a list of
/// typed blocks. Dialects decode into this before anything else happens.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Blocks(Vec<Block>),
}

impl Content {
    /// Flattens to plain text, concatenating block text in order and
    /// dropping non-text blocks. Used wherever a dialect only cares about
    /// the textual content (e.g. OpenAI Chat's flattened history turns).
    pub fn to_text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    Block::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolUseItem {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResultItem {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

/// One turn of conversation history (§3). The "current user message" is
/// held separately on `UpstreamRequest` because the upstream protocol
/// distinguishes history from current input.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    UserText(String),
    UserToolResults(Vec<ToolResultItem>),
    AssistantText(String),
    AssistantToolUse(Vec<ToolUseItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// The shape every dialect adapter decodes into and the engine dispatches
/// upstream (§3 UpstreamRequest, §6 wire body).
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub conversation_id: String,
    pub model_id: String,
    pub history: Vec<Turn>,
    pub current_user_text: String,
    pub current_tool_results: Vec<ToolResultItem>,
    pub tool_catalog: Option<Vec<ToolSpec>>,
    pub origin: String,
}

impl UpstreamRequest {
    pub const ORIGIN: &'static str = "AI_EDITOR";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The internal response shape every dialect encoder renders from (§4.7).
#[derive(Debug, Clone, PartialEq)]
pub struct InternalResponse {
    pub text_fragments: Vec<String>,
    pub tool_uses: Vec<ToolUseItem>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl InternalResponse {
    pub fn text(&self) -> String {
        self.text_fragments.concat()
    }
}

/// Splits a list of normalised content blocks into the pieces
/// `UpstreamRequest` needs: flattened text, tool-use items, tool-result
/// items (§9 "Normalise once at the dialect boundary"). Image blocks carry
/// no upstream history slot, so they don't contribute to any of the three
/// outputs here — same drop-non-text contract as `Content::to_text`.
pub fn split_blocks(blocks: &[Block]) -> (String, Vec<ToolUseItem>, Vec<ToolResultItem>) {
    let mut text_parts = Vec::new();
    let mut tool_uses = Vec::new();
    let mut tool_results = Vec::new();
    for block in blocks {
        match block {
            Block::Text(text) => text_parts.push(text.clone()),
            Block::Image { .. } => {}
            Block::ToolUse(item) => tool_uses.push(item.clone()),
            Block::ToolResult(item) => tool_results.push(item.clone()),
        }
    }
    (text_parts.join("\n"), tool_uses, tool_results)
}

/// SHA-256 of the first three messages (serialised as compact JSON,
/// joined with `\n`), truncated to 16 hex characters. Used both as the
/// `conversationId` sent upstream and as the session-fingerprint input to
/// account affinity (§3, §4.4, §GLOSSARY).
pub fn fingerprint_first_three(messages: &[Value]) -> String {
    let mut hasher = Sha256::new();
    for (i, message) in messages.iter().take(3).enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(message.to_string().as_bytes());
    }
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_16_hex_chars_and_stable() {
        let messages = vec![serde_json::json!({"role": "user", "content": "hi"})];
        let a = fingerprint_first_three(&messages);
        let b = fingerprint_first_three(&messages);
        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_only_considers_first_three() {
        let base = vec![
            serde_json::json!({"role": "user", "content": "a"}),
            serde_json::json!({"role": "assistant", "content": "b"}),
            serde_json::json!({"role": "user", "content": "c"}),
        ];
        let mut extended = base.clone();
        extended.push(serde_json::json!({"role": "assistant", "content": "d"}));
        assert_eq!(
            fingerprint_first_three(&base),
            fingerprint_first_three(&extended)
        );
    }

    #[test]
    fn content_to_text_flattens_blocks() {
        let content = Content::Blocks(vec![
            Block::Text("hello".into()),
            Block::Image {
                format: "png".into(),
                bytes: "AAAA".into(),
            },
            Block::Text("world".into()),
        ]);
        assert_eq!(content.to_text(), "hello\nworld");
    }
}
