//! Wire-level DTOs for the three client dialects, the internal shape they
//! all adapt to, and the upstream binary event-stream codec.
//!
//! This crate intentionally does **not** depend on axum, tokio, or any
//! HTTP client — it only describes bytes-in/bytes-out shapes. Decoding a
//! client dialect into the internal shape (and back) is `kiro-adapters`;
//! performing IO is `kiro-engine`.

pub mod anthropic;
pub mod eventstream;
pub mod gemini;
pub mod internal;
pub mod openai_chat;
pub mod openai_responses;
pub mod sse;

pub use eventstream::{EventStreamDecoder, ToolUseAssembler, ToolUseComplete, UpstreamFrame};
pub use internal::{
    Block, Content, InternalResponse, StopReason, ToolResultItem, ToolSpec, ToolUseItem, Turn,
    Usage, UpstreamRequest, fingerprint_first_three, split_blocks,
};

/// The three supported client dialects (§1, §GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Anthropic,
    OpenAIChat,
    OpenAIResponses,
    Gemini,
}
