use serde::Deserialize;

use super::types::{InboundMessage, InboundTool};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChatCompletionRequest {
    pub model: String,
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub tools: Option<Vec<InboundTool>>,
    #[serde(default)]
    pub stream: bool,
}
