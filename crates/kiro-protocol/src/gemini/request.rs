use serde::Deserialize;

use super::types::{InboundContent, SystemInstruction};

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateContentRequest {
    #[serde(default)]
    pub system_instruction: Option<SystemInstruction>,
    pub contents: Vec<InboundContent>,
}
