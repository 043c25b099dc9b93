use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundInput {
    Text(String),
    Items(Vec<InboundItem>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundItem {
    Message {
        #[serde(default = "default_role")]
        role: String,
        content: InboundMessageContent,
    },
    FunctionCallOutput {
        call_id: String,
        #[serde(default)]
        output: String,
    },
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundMessageContent {
    Text(String),
    Blocks(Vec<InboundTextPart>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundTextPart {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default)]
    pub text: String,
}

impl InboundMessageContent {
    pub fn flatten(&self) -> String {
        match self {
            InboundMessageContent::Text(text) => text.clone(),
            InboundMessageContent::Blocks(parts) => parts
                .iter()
                .filter(|p| matches!(p.r#type.as_str(), "input_text" | "output_text" | "text"))
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundTool {
    #[serde(rename = "type")]
    pub r#type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        id: String,
        status: &'static str,
        role: &'static str,
        content: Vec<OutputContent>,
    },
    FunctionCall {
        id: String,
        call_id: String,
        name: String,
        arguments: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText { text: String, annotations: Vec<Value> },
}
