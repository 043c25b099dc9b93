use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct SystemInstruction {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundContent {
    #[serde(default = "default_role")]
    pub role: Role,
    pub parts: Vec<Part>,
}

fn default_role() -> Role {
    Role::User
}

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub content: OutboundContent,
    pub finish_reason: &'static str,
    pub index: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundContent {
    pub role: &'static str,
    pub parts: Vec<OutboundPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundPart {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageMetadata {
    pub prompt_token_count: u32,
    pub candidates_token_count: u32,
    pub total_token_count: u32,
}
