pub mod anthropic;
pub mod gemini;
pub mod models;
pub mod openai_chat;
pub mod openai_responses;
