//! The axum route table for the five client-facing endpoints (§6),
//! grounded in the teacher's `proxy_router` (`gproxy-router/src/proxy.rs`)
//! but simplified: one upstream, one identity pool, no per-client API-key
//! layer or provider path prefix — the dialect is determined entirely by
//! which endpoint was hit.

pub mod error;
pub mod handlers;
pub mod sse;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

pub use state::RouterState;

pub fn router(state: Arc<RouterState>) -> Router {
    Router::new()
        .route("/v1/messages", post(handlers::anthropic::messages))
        .route("/v1/chat/completions", post(handlers::openai_chat::chat_completions))
        .route("/v1/responses", post(handlers::openai_responses::responses))
        .route("/v1beta/models/{model}", post(handlers::gemini::generate_content))
        .route("/v1/models", get(handlers::models::list_models))
        .with_state(state)
}
