//! `POST /v1/chat/completions` (§6).

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use kiro_adapters::openai_chat;
use kiro_common::{ClientError, ClientErrorKind};
use kiro_engine::{StreamDelta, StreamItem};
use kiro_protocol::fingerprint_first_three;
use kiro_protocol::openai_chat::request::CreateChatCompletionRequest;

use crate::error::openai_chat_error_response;
use crate::sse::{sse_response, wrap_with_heartbeat};
use crate::state::RouterState;

pub async fn chat_completions(State(state): State<Arc<RouterState>>, Json(raw): Json<Value>) -> Response {
    let request: CreateChatCompletionRequest = match serde_json::from_value(raw.clone()) {
        Ok(request) => request,
        Err(err) => {
            return openai_chat_error_response(&ClientError::new(ClientErrorKind::InvalidRequest, err.to_string()))
        }
    };

    let fingerprint = raw.get("messages").and_then(Value::as_array).map(|m| fingerprint_first_three(m));
    let model = request.model.clone();
    let mut upstream = openai_chat::decode(&request);
    upstream.conversation_id = fingerprint.clone().unwrap_or_default();
    let request_id = Uuid::new_v4().to_string();

    if request.stream {
        return stream_chat_completions(&state, upstream, fingerprint, request_id, model).await;
    }

    match state
        .engine
        .dispatch_once(upstream, fingerprint, state.history_budget, request_id, "openai_chat")
        .await
    {
        Ok(internal) => Json(openai_chat::encode_response(&model, &internal)).into_response(),
        Err(err) => openai_chat_error_response(&err),
    }
}

async fn stream_chat_completions(
    state: &RouterState,
    upstream: kiro_protocol::UpstreamRequest,
    fingerprint: Option<String>,
    request_id: String,
    model: String,
) -> Response {
    let mut rx = match state
        .engine
        .dispatch_stream(upstream, fingerprint, state.history_budget, request_id, "openai_chat")
        .await
    {
        Ok(rx) => rx,
        Err(err) => return openai_chat_error_response(&err),
    };

    let (tx, out_rx) = mpsc::channel::<Bytes>(32);
    tokio::spawn(async move {
        let encoder = openai_chat::StreamEncoder::new(model);
        if tx.send(encoder.role_start()).await.is_err() {
            return;
        }
        let mut tool_call_index: u32 = 0;
        while let Some(item) = rx.recv().await {
            match item {
                StreamItem::Delta(StreamDelta::Text(text)) => {
                    if tx.send(encoder.text_delta(&text)).await.is_err() {
                        return;
                    }
                }
                StreamItem::Delta(StreamDelta::ToolUse(complete)) => {
                    let frame = encoder.tool_call_delta(
                        tool_call_index,
                        Some(&complete.tool_use_id),
                        Some(&complete.name),
                        &complete.input.to_string(),
                    );
                    tool_call_index += 1;
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                }
                StreamItem::Done { stop_reason, .. } => {
                    for frame in encoder.finish(stop_reason) {
                        if tx.send(frame).await.is_err() {
                            return;
                        }
                    }
                    return;
                }
                StreamItem::Errored(_) => {
                    // OpenAI Chat's SSE stream has no mid-stream error frame
                    // shape; end the stream the same way a normal finish
                    // would, the client is left with a truncated message.
                    for frame in encoder.finish(kiro_protocol::StopReason::Error) {
                        let _ = tx.send(frame).await;
                    }
                    return;
                }
            }
        }
    });

    sse_response(wrap_with_heartbeat(out_rx))
}
