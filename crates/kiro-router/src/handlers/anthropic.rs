//! `POST /v1/messages` (§6).

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use kiro_adapters::anthropic;
use kiro_common::{ClientError, ClientErrorKind};
use kiro_engine::{StreamDelta, StreamItem};
use kiro_protocol::anthropic::request::CreateMessageRequest;
use kiro_protocol::fingerprint_first_three;

use crate::error::anthropic_error_response;
use crate::sse::{sse_response, wrap_with_heartbeat};
use crate::state::RouterState;

pub async fn messages(State(state): State<Arc<RouterState>>, Json(raw): Json<Value>) -> Response {
    let request: CreateMessageRequest = match serde_json::from_value(raw.clone()) {
        Ok(request) => request,
        Err(err) => {
            return anthropic_error_response(&ClientError::new(ClientErrorKind::InvalidRequest, err.to_string()))
        }
    };

    let fingerprint = raw.get("messages").and_then(Value::as_array).map(|m| fingerprint_first_three(m));
    let model = request.model.clone();
    let mut upstream = anthropic::decode(&request);
    upstream.conversation_id = fingerprint.clone().unwrap_or_default();
    let request_id = Uuid::new_v4().to_string();

    if request.stream {
        return stream_messages(&state, upstream, fingerprint, request_id, model).await;
    }

    match state
        .engine
        .dispatch_once(upstream, fingerprint, state.history_budget, request_id, "anthropic")
        .await
    {
        Ok(internal) => Json(anthropic::encode_response(&model, &internal)).into_response(),
        Err(err) => anthropic_error_response(&err),
    }
}

async fn stream_messages(
    state: &RouterState,
    upstream: kiro_protocol::UpstreamRequest,
    fingerprint: Option<String>,
    request_id: String,
    model: String,
) -> Response {
    let mut rx = match state
        .engine
        .dispatch_stream(upstream, fingerprint, state.history_budget, request_id, "anthropic")
        .await
    {
        Ok(rx) => rx,
        Err(err) => return anthropic_error_response(&err),
    };

    let (tx, out_rx) = mpsc::channel::<Bytes>(32);
    tokio::spawn(async move {
        let mut encoder = anthropic::StreamEncoder::new(model);
        if tx.send(encoder.message_start()).await.is_err() {
            return;
        }
        while let Some(item) = rx.recv().await {
            match item {
                StreamItem::Delta(StreamDelta::Text(text)) => {
                    for frame in encoder.text_delta(&text) {
                        if tx.send(frame).await.is_err() {
                            return;
                        }
                    }
                }
                StreamItem::Delta(StreamDelta::ToolUse(complete)) => {
                    for frame in encoder.tool_use_start(&complete.tool_use_id, &complete.name) {
                        if tx.send(frame).await.is_err() {
                            return;
                        }
                    }
                    if tx.send(encoder.tool_use_delta(&complete.input.to_string())).await.is_err() {
                        return;
                    }
                }
                StreamItem::Done { stop_reason, usage } => {
                    for frame in encoder.finish(stop_reason, usage) {
                        if tx.send(frame).await.is_err() {
                            return;
                        }
                    }
                    return;
                }
                StreamItem::Errored(message) => {
                    let _ = tx.send(encoder.error(&message)).await;
                    return;
                }
            }
        }
    });

    sse_response(wrap_with_heartbeat(out_rx))
}
