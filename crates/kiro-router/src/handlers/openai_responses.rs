//! `POST /v1/responses` (§6).

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use kiro_adapters::openai_responses;
use kiro_common::{ClientError, ClientErrorKind};
use kiro_engine::{StreamDelta, StreamItem};
use kiro_protocol::openai_responses::request::CreateResponseRequest;
use kiro_protocol::{fingerprint_first_three, ToolUseItem};

use crate::error::openai_responses_error_response;
use crate::sse::{sse_response, wrap_with_heartbeat};
use crate::state::RouterState;

pub async fn responses(State(state): State<Arc<RouterState>>, Json(raw): Json<Value>) -> Response {
    let request: CreateResponseRequest = match serde_json::from_value(raw.clone()) {
        Ok(request) => request,
        Err(err) => {
            return openai_responses_error_response(&ClientError::new(ClientErrorKind::InvalidRequest, err.to_string()))
        }
    };

    // The Responses dialect has no flat `messages` array to fingerprint
    // against; `input` (whatever shape it took) stands in for it.
    let fingerprint = raw.get("input").map(|input| fingerprint_first_three(std::slice::from_ref(input)));
    let model = request.model.clone();
    let mut upstream = openai_responses::decode(&request);
    upstream.conversation_id = fingerprint.clone().unwrap_or_default();
    let request_id = Uuid::new_v4().to_string();

    if request.stream {
        return stream_responses(&state, upstream, fingerprint, request_id, model).await;
    }

    match state
        .engine
        .dispatch_once(upstream, fingerprint, state.history_budget, request_id, "openai_responses")
        .await
    {
        Ok(internal) => Json(openai_responses::encode_response(&model, &internal)).into_response(),
        Err(err) => openai_responses_error_response(&err),
    }
}

async fn stream_responses(
    state: &RouterState,
    upstream: kiro_protocol::UpstreamRequest,
    fingerprint: Option<String>,
    request_id: String,
    model: String,
) -> Response {
    let mut rx = match state
        .engine
        .dispatch_stream(upstream, fingerprint, state.history_budget, request_id, "openai_responses")
        .await
    {
        Ok(rx) => rx,
        Err(err) => return openai_responses_error_response(&err),
    };

    let (tx, out_rx) = mpsc::channel::<Bytes>(32);
    tokio::spawn(async move {
        let mut encoder = openai_responses::StreamEncoder::new(model);
        if tx.send(encoder.created()).await.is_err() {
            return;
        }
        let mut tool_uses: Vec<ToolUseItem> = Vec::new();
        while let Some(item) = rx.recv().await {
            match item {
                StreamItem::Delta(StreamDelta::Text(text)) => {
                    if tx.send(encoder.text_delta(&text)).await.is_err() {
                        return;
                    }
                }
                StreamItem::Delta(StreamDelta::ToolUse(complete)) => {
                    tool_uses.push(ToolUseItem { id: complete.tool_use_id, name: complete.name, input: complete.input });
                }
                StreamItem::Done { stop_reason, usage } => {
                    for frame in encoder.finish(stop_reason, usage, &tool_uses) {
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
