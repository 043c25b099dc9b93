//! `POST /v1beta/models/{model}:generateContent` and
//! `:streamGenerateContent` (§6). Axum's path routing can't split on a
//! literal `:` mid-segment, so the `{model}` route captures
//! `"<model>:<action>"` whole and this handler splits it itself, mirroring
//! the teacher's `gemini_post`/`gemini_post_impl` split (`gproxy-router`).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::Value;
use uuid::Uuid;

use kiro_adapters::gemini;
use kiro_common::{ClientError, ClientErrorKind};
use kiro_engine::{StreamDelta, StreamItem};
use kiro_protocol::fingerprint_first_three;
use kiro_protocol::gemini::request::GenerateContentRequest;

use crate::error::gemini_error_response;
use crate::sse::ndjson_response;
use crate::state::RouterState;

pub async fn generate_content(
    State(state): State<Arc<RouterState>>,
    Path(model_action): Path<String>,
    Json(raw): Json<Value>,
) -> Response {
    let Some((model, action)) = model_action.split_once(':') else {
        return (StatusCode::BAD_REQUEST, "expected {model}:{action}").into_response();
    };
    let model = model.trim();
    let action = action.trim();

    let request: GenerateContentRequest = match serde_json::from_value(raw.clone()) {
        Ok(request) => request,
        Err(err) => return gemini_error_response(&ClientError::new(ClientErrorKind::InvalidRequest, err.to_string())),
    };

    let fingerprint = raw.get("contents").and_then(Value::as_array).map(|c| fingerprint_first_three(c));
    let mut upstream = gemini::decode(&request, model);
    upstream.conversation_id = fingerprint.clone().unwrap_or_default();
    let request_id = Uuid::new_v4().to_string();

    match action {
        "generateContent" => {
            match state
                .engine
                .dispatch_once(upstream, fingerprint, state.history_budget, request_id, "gemini")
                .await
            {
                Ok(internal) => Json(gemini::encode_response(&internal)).into_response(),
                Err(err) => gemini_error_response(&err),
            }
        }
        "streamGenerateContent" => stream_generate_content(&state, upstream, fingerprint, request_id).await,
        _ => (StatusCode::NOT_FOUND, "unknown_gemini_action").into_response(),
    }
}

async fn stream_generate_content(
    state: &RouterState,
    upstream: kiro_protocol::UpstreamRequest,
    fingerprint: Option<String>,
    request_id: String,
) -> Response {
    let mut rx = match state
        .engine
        .dispatch_stream(upstream, fingerprint, state.history_budget, request_id, "gemini")
        .await
    {
        Ok(rx) => rx,
        Err(err) => return gemini_error_response(&err),
    };

    let (tx, out_rx) = tokio::sync::mpsc::channel::<Bytes>(32);
    tokio::spawn(async move {
        let mut text_so_far = String::new();
        while let Some(item) = rx.recv().await {
            match item {
                StreamItem::Delta(StreamDelta::Text(text)) => {
                    text_so_far.push_str(&text);
                    let chunk = gemini::encode_stream_chunk(&text_so_far, None, kiro_protocol::Usage::default());
                    if tx.send(chunk).await.is_err() {
                        return;
                    }
                }
                StreamItem::Delta(StreamDelta::ToolUse(_)) => {
                    // Gemini tool-call streaming isn't part of this dialect's
                    // decode contract (§4.7); tool uses still land in the
                    // final chunk's text is not applicable here, so they're
                    // dropped from the stream rather than guessed at.
                }
                StreamItem::Done { stop_reason, usage } => {
                    let chunk = gemini::encode_stream_chunk(&text_so_far, Some(stop_reason), usage);
                    let _ = tx.send(chunk).await;
                    return;
                }
                StreamItem::Errored(_) => return,
            }
        }
    });

    ndjson_response(out_rx)
}
