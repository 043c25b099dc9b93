//! Streaming response envelopes shared across dialects. Heartbeat
//! wrapping is grounded in the teacher's `wrap_sse_stream_with_heartbeat`
//! (`gproxy-router/src/proxy.rs`): a 15-second `: keep-alive\n\n` comment
//! frame interleaved via `tokio::select!` so idle SSE connections survive
//! intermediary read timeouts.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const HEARTBEAT_FRAME: &[u8] = b": keep-alive\n\n";

/// Interleaves a heartbeat frame into `upstream_rx` on a 15-second
/// ticker, returning a new channel the handler streams from instead.
pub fn wrap_with_heartbeat(mut upstream_rx: mpsc::Receiver<Bytes>) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel::<Bytes>(32);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                chunk = upstream_rx.recv() => {
                    let Some(chunk) = chunk else { break };
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if tx.send(Bytes::from_static(HEARTBEAT_FRAME)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// Renders a byte-chunk channel as a `text/event-stream` response
/// (Anthropic, OpenAI Chat, OpenAI Responses).
pub fn sse_response(rx: mpsc::Receiver<Bytes>) -> Response {
    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| (StatusCode::INTERNAL_SERVER_ERROR, "response_build_failed").into_response())
}

/// Renders a byte-chunk channel as newline-delimited JSON (Gemini
/// `streamGenerateContent`). No heartbeat: a bare keep-alive line would
/// corrupt NDJSON framing.
pub fn ndjson_response(rx: mpsc::Receiver<Bytes>) -> Response {
    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| (StatusCode::INTERNAL_SERVER_ERROR, "response_build_failed").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_upstream_chunks_through_untouched() {
        let (tx, rx) = mpsc::channel::<Bytes>(4);
        let mut out = wrap_with_heartbeat(rx);
        tx.send(Bytes::from_static(b"data: hi\n\n")).await.unwrap();
        drop(tx);
        assert_eq!(out.recv().await.unwrap(), Bytes::from_static(b"data: hi\n\n"));
        assert!(out.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn emits_a_heartbeat_frame_after_a_quiet_interval() {
        let (tx, rx) = mpsc::channel::<Bytes>(4);
        let mut out = wrap_with_heartbeat(rx);
        tokio::time::advance(HEARTBEAT_INTERVAL + Duration::from_millis(1)).await;
        assert_eq!(out.recv().await.unwrap(), Bytes::from_static(HEARTBEAT_FRAME));
        drop(tx);
    }
}
