//! Upstream HTTP client, grounded in the teacher's `wreq`-based
//! `WreqUpstreamClient` (`upstream_client/mod.rs`): a thin wrapper that
//! turns a `wreq::Client` response into either a buffered `Bytes` body or
//! a channel-fed byte stream, and classifies transport failures into the
//! same three-way `TransportErrorKind` the error classifier (C8) expects.

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use wreq::{Client, Method};

use kiro_adapters::classify::TransportErrorKind;

#[derive(Debug)]
pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(tokio::sync::mpsc::Receiver<Bytes>),
}

#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: UpstreamBody,
}

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub want_stream: bool,
}

#[derive(Debug, Clone)]
pub struct UpstreamTransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

/// Wraps a `wreq::Client` built once at startup and reused across
/// requests (connection pooling is the point — §5 resource lifecycle
/// only scopes the *connection*, not the client, to a request).
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    non_stream_timeout: Duration,
    stream_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(non_stream_timeout: Duration, stream_timeout: Duration) -> Result<Self, wreq::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(stream_timeout)
            .build()?;
        Ok(Self { client, non_stream_timeout, stream_timeout })
    }

    pub async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamTransportError> {
        let timeout = if request.want_stream { self.stream_timeout } else { self.non_stream_timeout };
        let mut builder = self.client.request(Method::POST, &request.url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = builder.body(request.body);

        let response = builder.send().await.map_err(map_wreq_error)?;
        let status = response.status().as_u16();

        if !request.want_stream || !(200..300).contains(&status) {
            let bytes = response.bytes().await.map_err(map_wreq_error)?;
            return Ok(UpstreamResponse { status, body: UpstreamBody::Bytes(bytes) });
        }

        let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(16);
        let idle = self.stream_timeout;
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            loop {
                let next = tokio::time::timeout(idle, stream.next()).await;
                let Ok(item) = next else { break };
                let Some(item) = item else { break };
                let Ok(chunk) = item else { break };
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });

        Ok(UpstreamResponse { status, body: UpstreamBody::Stream(rx) })
    }
}

fn map_wreq_error(err: wreq::Error) -> UpstreamTransportError {
    UpstreamTransportError { kind: classify_wreq_error(&err), message: err.to_string() }
}

fn classify_wreq_error(err: &wreq::Error) -> TransportErrorKind {
    if err.is_timeout() {
        return TransportErrorKind::Timeout;
    }
    if err.is_connect() {
        return TransportErrorKind::ConnectionReset;
    }
    TransportErrorKind::Other
}
