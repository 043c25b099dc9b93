//! C9: the request engine. One request's worth of control flow — pick an
//! identity, dispatch upstream, classify failures, retry or switch within
//! a shared attempt budget, and (for streaming) relay decoded deltas with
//! no further retry once the first byte has reached the client.
//!
//! Grounded in the teacher's `proxy_engine` dispatch loop, but purpose-built
//! for this protocol's single upstream operation rather than mirroring the
//! teacher's generic multi-provider-op dispatch table.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use tokio::sync::mpsc;

use kiro_adapters::classify::{classify, ClassifiedError, ErrorKind, ErrorMarkers, Failure};
use kiro_adapters::history;
use kiro_adapters::HistoryBudget;
use kiro_common::{ClientError, ClientErrorKind, IdentityId};
use kiro_identity::{CooldownReason, CooldownTable, CredentialStore, Identity, RateLimiter, Scheduler, StoreError, DEFAULT_COOLDOWN};
use kiro_protocol::{
    EventStreamDecoder, InternalResponse, StopReason, ToolUseAssembler, ToolUseComplete, ToolUseItem,
    Usage, UpstreamRequest,
};

use crate::events::{Event, EventHub};
use crate::upstream::{self, UpstreamBody, UpstreamClient};
use crate::wire;

const MAX_ATTEMPTS: u32 = 3;
const MAX_TRANSIENT_RETRIES: u32 = 2;
const MAX_LENGTH_RETRIES: u32 = 2;
/// Refresh proactively once a token is within this many seconds of expiry
/// (§4.9 step 3).
const PRE_REFRESH_SKEW_SECS: i64 = 300;

/// One chunk of a streaming response, relayed to the client as it decodes
/// (§4.9 streaming state machine).
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    Text(String),
    ToolUse(ToolUseComplete),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Delta(StreamDelta),
    Done { stop_reason: StopReason, usage: Usage },
    /// Upstream failed after the stream was already flowing to the client.
    /// Never retried or switched (§4.9: once `Streaming` begins, account
    /// switching is not attempted).
    Errored(String),
}

enum FailureAction {
    RetrySame,
    Switch,
    Fatal(ClientError),
}

/// Drives C2-C5 and C8 through one request's dispatch loop.
pub struct RequestEngine {
    store: Arc<CredentialStore>,
    scheduler: Arc<Scheduler>,
    cooldowns: Arc<CooldownTable>,
    rate_limiter: Arc<RateLimiter>,
    upstream: UpstreamClient,
    events: EventHub,
    error_markers: ErrorMarkers,
    upstream_url: String,
}

impl RequestEngine {
    pub fn new(
        store: Arc<CredentialStore>,
        scheduler: Arc<Scheduler>,
        cooldowns: Arc<CooldownTable>,
        rate_limiter: Arc<RateLimiter>,
        upstream: UpstreamClient,
        events: EventHub,
        error_markers: ErrorMarkers,
        upstream_url: String,
    ) -> Self {
        Self { store, scheduler, cooldowns, rate_limiter, upstream, events, error_markers, upstream_url }
    }

    async fn ensure_credentials(&self, identity: &Identity) -> Result<kiro_identity::Credentials, ClassifiedError> {
        let creds = self.store.get(&identity.id).await.map_err(credential_failure)?;
        if creds.expiring_soon(PRE_REFRESH_SKEW_SECS) {
            return self.store.refresh(&identity.id).await.map_err(credential_failure);
        }
        Ok(creds)
    }

    async fn wait_for_rate_limit(&self, identity: &Identity) {
        loop {
            let (ok, wait_seconds, _reason) = self.rate_limiter.can_request(&identity.id).await;
            if ok {
                return;
            }
            tokio::time::sleep(Duration::from_secs_f64(wait_seconds)).await;
        }
    }

    /// Establishes one attempt: credentials, rate-limit wait, build the
    /// wire request, send it. Returns the raw response on a 2xx status;
    /// everything else (transport failure or non-2xx) comes back
    /// classified so the caller can decide retry/switch/fatal.
    async fn try_once(
        &self,
        identity: &Identity,
        request: &UpstreamRequest,
        want_stream: bool,
    ) -> Result<upstream::UpstreamResponse, ClassifiedError> {
        let credentials = self.ensure_credentials(identity).await?;
        self.wait_for_rate_limit(identity).await;

        let body = wire::build_body(request, &credentials);
        let headers = wire::build_headers(&credentials);
        let wire_request = upstream::UpstreamRequest {
            url: self.upstream_url.clone(),
            headers,
            body: Bytes::from(body),
            want_stream,
        };

        let response = self
            .upstream
            .send(wire_request)
            .await
            .map_err(|transport_err| classify(Failure::Transport(transport_err.kind), &self.error_markers))?;

        if (200..300).contains(&response.status) {
            return Ok(response);
        }

        let body_text = match &response.body {
            UpstreamBody::Bytes(bytes) => String::from_utf8_lossy(bytes).to_string(),
            UpstreamBody::Stream(_) => String::new(),
        };
        Err(classify(Failure::Http { status: response.status, body: &body_text }, &self.error_markers))
    }

    /// Applies the §4.8 policy table to one classified failure, mutating
    /// the per-request retry counters and (for `content_too_long`) the
    /// history budget in place.
    async fn handle_failure(
        &self,
        classified: ClassifiedError,
        identity: &Identity,
        request: &mut UpstreamRequest,
        budget: &mut HistoryBudget,
        transient_retries: &mut u32,
        length_retries: &mut u32,
        auth_retried: &mut HashSet<IdentityId>,
    ) -> FailureAction {
        match classified.kind {
            ErrorKind::Transient => {
                if *transient_retries < MAX_TRANSIENT_RETRIES {
                    let backoff = 0.5 * 2f64.powi(*transient_retries as i32);
                    *transient_retries += 1;
                    tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                    FailureAction::RetrySame
                } else {
                    FailureAction::Fatal(ClientError::new(ClientErrorKind::OverloadedError, classified.user_message))
                }
            }
            ErrorKind::RateLimit => {
                self.cooldowns.mark(&identity.id, CooldownReason::RateLimit, DEFAULT_COOLDOWN).await;
                let jitter_ms = rand::rng().random_range(0..=250);
                tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
                FailureAction::Switch
            }
            ErrorKind::AuthExpired => {
                if auth_retried.insert(identity.id.clone()) {
                    // Best effort: if the refresh itself fails, the next
                    // attempt on the same identity will fail again and fall
                    // into the `else` branch below, which switches.
                    let _ = self.store.refresh(&identity.id).await;
                    FailureAction::RetrySame
                } else {
                    FailureAction::Switch
                }
            }
            ErrorKind::AuthInvalid => {
                self.store.disable(&identity.id).await;
                self.cooldowns.mark(&identity.id, CooldownReason::AuthInvalid, DEFAULT_COOLDOWN).await;
                FailureAction::Switch
            }
            ErrorKind::ContentTooLong => {
                if *length_retries < MAX_LENGTH_RETRIES {
                    *length_retries += 1;
                    *budget = budget.halved();
                    history::enforce(&mut request.history, budget);
                    FailureAction::RetrySame
                } else {
                    FailureAction::Fatal(ClientError::new(ClientErrorKind::InvalidRequest, classified.user_message))
                }
            }
            ErrorKind::ServerError => FailureAction::Switch,
            ErrorKind::BadRequest => FailureAction::Fatal(ClientError::new(ClientErrorKind::InvalidRequest, classified.user_message)),
            ErrorKind::Unknown => FailureAction::Fatal(ClientError::new(ClientErrorKind::ApiError, classified.user_message)),
        }
    }

    async fn switch_identity(
        &self,
        request_id: &str,
        current: &Identity,
    ) -> Result<Identity, ClientError> {
        match self.scheduler.next_other_than(&current.id).await {
            Some(next) => {
                self.events
                    .emit(Event::IdentitySwitched {
                        request_id: request_id.to_string(),
                        from: Some(current.id.clone()),
                        to: next.id.clone(),
                        reason: "previous identity failed",
                    })
                    .await;
                Ok(next)
            }
            None => Err(ClientError::all_accounts_unavailable()),
        }
    }

    /// Buffered dispatch: retries/switches per §4.8, fully decoding the
    /// upstream event-stream body once a 2xx response lands.
    pub async fn dispatch_once(
        &self,
        mut request: UpstreamRequest,
        fingerprint: Option<String>,
        mut budget: HistoryBudget,
        request_id: String,
        dialect: &'static str,
    ) -> Result<InternalResponse, ClientError> {
        self.events.emit(Event::RequestStarted { request_id: request_id.clone(), dialect }).await;
        history::enforce(&mut request.history, &budget);

        let mut identity = match self.scheduler.pick(fingerprint.as_deref()).await {
            Some(identity) => identity,
            None => {
                let err = ClientError::all_accounts_unavailable();
                self.events
                    .emit(Event::RequestErrored { request_id, identity: None, message: err.message.clone() })
                    .await;
                return Err(err);
            }
        };

        let mut transient_retries = 0u32;
        let mut length_retries = 0u32;
        let mut auth_retried: HashSet<IdentityId> = HashSet::new();
        let mut last_message = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                self.events
                    .emit(Event::RetryAttempted { request_id: request_id.clone(), attempt, reason: "previous attempt failed" })
                    .await;
            }

            let classified = match self.try_once(&identity, &request, false).await {
                Ok(response) => {
                    let bytes = match response.body {
                        UpstreamBody::Bytes(bytes) => bytes,
                        UpstreamBody::Stream(_) => unreachable!("non-streaming dispatch never requests a stream body"),
                    };
                    match decode_event_stream_bytes(&bytes) {
                        Ok(internal) => {
                            self.store.record_use(&identity.id).await;
                            self.events
                                .emit(Event::RequestCompleted { request_id, identity: identity.id.clone() })
                                .await;
                            return Ok(internal);
                        }
                        Err(message) => classify(Failure::Http { status: 200, body: &message }, &self.error_markers),
                    }
                }
                Err(classified) => classified,
            };

            self.store.record_error(&identity.id).await;
            last_message = classified.user_message.clone();

            match self
                .handle_failure(classified, &identity, &mut request, &mut budget, &mut transient_retries, &mut length_retries, &mut auth_retried)
                .await
            {
                FailureAction::RetrySame => continue,
                FailureAction::Switch => match self.switch_identity(&request_id, &identity).await {
                    Ok(next) => {
                        identity = next;
                        continue;
                    }
                    Err(err) => {
                        self.events
                            .emit(Event::RequestErrored { request_id, identity: Some(identity.id.clone()), message: err.message.clone() })
                            .await;
                        return Err(err);
                    }
                },
                FailureAction::Fatal(err) => {
                    self.events
                        .emit(Event::RequestErrored { request_id, identity: Some(identity.id.clone()), message: err.message.clone() })
                        .await;
                    return Err(err);
                }
            }
        }

        let err = ClientError::api_error(format!("exhausted retry budget: {last_message}"));
        self.events
            .emit(Event::RequestErrored { request_id, identity: Some(identity.id.clone()), message: err.message.clone() })
            .await;
        Err(err)
    }

    /// Streaming dispatch: identical retry/switch policy up through the
    /// first 2xx response, then hands off to a relay task that decodes
    /// frames with no further retry or switch (§4.9).
    pub async fn dispatch_stream(
        &self,
        mut request: UpstreamRequest,
        fingerprint: Option<String>,
        mut budget: HistoryBudget,
        request_id: String,
        dialect: &'static str,
    ) -> Result<mpsc::Receiver<StreamItem>, ClientError> {
        self.events.emit(Event::RequestStarted { request_id: request_id.clone(), dialect }).await;
        history::enforce(&mut request.history, &budget);

        let mut identity = match self.scheduler.pick(fingerprint.as_deref()).await {
            Some(identity) => identity,
            None => {
                let err = ClientError::all_accounts_unavailable();
                self.events
                    .emit(Event::RequestErrored { request_id, identity: None, message: err.message.clone() })
                    .await;
                return Err(err);
            }
        };

        let mut transient_retries = 0u32;
        let mut length_retries = 0u32;
        let mut auth_retried: HashSet<IdentityId> = HashSet::new();
        let mut last_message = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                self.events
                    .emit(Event::RetryAttempted { request_id: request_id.clone(), attempt, reason: "previous attempt failed" })
                    .await;
            }

            match self.try_once(&identity, &request, true).await {
                Ok(response) => {
                    let rx = match response.body {
                        UpstreamBody::Stream(rx) => rx,
                        UpstreamBody::Bytes(_) => unreachable!("a 2xx streaming response always yields a stream body"),
                    };
                    let (tx, out_rx) = mpsc::channel(32);
                    let store = self.store.clone();
                    let events = self.events.clone();
                    let identity_id = identity.id.clone();
                    tokio::spawn(relay_stream(rx, tx, store, events, identity_id, request_id));
                    return Ok(out_rx);
                }
                Err(classified) => {
                    self.store.record_error(&identity.id).await;
                    last_message = classified.user_message.clone();

                    match self
                        .handle_failure(classified, &identity, &mut request, &mut budget, &mut transient_retries, &mut length_retries, &mut auth_retried)
                        .await
                    {
                        FailureAction::RetrySame => continue,
                        FailureAction::Switch => match self.switch_identity(&request_id, &identity).await {
                            Ok(next) => {
                                identity = next;
                                continue;
                            }
                            Err(err) => {
                                self.events
                                    .emit(Event::RequestErrored { request_id, identity: Some(identity.id.clone()), message: err.message.clone() })
                                    .await;
                                return Err(err);
                            }
                        },
                        FailureAction::Fatal(err) => {
                            self.events
                                .emit(Event::RequestErrored { request_id, identity: Some(identity.id.clone()), message: err.message.clone() })
                                .await;
                            return Err(err);
                        }
                    }
                }
            }
        }

        let err = ClientError::api_error(format!("exhausted retry budget: {last_message}"));
        self.events
            .emit(Event::RequestErrored { request_id, identity: Some(identity.id.clone()), message: err.message.clone() })
            .await;
        Err(err)
    }
}

fn credential_failure(err: StoreError) -> ClassifiedError {
    ClassifiedError {
        kind: ErrorKind::AuthExpired,
        user_message: format!("credential error: {err}"),
        retry_same: false,
        switch_account: true,
        disable_account: false,
        refresh_token: false,
        is_length_error: false,
    }
}

/// Fully decodes a buffered upstream event-stream body (non-streaming
/// dispatch). The upstream protocol never emits a usage frame (§4.1), so
/// `Usage` always comes back zeroed.
fn decode_event_stream_bytes(bytes: &[u8]) -> Result<InternalResponse, String> {
    let mut decoder = EventStreamDecoder::new();
    let mut assembler = ToolUseAssembler::new();
    let mut text = String::new();
    let mut tool_uses = Vec::new();
    let mut stop_reason = StopReason::EndTurn;

    let mut frames = decoder.push_bytes(bytes);
    frames.extend(decoder.finish());

    for frame in frames {
        match frame {
            kiro_protocol::UpstreamFrame::AssistantResponse { content } => text.push_str(&content),
            kiro_protocol::UpstreamFrame::ToolUse { tool_use_id, name, input_fragment, stop } => {
                if let Some(complete) = assembler.push(&tool_use_id, name.as_deref(), input_fragment.as_deref(), stop) {
                    stop_reason = StopReason::ToolUse;
                    tool_uses.push(ToolUseItem { id: complete.tool_use_id, name: complete.name, input: complete.input });
                }
            }
            kiro_protocol::UpstreamFrame::Error { message } => return Err(message),
            kiro_protocol::UpstreamFrame::Unknown(_) => {}
        }
    }

    Ok(InternalResponse { text_fragments: vec![text], tool_uses, stop_reason, usage: Usage::default() })
}

/// Runs once a streaming connection is established: no retry, no switch,
/// just decode-and-forward until the channel closes or an error frame
/// arrives (§4.9 `Streaming -> Completed | Errored`).
async fn relay_stream(
    mut rx: mpsc::Receiver<Bytes>,
    tx: mpsc::Sender<StreamItem>,
    store: Arc<CredentialStore>,
    events: EventHub,
    identity_id: IdentityId,
    request_id: String,
) {
    let mut decoder = EventStreamDecoder::new();
    let mut assembler = ToolUseAssembler::new();
    let mut stop_reason = StopReason::EndTurn;

    while let Some(chunk) = rx.recv().await {
        for frame in decoder.push_bytes(&chunk) {
            match frame {
                kiro_protocol::UpstreamFrame::AssistantResponse { content } => {
                    if tx.send(StreamItem::Delta(StreamDelta::Text(content))).await.is_err() {
                        return;
                    }
                }
                kiro_protocol::UpstreamFrame::ToolUse { tool_use_id, name, input_fragment, stop } => {
                    if let Some(complete) = assembler.push(&tool_use_id, name.as_deref(), input_fragment.as_deref(), stop) {
                        stop_reason = StopReason::ToolUse;
                        if tx.send(StreamItem::Delta(StreamDelta::ToolUse(complete))).await.is_err() {
                            return;
                        }
                    }
                }
                kiro_protocol::UpstreamFrame::Error { message } => {
                    store.record_error(&identity_id).await;
                    events
                        .emit(Event::RequestErrored { request_id, identity: Some(identity_id), message: message.clone() })
                        .await;
                    let _ = tx.send(StreamItem::Errored(message)).await;
                    return;
                }
                kiro_protocol::UpstreamFrame::Unknown(_) => {}
            }
        }
    }

    decoder.finish();
    store.record_use(&identity_id).await;
    events.emit(Event::RequestCompleted { request_id, identity: identity_id }).await;
    let _ = tx.send(StreamItem::Done { stop_reason, usage: Usage::default() }).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use kiro_common::IdentityStatus;
    use kiro_identity::{CredentialRefresher, RefreshError};

    struct NoopRefresher;

    #[async_trait]
    impl CredentialRefresher for NoopRefresher {
        async fn refresh(&self, _identity: &Identity, current: &kiro_identity::Credentials) -> Result<kiro_identity::Credentials, RefreshError> {
            Ok(current.clone())
        }
    }

    fn identity(id: &str) -> Identity {
        Identity {
            id: IdentityId::from(id),
            display_name: id.to_string(),
            enabled: true,
            credential_path: format!("/tmp/does-not-exist-{id}.json"),
            request_count: 0,
            error_count: 0,
            last_used: None,
            status: IdentityStatus::Active,
            affinity_opt_in: true,
        }
    }

    fn request() -> UpstreamRequest {
        UpstreamRequest {
            conversation_id: "conv".to_string(),
            model_id: "MODEL".to_string(),
            history: Vec::new(),
            current_user_text: "hi".to_string(),
            current_tool_results: Vec::new(),
            tool_catalog: None,
            origin: UpstreamRequest::ORIGIN.to_string(),
        }
    }

    #[test]
    fn decodes_a_buffered_assistant_response_frame() {
        let headers_len: u32 = 0;
        let payload = br#"{"assistantResponseEvent":{"content":"hello"}}"#;
        let total_len = (16 + headers_len as usize + payload.len()) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&total_len.to_be_bytes());
        bytes.extend_from_slice(&headers_len.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(&[0u8; 4]);

        let internal = decode_event_stream_bytes(&bytes).unwrap();
        assert_eq!(internal.text(), "hello");
        assert_eq!(internal.stop_reason, StopReason::EndTurn);
    }

    #[test]
    fn buffered_error_frame_surfaces_as_err() {
        let headers_len: u32 = 0;
        let payload = br#"{"__type":"ThrottlingException","message":"too many requests"}"#;
        let total_len = (16 + headers_len as usize + payload.len()) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&total_len.to_be_bytes());
        bytes.extend_from_slice(&headers_len.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(&[0u8; 4]);

        let err = decode_event_stream_bytes(&bytes).unwrap_err();
        assert_eq!(err, "too many requests");
    }

    #[tokio::test]
    async fn all_accounts_unavailable_when_pool_is_empty() {
        let store = Arc::new(CredentialStore::new(Arc::new(NoopRefresher)));
        let cooldowns = Arc::new(CooldownTable::new());
        let scheduler = Arc::new(Scheduler::new(store.clone(), cooldowns.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(kiro_identity::RateLimitConfig::default()));
        let upstream = UpstreamClient::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        let engine = RequestEngine::new(
            store,
            scheduler,
            cooldowns,
            rate_limiter,
            upstream,
            EventHub::new(16),
            ErrorMarkers::default(),
            "http://127.0.0.1:0/unused".to_string(),
        );

        let err = engine
            .dispatch_once(request(), None, HistoryBudget::default(), "req-1".to_string(), "anthropic")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ClientErrorKind::OverloadedError);
    }

    #[tokio::test]
    async fn switch_identity_skips_the_failing_one() {
        let store = Arc::new(CredentialStore::new(Arc::new(NoopRefresher)));
        store.register(identity("a")).await;
        store.register(identity("b")).await;
        let cooldowns = Arc::new(CooldownTable::new());
        let scheduler = Arc::new(Scheduler::new(store.clone(), cooldowns.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(kiro_identity::RateLimitConfig::default()));
        let upstream = UpstreamClient::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        let engine = RequestEngine::new(
            store,
            scheduler,
            cooldowns,
            rate_limiter,
            upstream,
            EventHub::new(16),
            ErrorMarkers::default(),
            "http://127.0.0.1:0/unused".to_string(),
        );

        let alt = engine.switch_identity("req-1", &identity("a")).await.unwrap();
        assert_eq!(alt.id.as_str(), "b");
    }
}
