use std::fmt;

/// The error taxonomy actually surfaced to clients (§7 ERROR HANDLING DESIGN).
///
/// This is deliberately narrower than the internal classifier kind in
/// `kiro-adapters::classify` — most internal kinds are fully recovered
/// inside the engine (retried, switched, truncated) and never reach here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
    InvalidRequest,
    AuthenticationError,
    PermissionError,
    NotFound,
    RateLimitError,
    ApiError,
    OverloadedError,
    Timeout,
}

impl ClientErrorKind {
    /// The HTTP status the router should answer with.
    pub fn http_status(self) -> u16 {
        match self {
            ClientErrorKind::InvalidRequest => 400,
            ClientErrorKind::AuthenticationError => 401,
            ClientErrorKind::PermissionError => 403,
            ClientErrorKind::NotFound => 404,
            ClientErrorKind::RateLimitError => 429,
            ClientErrorKind::Timeout => 504,
            ClientErrorKind::OverloadedError => 503,
            ClientErrorKind::ApiError => 500,
        }
    }

    /// Wire name used in the dialect-shaped error envelopes (§6).
    pub fn wire_type(self) -> &'static str {
        match self {
            ClientErrorKind::InvalidRequest => "invalid_request_error",
            ClientErrorKind::AuthenticationError => "authentication_error",
            ClientErrorKind::PermissionError => "permission_error",
            ClientErrorKind::NotFound => "not_found_error",
            ClientErrorKind::RateLimitError => "rate_limit_error",
            ClientErrorKind::ApiError => "api_error",
            ClientErrorKind::OverloadedError => "overloaded_error",
            ClientErrorKind::Timeout => "timeout_error",
        }
    }
}

/// A fault that has exhausted the engine's retry budget and must be
/// reported to the client. Never carries upstream internals (profileArn,
/// accessToken, machine-id) in `message` — §7 forbids leaking those.
#[derive(Debug, Clone)]
pub struct ClientError {
    pub kind: ClientErrorKind,
    pub message: String,
}

impl ClientError {
    pub fn new(kind: ClientErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn api_error(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::ApiError, message)
    }

    pub fn all_accounts_unavailable() -> Self {
        Self::new(
            ClientErrorKind::OverloadedError,
            "all accounts unavailable",
        )
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.wire_type(), self.message)
    }
}

impl std::error::Error for ClientError {}
