//! C8: classifies an upstream failure into a policy decision the engine
//! acts on (§4.8). Body substring markers are configuration, not
//! hard-coded (§4.8, §9 Open Question resolution).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    RateLimit,
    AuthExpired,
    AuthInvalid,
    ContentTooLong,
    BadRequest,
    ServerError,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    ConnectionReset,
    Other,
}

/// Raw observation handed to the classifier: either a transport-level
/// failure (no HTTP response reached) or an HTTP response with a status
/// and body.
#[derive(Debug, Clone, Copy)]
pub enum Failure<'a> {
    Transport(TransportErrorKind),
    Http { status: u16, body: &'a str },
}

#[derive(Debug, Clone)]
pub struct ErrorMarkers {
    pub length_error: Vec<String>,
    pub quota: Vec<String>,
}

impl Default for ErrorMarkers {
    fn default() -> Self {
        ErrorMarkers {
            length_error: [
                "too long",
                "token limit",
                "context length",
                "input is too long",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            quota: ["quota", "monthly limit", "usage limit"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl ErrorMarkers {
    fn matches_length_error(&self, body: &str) -> bool {
        let lower = body.to_ascii_lowercase();
        self.length_error.iter().any(|m| lower.contains(&m.to_ascii_lowercase()))
    }

    fn matches_quota(&self, body: &str) -> bool {
        let lower = body.to_ascii_lowercase();
        self.quota.iter().any(|m| lower.contains(&m.to_ascii_lowercase()))
    }
}

fn matches_expired_token(body: &str) -> bool {
    body.to_ascii_lowercase().contains("expired token")
}

/// The classified outcome, driving the engine's retry loop (§4.8 table).
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub user_message: String,
    pub retry_same: bool,
    pub switch_account: bool,
    pub disable_account: bool,
    pub refresh_token: bool,
    pub is_length_error: bool,
}

impl ClassifiedError {
    fn new(kind: ErrorKind, user_message: impl Into<String>) -> Self {
        ClassifiedError {
            kind,
            user_message: user_message.into(),
            retry_same: false,
            switch_account: false,
            disable_account: false,
            refresh_token: false,
            is_length_error: false,
        }
    }
}

pub fn classify(failure: Failure<'_>, markers: &ErrorMarkers) -> ClassifiedError {
    match failure {
        Failure::Transport(_) => {
            let mut err = ClassifiedError::new(ErrorKind::Transient, "upstream connection failed");
            err.retry_same = true;
            err
        }
        Failure::Http { status, body } => classify_http(status, body, markers),
    }
}

fn classify_http(status: u16, body: &str, markers: &ErrorMarkers) -> ClassifiedError {
    if matches!(status, 502 | 503 | 504) {
        let mut err = ClassifiedError::new(ErrorKind::Transient, "upstream temporarily unavailable");
        err.retry_same = true;
        return err;
    }

    if status == 429 || markers.matches_quota(body) {
        let mut err = ClassifiedError::new(ErrorKind::RateLimit, "rate limit exceeded");
        err.switch_account = true;
        return err;
    }

    if status == 401 || matches_expired_token(body) {
        let mut err = ClassifiedError::new(ErrorKind::AuthExpired, "authentication expired");
        err.retry_same = true;
        err.switch_account = true;
        err.refresh_token = true;
        return err;
    }

    if status == 403 {
        let mut err = ClassifiedError::new(ErrorKind::AuthInvalid, "authentication invalid");
        err.switch_account = true;
        err.disable_account = true;
        return err;
    }

    if markers.matches_length_error(body) {
        let mut err = ClassifiedError::new(ErrorKind::ContentTooLong, "request content too long");
        err.retry_same = true;
        err.is_length_error = true;
        return err;
    }

    if status == 400 {
        return ClassifiedError::new(ErrorKind::BadRequest, "invalid request");
    }

    if (500..600).contains(&status) {
        let mut err = ClassifiedError::new(ErrorKind::ServerError, "upstream server error");
        err.switch_account = true;
        return err;
    }

    ClassifiedError::new(ErrorKind::Unknown, "unexpected upstream error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_5xx_family_is_transient() {
        let markers = ErrorMarkers::default();
        for status in [502, 503, 504] {
            let classified = classify(Failure::Http { status, body: "" }, &markers);
            assert_eq!(classified.kind, ErrorKind::Transient);
            assert!(classified.retry_same);
            assert!(!classified.switch_account);
        }
    }

    #[test]
    fn rate_limit_by_status_or_body_marker() {
        let markers = ErrorMarkers::default();
        let by_status = classify(Failure::Http { status: 429, body: "" }, &markers);
        assert_eq!(by_status.kind, ErrorKind::RateLimit);
        let by_body = classify(Failure::Http { status: 200, body: "monthly limit reached" }, &markers);
        assert_eq!(by_body.kind, ErrorKind::RateLimit);
    }

    #[test]
    fn auth_expired_triggers_refresh_and_retry() {
        let markers = ErrorMarkers::default();
        let classified = classify(Failure::Http { status: 401, body: "" }, &markers);
        assert_eq!(classified.kind, ErrorKind::AuthExpired);
        assert!(classified.refresh_token);
        assert!(classified.retry_same);
        assert!(classified.switch_account);
    }

    #[test]
    fn auth_invalid_disables_and_switches() {
        let markers = ErrorMarkers::default();
        let classified = classify(Failure::Http { status: 403, body: "forbidden" }, &markers);
        assert_eq!(classified.kind, ErrorKind::AuthInvalid);
        assert!(classified.disable_account);
        assert!(classified.switch_account);
    }

    #[test]
    fn content_too_long_is_detected_from_body_regardless_of_status() {
        let markers = ErrorMarkers::default();
        let classified = classify(Failure::Http { status: 400, body: "input is too long for model" }, &markers);
        assert_eq!(classified.kind, ErrorKind::ContentTooLong);
        assert!(classified.is_length_error);
        assert!(classified.retry_same);
    }

    #[test]
    fn plain_400_is_bad_request() {
        let markers = ErrorMarkers::default();
        let classified = classify(Failure::Http { status: 400, body: "missing field" }, &markers);
        assert_eq!(classified.kind, ErrorKind::BadRequest);
        assert!(!classified.retry_same && !classified.switch_account);
    }

    #[test]
    fn transport_failure_is_transient() {
        let markers = ErrorMarkers::default();
        let classified = classify(Failure::Transport(TransportErrorKind::Timeout), &markers);
        assert_eq!(classified.kind, ErrorKind::Transient);
        assert!(classified.retry_same);
    }

    #[test]
    fn unmatched_status_falls_through_to_unknown() {
        let markers = ErrorMarkers::default();
        let classified = classify(Failure::Http { status: 418, body: "" }, &markers);
        assert_eq!(classified.kind, ErrorKind::Unknown);
    }
}
