//! Dialect-shaped error envelopes (§6, §7): every handler renders a
//! `ClientError` through its own dialect's wire shape rather than a
//! generic JSON body, so a client-side SDK's error parsing still works
//! on a failure response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use kiro_adapters::gemini;
use kiro_common::ClientError;
use kiro_protocol::anthropic::response::ErrorEnvelope as AnthropicErrorEnvelope;
use kiro_protocol::openai_chat::response::ErrorEnvelope as OpenAIChatErrorEnvelope;
use kiro_protocol::openai_responses::response::ErrorEnvelope as OpenAIResponsesErrorEnvelope;

fn status_of(err: &ClientError) -> StatusCode {
    StatusCode::from_u16(err.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn anthropic_error_response(err: &ClientError) -> Response {
    let body = AnthropicErrorEnvelope::new(err.kind.wire_type(), err.message.clone());
    (status_of(err), Json(body)).into_response()
}

pub fn openai_chat_error_response(err: &ClientError) -> Response {
    let body = OpenAIChatErrorEnvelope::new(err.message.clone(), err.kind.wire_type());
    (status_of(err), Json(body)).into_response()
}

pub fn openai_responses_error_response(err: &ClientError) -> Response {
    let body = OpenAIResponsesErrorEnvelope::new(err.kind.wire_type(), err.message.clone());
    (status_of(err), Json(body)).into_response()
}

pub fn gemini_error_response(err: &ClientError) -> Response {
    let status = status_of(err);
    let body = gemini::encode_error(status.as_u16(), err.kind.wire_type(), &err.message);
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use kiro_common::ClientErrorKind;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn anthropic_error_response_uses_anthropic_shape() {
        let err = ClientError::new(ClientErrorKind::RateLimitError, "slow down");
        let response = anthropic_error_response(&err);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["type"], "rate_limit_error");
        assert_eq!(body["error"]["message"], "slow down");
    }

    #[tokio::test]
    async fn openai_chat_error_response_uses_openai_shape() {
        let err = ClientError::new(ClientErrorKind::AuthenticationError, "bad key");
        let response = openai_chat_error_response(&err);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "bad key");
        assert_eq!(body["error"]["type"], "authentication_error");
    }

    #[tokio::test]
    async fn openai_responses_error_response_uses_responses_shape() {
        let err = ClientError::new(ClientErrorKind::InvalidRequest, "bad input");
        let response = openai_responses_error_response(&err);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn gemini_error_response_carries_the_http_status_as_a_field() {
        let err = ClientError::all_accounts_unavailable();
        let response = gemini_error_response(&err);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], 503);
        assert_eq!(body["error"]["status"], "overloaded_error");
    }
}
