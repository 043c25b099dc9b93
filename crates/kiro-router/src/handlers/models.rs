//! `GET /v1/models` (§6): enumerates the client-facing ids this proxy
//! knows how to map onto an upstream model (§4.7 `model_map`).

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use time::OffsetDateTime;

use kiro_adapters::model_map;

#[derive(Debug, Serialize)]
struct ModelCard {
    id: &'static str,
    object: &'static str,
    created: i64,
    owned_by: &'static str,
}

#[derive(Debug, Serialize)]
struct ModelList {
    object: &'static str,
    data: Vec<ModelCard>,
}

pub async fn list_models() -> Response {
    let created = OffsetDateTime::now_utc().unix_timestamp();
    let data = model_map::known_models()
        .map(|id| ModelCard { id, object: "model", created, owned_by: "kiro-proxy" })
        .collect();
    Json(ModelList { object: "list", data }).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn lists_every_known_model_id() {
        let response = list_models().await;
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["object"], "list");
        let ids: Vec<&str> = body["data"].as_array().unwrap().iter().map(|m| m["id"].as_str().unwrap()).collect();
        let expected: Vec<&str> = model_map::known_models().collect();
        assert_eq!(ids, expected);
    }
}
