//! Builds the upstream HTTP request: the `conversationState` JSON body
//! and the fixed header set (§6 EXTERNAL INTERFACES). Grounded in the
//! teacher's header-building helpers in `upstream_client`/`client.rs`,
//! generalized from "one provider dialect" to "the one upstream dialect
//! every client dialect adapts onto".

use std::sync::OnceLock;

use serde_json::{json, Value};

use kiro_identity::Credentials;
use kiro_protocol::{ToolResultItem, ToolUseItem, Turn, UpstreamRequest};

const KIRO_IDE_VERSION: &str = "0.1.0";

fn process_machine_id() -> &'static str {
    static ID: OnceLock<String> = OnceLock::new();
    ID.get_or_init(|| uuid::Uuid::new_v4().simple().to_string())
}

fn tool_result_json(result: &ToolResultItem) -> Value {
    json!({
        "toolUseId": result.tool_use_id,
        "content": result.content,
        "status": if result.is_error { "error" } else { "success" },
    })
}

fn tool_use_json(tool_use: &ToolUseItem) -> Value {
    json!({
        "toolUseId": tool_use.id,
        "name": tool_use.name,
        "input": tool_use.input,
    })
}

fn turn_json(turn: &Turn) -> Value {
    match turn {
        Turn::UserText(text) => json!({ "userInputMessage": { "content": text } }),
        Turn::UserToolResults(results) => json!({
            "userInputMessage": {
                "content": "",
                "userInputMessageContext": {
                    "toolResults": results.iter().map(tool_result_json).collect::<Vec<_>>(),
                },
            },
        }),
        Turn::AssistantText(text) => json!({ "assistantResponseMessage": { "content": text } }),
        Turn::AssistantToolUse(uses) => json!({
            "assistantResponseMessage": {
                "content": "",
                "toolUses": uses.iter().map(tool_use_json).collect::<Vec<_>>(),
            },
        }),
    }
}

/// Renders the `conversationState`/`profileArn` body the upstream
/// protocol expects (§6).
pub fn build_body(request: &UpstreamRequest, credentials: &Credentials) -> Vec<u8> {
    let mut context = serde_json::Map::new();
    if !request.current_tool_results.is_empty() {
        context.insert(
            "toolResults".to_string(),
            Value::Array(request.current_tool_results.iter().map(tool_result_json).collect()),
        );
    }
    if let Some(tools) = &request.tool_catalog {
        let tools_json: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "toolSpecification": {
                        "name": tool.name,
                        "description": tool.description,
                        "inputSchema": { "json": tool.input_schema },
                    },
                })
            })
            .collect();
        context.insert("tools".to_string(), Value::Array(tools_json));
    }

    let mut current_user_message = json!({
        "content": request.current_user_text,
        "modelId": request.model_id,
        "origin": request.origin,
    });
    if !context.is_empty() {
        current_user_message
            .as_object_mut()
            .expect("current_user_message is built as an object literal above")
            .insert("userInputMessageContext".to_string(), Value::Object(context));
    }

    let body = json!({
        "conversationState": {
            "chatTriggerType": "MANUAL",
            "conversationId": request.conversation_id,
            "currentMessage": { "userInputMessage": current_user_message },
            "history": request.history.iter().map(turn_json).collect::<Vec<_>>(),
        },
        "profileArn": credentials.profile_arn,
    });

    serde_json::to_vec(&body).unwrap_or_default()
}

/// Required upstream request headers (§6): bearer token, machine-id
/// carried inside the user-agent string, an invocation id, and the
/// agent-mode marker.
pub fn build_headers(credentials: &Credentials) -> Vec<(String, String)> {
    vec![
        ("authorization".to_string(), format!("Bearer {}", credentials.access_token)),
        ("content-type".to_string(), "application/json".to_string()),
        (
            "x-amz-user-agent".to_string(),
            format!("aws-sdk-js/1.0.0 KiroIDE-{KIRO_IDE_VERSION}-{}", process_machine_id()),
        ),
        ("amz-sdk-invocation-id".to_string(), uuid::Uuid::new_v4().to_string()),
        ("x-amzn-kiro-agent-mode".to_string(), "default".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiro_common::AuthMethod;

    fn credentials() -> Credentials {
        Credentials {
            access_token: "tok".to_string(),
            refresh_token: None,
            auth_method: AuthMethod::Idc,
            region: None,
            client_id: None,
            client_secret: None,
            profile_arn: Some("arn:aws:profile".to_string()),
            expires_at: 0,
        }
    }

    #[test]
    fn body_carries_conversation_id_and_current_message() {
        let request = UpstreamRequest {
            conversation_id: "abc123".to_string(),
            model_id: "MODEL".to_string(),
            history: vec![Turn::UserText("hi".to_string())],
            current_user_text: "how are you".to_string(),
            current_tool_results: Vec::new(),
            tool_catalog: None,
            origin: "AI_EDITOR".to_string(),
        };
        let body = build_body(&request, &credentials());
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["conversationState"]["conversationId"], "abc123");
        assert_eq!(value["conversationState"]["currentMessage"]["userInputMessage"]["content"], "how are you");
        assert_eq!(value["profileArn"], "arn:aws:profile");
    }

    #[test]
    fn tool_results_land_in_current_message_context() {
        let request = UpstreamRequest {
            conversation_id: "abc123".to_string(),
            model_id: "MODEL".to_string(),
            history: Vec::new(),
            current_user_text: String::new(),
            current_tool_results: vec![ToolResultItem { tool_use_id: "t1".to_string(), content: "42".to_string(), is_error: false }],
            tool_catalog: None,
            origin: "AI_EDITOR".to_string(),
        };
        let body = build_body(&request, &credentials());
        let value: Value = serde_json::from_slice(&body).unwrap();
        let results = &value["conversationState"]["currentMessage"]["userInputMessage"]["userInputMessageContext"]["toolResults"];
        assert_eq!(results[0]["toolUseId"], "t1");
    }

    #[test]
    fn headers_include_bearer_token_and_machine_id_user_agent() {
        let headers = build_headers(&credentials());
        let auth = headers.iter().find(|(k, _)| k == "authorization").unwrap();
        assert_eq!(auth.1, "Bearer tok");
        let ua = headers.iter().find(|(k, _)| k == "x-amz-user-agent").unwrap();
        assert!(ua.1.contains("KiroIDE-"));
    }
}
