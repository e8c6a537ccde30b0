//! The `Generate` capability (§4.E) — the model abstraction the agent loop
//! drives. Production wiring implements [`ModelClient`] against a real
//! provider; [`ScriptedModelClient`] is the deterministic double used by
//! tests and by the bundled demo server.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ModelMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A model-requested call. Only `run_code` is a mechanism for side effects
/// (§4.E); any other name is reported back to the model as unrecognized.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn run_code(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: "run_code".to_string(),
            arguments: serde_json::json!({"code": code.into()}),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn run_code(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            text: None,
            tool_calls: vec![ToolCallRequest::run_code(id, code)],
        }
    }
}

/// `(messages, toolCatalog) -> {text?, toolCalls?}` (§4.E).
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, messages: &[ModelMessage], catalog: &str) -> anyhow::Result<ModelResponse>;
}

/// Deterministic, pre-scripted [`ModelClient`] for tests and demos: pops one
/// response per call, in order, and errors once exhausted.
pub struct ScriptedModelClient {
    responses: Mutex<VecDeque<ModelResponse>>,
}

impl ScriptedModelClient {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn generate(&self, _messages: &[ModelMessage], _catalog: &str) -> anyhow::Result<ModelResponse> {
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted model client has no more responses queued"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_client_replays_in_order_then_errors() {
        let client = ScriptedModelClient::new(vec![ModelResponse::text("a"), ModelResponse::text("b")]);
        let first = client.generate(&[], "").await.unwrap();
        assert_eq!(first.text.as_deref(), Some("a"));
        let second = client.generate(&[], "").await.unwrap();
        assert_eq!(second.text.as_deref(), Some("b"));
        assert!(client.generate(&[], "").await.is_err());
    }
}
