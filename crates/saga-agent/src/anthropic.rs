//! Messages API client.

use saga_core::config::ModelConfig;
use saga_core::{Error, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::{Message, ModelTurn, TextGenerator, ToolDeclaration, ToolRequest};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    endpoint: String,
}

impl AnthropicClient {
    /// Fails with `Error::Configuration` when `api_key` is blank.
    pub fn new(config: &ModelConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Configuration("model API key is empty".into()));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("saga/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            http,
            api_key,
            model: config.name.clone(),
            max_tokens: config.max_output_tokens,
            endpoint: format!("{}/v1/messages", config.api_base.trim_end_matches('/')),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, body: &Value) -> Result<MessagesResponse> {
        debug!(model = %self.model, "messages request");
        let resp = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(Error::model)?;
        let status = resp.status();
        let text = resp.text().await.map_err(Error::model)?;
        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| format!("{}: {}", e.error.error_type, e.error.message))
                .unwrap_or(text);
            return Err(Error::Model(format!("HTTP {status}: {detail}")));
        }
        serde_json::from_str(&text).map_err(|e| Error::Model(format!("invalid response: {e}")))
    }

    fn request_body(
        &self,
        system: &str,
        tools: &[ToolDeclaration],
        messages: &[Message],
    ) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": messages.iter().map(encode_message).collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        body
    }
}

#[async_trait::async_trait]
impl TextGenerator for AnthropicClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        let body = self.request_body(system, &[], &[Message::User(prompt.to_string())]);
        let turn = self.send(&body).await?.into_turn();
        Ok(turn.texts.concat())
    }

    async fn next_turn(
        &self,
        system: &str,
        tools: &[ToolDeclaration],
        messages: &[Message],
    ) -> Result<ModelTurn> {
        let body = self.request_body(system, tools, messages);
        Ok(self.send(&body).await?.into_turn())
    }
}

// ── Wire format ──

fn encode_message(message: &Message) -> Value {
    match message {
        Message::User(text) => json!({ "role": "user", "content": text }),
        Message::Assistant { texts, tool_calls } => {
            let mut content: Vec<Value> = texts
                .iter()
                .map(|t| json!({ "type": "text", "text": t }))
                .collect();
            content.extend(tool_calls.iter().map(|c| {
                json!({ "type": "tool_use", "id": c.id, "name": c.name, "input": c.input })
            }));
            json!({ "role": "assistant", "content": content })
        }
        Message::ToolResults(results) => {
            let content: Vec<Value> = results
                .iter()
                .map(|r| {
                    json!({
                        "type": "tool_result",
                        "tool_use_id": r.id,
                        "content": r.content,
                        "is_error": r.is_error,
                    })
                })
                .collect();
            json!({ "role": "user", "content": content })
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

impl MessagesResponse {
    fn into_turn(self) -> ModelTurn {
        let mut turn = ModelTurn::default();
        for block in self.content {
            match block {
                ContentBlock::Text { text } => turn.texts.push(text),
                ContentBlock::ToolUse { id, name, input } => {
                    turn.tool_calls.push(ToolRequest { id, name, input })
                }
                ContentBlock::Other => {}
            }
        }
        turn
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ToolResult;

    #[test]
    fn blank_key_is_configuration_error() {
        let err = AnthropicClient::new(&ModelConfig::default(), "  ").err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn endpoint_joins_base() {
        let cfg = ModelConfig {
            api_base: "http://localhost:8080/".into(),
            ..ModelConfig::default()
        };
        let c = AnthropicClient::new(&cfg, "k").unwrap();
        assert_eq!(c.endpoint, "http://localhost:8080/v1/messages");
    }

    #[test]
    fn request_body_encodes_history() {
        let c = AnthropicClient::new(&ModelConfig::default(), "k").unwrap();
        let messages = vec![
            Message::User("commits".into()),
            Message::Assistant {
                texts: vec!["checking".into()],
                tool_calls: vec![ToolRequest {
                    id: "tu_1".into(),
                    name: "fetch_full_commit_message".into(),
                    input: json!({"sha": "abc"}),
                }],
            },
            Message::ToolResults(vec![ToolResult {
                id: "tu_1".into(),
                content: "{}".into(),
                is_error: false,
            }]),
        ];
        let body = c.request_body("sys", &crate::tools::declarations(), &messages);
        assert_eq!(body["system"], "sys");
        assert_eq!(body["tools"].as_array().unwrap().len(), 4);
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["messages"][0]["content"], "commits");
        assert_eq!(body["messages"][1]["content"][1]["type"], "tool_use");
        assert_eq!(body["messages"][1]["content"][1]["input"]["sha"], "abc");
        assert_eq!(body["messages"][2]["role"], "user");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "tu_1");

        let bare = c.request_body("sys", &[], &messages[..1]);
        assert!(bare.get("tools").is_none());
    }

    #[test]
    fn response_maps_to_turn() {
        let raw = r#"{
            "id": "msg_1",
            "content": [
                {"type": "text", "text": "Looking closer."},
                {"type": "tool_use", "id": "tu_9", "name": "fetch_filtered_diff",
                 "input": {"sha": "abc", "reason": "vague"}},
                {"type": "thinking", "thinking": "..."}
            ],
            "stop_reason": "tool_use"
        }"#;
        let resp: MessagesResponse = serde_json::from_str(raw).unwrap();
        let turn = resp.into_turn();
        assert_eq!(turn.texts, vec!["Looking closer."]);
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].id, "tu_9");
        assert_eq!(turn.tool_calls[0].input["reason"], "vague");
    }
}
