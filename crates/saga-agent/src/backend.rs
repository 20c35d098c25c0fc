use std::collections::VecDeque;
use std::sync::Mutex;

use saga_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool offered to the model, with a JSON-schema parameter description.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// The answer to one [`ToolRequest`], fed back on the next turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub id: String,
    pub content: String,
    pub is_error: bool,
}

/// Conversation history exchanged with the model.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    User(String),
    Assistant {
        texts: Vec<String>,
        tool_calls: Vec<ToolRequest>,
    },
    ToolResults(Vec<ToolResult>),
}

/// One model response. No tool calls means the model is finished.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub texts: Vec<String>,
    pub tool_calls: Vec<ToolRequest>,
}

impl ModelTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            texts: vec![text.into()],
            tool_calls: Vec::new(),
        }
    }

    pub fn tool(id: &str, name: &str, input: Value) -> Self {
        Self {
            texts: Vec::new(),
            tool_calls: vec![ToolRequest {
                id: id.to_string(),
                name: name.to_string(),
                input,
            }],
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.texts.push(text.into());
        self
    }

    pub fn with_tool(mut self, id: &str, name: &str, input: Value) -> Self {
        self.tool_calls.push(ToolRequest {
            id: id.to_string(),
            name: name.to_string(),
            input,
        });
        self
    }

    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// Text generation backend. Implemented by [`crate::AnthropicClient`] and
/// [`ScriptedGenerator`] (tests).
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Single-shot completion without tools.
    async fn generate(&self, system: &str, prompt: &str) -> Result<String>;

    /// One turn of a tool-augmented conversation.
    async fn next_turn(
        &self,
        system: &str,
        tools: &[ToolDeclaration],
        messages: &[Message],
    ) -> Result<ModelTurn>;
}

// ── Scripted generator (tests) ──

/// What the generator was asked, captured per call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: String,
    pub tool_names: Vec<String>,
    pub messages: Vec<Message>,
}

/// Replays canned turns in order and records every request it receives.
/// An exhausted script yields `Error::Model`.
#[derive(Default)]
pub struct ScriptedGenerator {
    turns: Mutex<VecDeque<Result<ModelTurn>>>,
    completions: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_turn(self, turn: ModelTurn) -> Self {
        self.turns.lock().unwrap().push_back(Ok(turn));
        self
    }

    pub fn with_turn_error(self, err: Error) -> Self {
        self.turns.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn with_completion(self, text: impl Into<String>) -> Self {
        self.completions.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining_turns(&self) -> usize {
        self.turns.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        self.requests.lock().unwrap().push(RecordedRequest {
            system: system.to_string(),
            tool_names: Vec::new(),
            messages: vec![Message::User(prompt.to_string())],
        });
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Model("script exhausted".into())))
    }

    async fn next_turn(
        &self,
        system: &str,
        tools: &[ToolDeclaration],
        messages: &[Message],
    ) -> Result<ModelTurn> {
        self.requests.lock().unwrap().push(RecordedRequest {
            system: system.to_string(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            messages: messages.to_vec(),
        });
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Model("script exhausted".into())))
    }
}
