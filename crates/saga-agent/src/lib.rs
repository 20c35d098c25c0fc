pub mod anthropic;
pub mod backend;
pub mod budget;
pub mod orchestrator;
pub mod prompt;
pub mod tools;

pub use anthropic::AnthropicClient;
pub use backend::{
    Message, ModelTurn, RecordedRequest, ScriptedGenerator, TextGenerator, ToolDeclaration,
    ToolRequest, ToolResult,
};
pub use budget::{BudgetLimits, BudgetTracker, BYTES_PER_TOKEN};
pub use orchestrator::{AgentState, AnalysisOutput, Orchestrator};
pub use prompt::PromptContext;
pub use tools::{ToolCall, ToolGateway, ToolOutput};
