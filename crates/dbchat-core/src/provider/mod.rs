//! Model provider boundary
//!
//! The orchestrator sees the model through [`ModelProvider`]: the full
//! conversation history and the current tool catalog go in, and either a
//! text turn or a batch of tool-use requests comes out. Failures are
//! classified into the retry taxonomy ([`ModelError`]) rather than carried
//! as provider-specific exception types.

mod genai_provider;

pub use genai_provider::GenAIProvider;

use async_trait::async_trait;
use serde_json::Value;

use crate::session::ToolSchema;

/// One turn of conversation history, replayed verbatim on every model call
#[derive(Debug, Clone)]
pub enum Turn {
    User(String),
    Assistant(String),
    /// Assistant turn that requested tool calls
    ToolUse {
        content: Option<String>,
        calls: Vec<ToolUseRequest>,
    },
    /// Results for the preceding tool-use turn, keyed by call id
    ToolResults(Vec<ToolResultTurn>),
}

/// A tool invocation requested by the model
#[derive(Debug, Clone)]
pub struct ToolUseRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One tool's result, fed back under its originating call id
#[derive(Debug, Clone)]
pub struct ToolResultTurn {
    pub call_id: String,
    pub content: String,
}

/// Model reply: text, tool-use requests, or both
#[derive(Debug, Clone, Default)]
pub struct ModelTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolUseRequest>,
}

impl ModelTurn {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Model-call failures, classified for the retry policy
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("model request timed out")]
    Timeout,
    #[error("model rate limit exceeded")]
    RateLimited,
    #[error("model request failed: {0}")]
    Other(String),
}

/// The opaque model-calling boundary
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(
        &self,
        history: &[Turn],
        tools: &[ToolSchema],
    ) -> std::result::Result<ModelTurn, ModelError>;
}
