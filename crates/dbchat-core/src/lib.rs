//! dbchat core - session orchestration for an LLM chat client
//!
//! This crate provides the core functionality of dbchat:
//! - Backend registry configuration (load or synthesize)
//! - Backend session lifecycle: launch, health checks, teardown
//! - Tool catalog aggregation and invocation routing
//! - The conversational orchestrator with retry/backoff
//! - Request metrics collection

pub mod chat;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use chat::{ChatClient, RetryConfig, ERROR_PREFIX, SYSTEM_PROMPT};
pub use error::{Error, Result};
pub use metrics::{ErrorKind, MetricsCollector, MetricsSummary, RequestMetric};
pub use provider::{
    GenAIProvider, ModelError, ModelProvider, ModelTurn, ToolResultTurn, ToolUseRequest, Turn,
};
pub use registry::{load_or_init, RegistryFile, ServerConfig, DEFAULT_CONFIG_PATH};
pub use session::{
    BackendChannel, BackendSession, ChannelConnector, InvokeError, SessionRegistry,
    StdioConnector, ToolPayload, ToolSchema,
};
