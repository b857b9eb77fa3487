//! Conversational orchestrator
//!
//! Drives the two-phase tool-use protocol: send history plus the aggregated
//! catalog, route any requested tool calls through the session registry,
//! feed the results back, and return the model's final text. The whole
//! exchange is wrapped in retry/backoff, and every request finalizes
//! exactly one metric whatever exit path it takes. Callers get readable
//! text on failure, never a raised fault.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::metrics::{ErrorKind, MetricsCollector, MetricsSummary, RequestMetric};
use crate::provider::{ModelError, ModelProvider, ToolResultTurn, Turn};
use crate::registry;
use crate::session::{SessionRegistry, StdioConnector};

/// Marker prefixing every degraded or failed response, so callers can
/// distinguish outcomes programmatically.
pub const ERROR_PREFIX: &str = "[error]";

/// System prompt for the tool-using assistant
pub const SYSTEM_PROMPT: &str = "You are an AI assistant with access to tools \
provided by MCP backend servers, including database operations. Always explain \
your actions clearly and handle errors gracefully.";

/// Retry policy for the model-call wrapper
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per request
    pub max_retries: u32,
    /// Base delay for exponential backoff on timeouts
    pub backoff_base: Duration,
    /// Base delay for linear backoff on rate limits
    pub rate_limit_base: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            rate_limit_base: Duration::from_secs(5),
        }
    }
}

/// The chat client: owns the conversation, the session registry and the
/// metrics log. Processes one user turn at a time to completion.
pub struct ChatClient {
    sessions: Arc<SessionRegistry>,
    provider: Arc<dyn ModelProvider>,
    history: Vec<Turn>,
    metrics: MetricsCollector,
    retry: RetryConfig,
}

impl ChatClient {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        provider: Arc<dyn ModelProvider>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            sessions,
            provider,
            history: Vec::new(),
            metrics: MetricsCollector::new(),
            retry,
        }
    }

    /// Load the registry file, launch every enabled backend, run an
    /// initial health check and assemble a ready client. Configuration
    /// corruption is the one condition that aborts here; individual
    /// backend failures only shrink the catalog.
    pub async fn bootstrap(config_path: &Path, provider: Arc<dyn ModelProvider>) -> Result<Self> {
        let mut registry_file = registry::load_or_init(config_path)?;
        let sessions = SessionRegistry::launch_all(&mut registry_file.servers, &StdioConnector).await;
        sessions.check_all().await;
        info!(servers = sessions.len(), "chat client ready");

        Ok(Self::new(
            Arc::new(sessions),
            provider,
            RetryConfig::default(),
        ))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Process one user message to completion and return the reply text.
    pub async fn send(&mut self, user_message: &str) -> String {
        let request_id = format!("req-{}", Uuid::new_v4());
        let mut metric = RequestMetric::start(&request_id);
        info!(%request_id, "processing request");

        // Appended once; retries resubmit the history as it stands.
        self.history.push(Turn::User(user_message.to_string()));

        if self.sessions.all_tools().is_empty() {
            warn!(%request_id, "no healthy backends available");
            self.metrics.record(metric.finish_failure(ErrorKind::NoBackend));
            return format!(
                "{} no tools currently available, check backend status",
                ERROR_PREFIX
            );
        }

        let max_attempts = self.retry.max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.execute_exchange(&request_id, &mut metric).await {
                Ok(text) => {
                    let metric = metric.finish_success();
                    if let Some(elapsed) = metric.duration() {
                        info!(%request_id, elapsed_secs = elapsed.as_secs_f64(), "request completed");
                    }
                    self.metrics.record(metric);
                    return text;
                }
                Err(ModelError::Timeout) => {
                    warn!(%request_id, attempt, max_attempts, "model call timed out");
                    if attempt >= max_attempts {
                        self.metrics.record(metric.finish_failure(ErrorKind::Timeout));
                        return format!(
                            "{} request timed out after {} attempts",
                            ERROR_PREFIX, max_attempts
                        );
                    }
                    tokio::time::sleep(self.retry.backoff_base * 2u32.pow(attempt - 1)).await;
                }
                Err(ModelError::RateLimited) => {
                    warn!(%request_id, attempt, max_attempts, "model rate limit hit");
                    if attempt >= max_attempts {
                        self.metrics.record(metric.finish_failure(ErrorKind::RateLimit));
                        return format!(
                            "{} rate limit exceeded, please try again later",
                            ERROR_PREFIX
                        );
                    }
                    tokio::time::sleep(self.retry.rate_limit_base * attempt).await;
                }
                Err(ModelError::Other(message)) => {
                    error!(%request_id, error = %message, "model call failed");
                    self.metrics.record(metric.finish_failure(ErrorKind::Provider));
                    return format!("{} {}", ERROR_PREFIX, message);
                }
            }
        }
    }

    /// One traversal of the exchange state machine: model call, optional
    /// tool round, summarization call.
    async fn execute_exchange(
        &mut self,
        request_id: &str,
        metric: &mut RequestMetric,
    ) -> std::result::Result<String, ModelError> {
        let catalog = self.sessions.all_tools();
        let turn = self.provider.complete(&self.history, &catalog).await?;

        if !turn.has_tool_calls() {
            let text = turn.content.unwrap_or_default();
            self.history.push(Turn::Assistant(text.clone()));
            return Ok(text);
        }

        info!(request_id, calls = turn.tool_calls.len(), "model requested tool use");

        let mut results = Vec::with_capacity(turn.tool_calls.len());
        for call in &turn.tool_calls {
            info!(request_id, tool = %call.name, "executing tool");
            metric.record_tool(&call.name);

            let payload = match self
                .sessions
                .invoke(&call.name, call.arguments.clone(), request_id)
                .await
            {
                Ok(value) => value,
                // Routing failures become tool results the model can see
                // and react to; they never abort the turn.
                Err(e) => e.into_payload(),
            };

            let content = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|_| payload.to_string());
            results.push(ToolResultTurn {
                call_id: call.id.clone(),
                content,
            });
        }

        self.history.push(Turn::ToolUse {
            content: turn.content,
            calls: turn.tool_calls,
        });
        self.history.push(Turn::ToolResults(results));

        // Summarization turn: no catalog, so this call cannot request
        // further tools.
        let final_turn = self.provider.complete(&self.history, &[]).await?;
        let text = final_turn.content.unwrap_or_default();
        self.history.push(Turn::Assistant(text.clone()));
        Ok(text)
    }

    /// Metrics summary plus backend health, as a plain mapping.
    pub fn metrics_summary(&self) -> Value {
        let summary = self.metrics.summary();
        let mut value = serde_json::to_value(&summary).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert(
                "healthy_servers".to_string(),
                self.sessions.healthy_count().into(),
            );
            map.insert("total_servers".to_string(), self.sessions.len().into());
        }
        value
    }

    pub fn summary(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        info!("conversation history cleared");
    }

    /// Close every backend connection. Errors are logged, not raised.
    pub async fn shutdown(&self) {
        self.sessions.close_all().await;
    }
}
