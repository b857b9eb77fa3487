//! Backend channel capability
//!
//! The session layer talks to a backend only through [`BackendChannel`]
//! and obtains channels through [`ChannelConnector`]. The production
//! implementations spawn a subprocess and speak MCP over stdio; tests
//! substitute doubles so no processes are involved.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

use dbchat_mcp::client::{ClientInfo, McpClient, McpError};
use dbchat_mcp::transport::StdioTransport;

use crate::error::{Error, Result};
use crate::registry::ServerConfig;
use crate::session::ToolSchema;

/// Payload returned by a tool call: structured when the backend replied
/// with JSON, plain text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    Structured(Value),
    Text(String),
}

impl ToolPayload {
    /// Parse backend reply text, falling back to `Text` when it is not JSON.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => Self::Structured(value),
            Err(_) => Self::Text(text.to_string()),
        }
    }

    /// Normalize into the payload shape the model sees.
    pub fn into_value(self) -> Value {
        match self {
            Self::Structured(value) => value,
            Self::Text(text) => serde_json::json!({"success": true, "result": text}),
        }
    }
}

/// Request/response channel to one backend process
#[async_trait]
pub trait BackendChannel: Send + Sync {
    /// Protocol initialization handshake
    async fn initialize(&mut self) -> Result<()>;

    /// Fetch the backend's advertised tool catalog
    async fn list_tools(&mut self) -> Result<Vec<ToolSchema>>;

    /// Invoke a tool. A backend-reported tool failure is
    /// `Error::ToolExecution`; anything else is a channel fault.
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolPayload>;

    /// Lightweight liveness probe
    async fn ping(&mut self) -> Result<()>;

    /// Tear the channel down, ending the backend process
    async fn close(&mut self) -> Result<()>;
}

/// Factory for backend channels
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, config: &ServerConfig) -> Result<Box<dyn BackendChannel>>;
}

/// Production connector: spawns the backend subprocess per its launch spec.
pub struct StdioConnector;

#[async_trait]
impl ChannelConnector for StdioConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<Box<dyn BackendChannel>> {
        let (command, args) = config.launch_command();
        let transport = StdioTransport::spawn(&command, &args).await.map_err(|e| {
            Error::Launch(format!("failed to start backend '{}': {}", config.name, e))
        })?;

        Ok(Box::new(StdioChannel {
            client: McpClient::new(transport),
            timeout_secs: config.timeout,
        }))
    }
}

/// [`BackendChannel`] over an MCP stdio client, bounding every operation
/// with the descriptor's timeout.
pub struct StdioChannel {
    client: McpClient<StdioTransport>,
    timeout_secs: u64,
}

impl StdioChannel {
    fn deadline(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn channel_error(error: McpError) -> Error {
    Error::Channel(error.to_string())
}

#[async_trait]
impl BackendChannel for StdioChannel {
    async fn initialize(&mut self) -> Result<()> {
        let info = ClientInfo {
            name: "dbchat".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        timeout(self.deadline(), self.client.initialize(info))
            .await
            .map_err(|_| Error::Timeout(self.timeout_secs))?
            .map_err(channel_error)?;
        Ok(())
    }

    async fn list_tools(&mut self) -> Result<Vec<ToolSchema>> {
        let tools = timeout(self.deadline(), self.client.list_tools())
            .await
            .map_err(|_| Error::Timeout(self.timeout_secs))?
            .map_err(channel_error)?;

        Ok(tools
            .into_iter()
            .map(|tool| ToolSchema {
                name: tool.name,
                description: tool.description,
                input_schema: tool.input_schema,
            })
            .collect())
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolPayload> {
        let result = timeout(self.deadline(), self.client.call_tool(name, arguments))
            .await
            .map_err(|_| Error::Timeout(self.timeout_secs))?
            .map_err(channel_error)?;

        let text = result.joined_text();
        if result.is_error {
            return Err(Error::ToolExecution(text));
        }
        if text.is_empty() {
            return Ok(ToolPayload::Text("no content".to_string()));
        }
        Ok(ToolPayload::parse(&text))
    }

    async fn ping(&mut self) -> Result<()> {
        timeout(self.deadline(), self.client.ping())
            .await
            .map_err(|_| Error::Timeout(self.timeout_secs))?
            .map_err(channel_error)
    }

    async fn close(&mut self) -> Result<()> {
        self.client.close().await.map_err(channel_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_replies_stay_structured() {
        let payload = ToolPayload::parse(r#"{"success": true, "result": "test"}"#);
        assert_eq!(
            payload,
            ToolPayload::Structured(json!({"success": true, "result": "test"}))
        );
        assert_eq!(
            payload.into_value(),
            json!({"success": true, "result": "test"})
        );
    }

    #[test]
    fn plain_text_is_wrapped() {
        let payload = ToolPayload::parse("3 rows affected");
        assert_eq!(payload, ToolPayload::Text("3 rows affected".to_string()));
        assert_eq!(
            payload.into_value(),
            json!({"success": true, "result": "3 rows affected"})
        );
    }
}
