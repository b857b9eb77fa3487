//! MCP client implementation
//!
//! Drives one backend over a [`Transport`]: the initialize handshake, tool
//! discovery, tool invocation and liveness pings. The client issues one
//! request at a time; callers that need serialization across tasks wrap it
//! in their own mutex.

use std::sync::atomic::{AtomicI64, Ordering};

use tracing::debug;

use crate::protocol::{methods, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::transport::Transport;
use crate::{McpTool, ServerCapabilities, PROTOCOL_VERSION};

/// MCP client for connecting to tool backends
pub struct McpClient<T: Transport> {
    transport: T,
    request_id: AtomicI64,
    server_capabilities: Option<ServerCapabilities>,
}

impl<T: Transport> McpClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            request_id: AtomicI64::new(1),
            server_capabilities: None,
        }
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(self.request_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Perform the initialize handshake and confirm it with the
    /// `notifications/initialized` notification.
    pub async fn initialize(&mut self, client_info: ClientInfo) -> Result<ServerInfo, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": client_info.name,
                "version": client_info.version
            }
        });

        let request = JsonRpcRequest::new(self.next_id(), methods::INITIALIZE).with_params(params);
        let response = self.send_request(request).await?;

        if let Some(result) = response.result {
            let init: InitializeResult = serde_json::from_value(result)
                .map_err(|e| McpError::Protocol(e.to_string()))?;

            self.server_capabilities = Some(init.capabilities);

            let notification = serde_json::json!({
                "jsonrpc": "2.0",
                "method": methods::INITIALIZED
            });
            self.transport
                .send(notification)
                .await
                .map_err(|e| McpError::Transport(e.to_string()))?;

            Ok(ServerInfo {
                name: init.server_info.name,
                version: init.server_info.version,
            })
        } else if let Some(error) = response.error {
            Err(McpError::Server(error.message))
        } else {
            Err(McpError::Protocol("empty response".to_string()))
        }
    }

    /// List the tools this backend advertises
    pub async fn list_tools(&mut self) -> Result<Vec<McpTool>, McpError> {
        let request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_LIST);
        let response = self.send_request(request).await?;

        if let Some(error) = response.error {
            return Err(McpError::Server(error.message));
        }
        match response.result {
            Some(result) => {
                let tools: ToolsListResult = serde_json::from_value(result)
                    .map_err(|e| McpError::Protocol(e.to_string()))?;
                Ok(tools.tools)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Invoke a tool by name
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments
        });
        let request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_CALL).with_params(params);
        let response = self.send_request(request).await?;

        if let Some(result) = response.result {
            serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))
        } else if let Some(error) = response.error {
            Err(McpError::Server(error.message))
        } else {
            Err(McpError::Protocol("empty response".to_string()))
        }
    }

    /// Lightweight liveness probe
    pub async fn ping(&mut self) -> Result<(), McpError> {
        let request = JsonRpcRequest::new(self.next_id(), methods::PING);
        let response = self.send_request(request).await?;
        match response.error {
            Some(error) => Err(McpError::Server(error.message)),
            None => Ok(()),
        }
    }

    /// Tear down the transport (and its subprocess, if any)
    pub async fn close(&mut self) -> Result<(), McpError> {
        self.transport
            .close()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))
    }

    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.server_capabilities.as_ref()
    }

    async fn send_request(&mut self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let expected_id = request.id.clone();
        let request_value =
            serde_json::to_value(&request).map_err(|e| McpError::Protocol(e.to_string()))?;

        self.transport
            .send(request_value)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        // Backends may interleave notifications with responses; skip anything
        // that is not the answer to the request we just sent.
        loop {
            let value = self
                .transport
                .receive()
                .await
                .map_err(|e| McpError::Transport(e.to_string()))?
                .ok_or_else(|| McpError::Transport("connection closed".to_string()))?;

            if value.get("id").is_none() {
                debug!(method = ?value.get("method"), "skipping backend notification");
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_value(value)
                .map_err(|e| McpError::Protocol(e.to_string()))?;
            if response.id != expected_id {
                debug!(?response.id, "skipping response for a different request");
                continue;
            }
            return Ok(response);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, serde::Deserialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    #[allow(dead_code)]
    protocol_version: String,
    capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    server_info: ServerInfoInner,
}

#[derive(Debug, serde::Deserialize)]
struct ServerInfoInner {
    name: String,
    version: String,
}

#[derive(Debug, serde::Deserialize)]
struct ToolsListResult {
    tools: Vec<McpTool>,
}

/// Result of a tools/call request
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Concatenate all text content items into one string.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| item.text.as_deref())
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: Option<String>,
}

/// MCP errors
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Server error: {0}")]
    Server(String),
}
