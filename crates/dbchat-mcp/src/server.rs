//! MCP server implementation
//!
//! A backend implements [`McpHandler`] and hands it to [`McpServer`], which
//! dispatches JSON-RPC requests. [`serve_stdio`] runs the newline-delimited
//! read/dispatch/write loop against the process's own stdin/stdout.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::protocol::{methods, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::{McpTool, ServerCapabilities, ToolsCapability, PROTOCOL_VERSION};

/// Handler for MCP requests
#[allow(async_fn_in_trait)]
pub trait McpHandler: Send + Sync {
    /// List available tools
    async fn list_tools(&self) -> Vec<McpTool>;

    /// Call a tool; the error string becomes an isError tool result
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, String>;
}

/// MCP server
pub struct McpServer<H: McpHandler> {
    handler: Arc<H>,
    capabilities: ServerCapabilities,
    server_name: String,
    server_version: String,
}

impl<H: McpHandler> McpServer<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_name: "dbchat-mcp".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Handle one raw input line. Returns `None` for notifications and for
    /// lines that cannot be answered (no id to echo).
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "dropping unparsable protocol line");
                return None;
            }
        };

        if value.get("id").is_none() {
            debug!(method = ?value.get("method"), "consumed notification");
            return None;
        }

        match serde_json::from_value::<JsonRpcRequest>(value.clone()) {
            Ok(request) => Some(self.handle_request(request).await),
            Err(_) => {
                let id = serde_json::from_value(value["id"].clone()).ok()?;
                Some(JsonRpcResponse::error(id, JsonRpcError::invalid_request()))
            }
        }
    }

    /// Handle a JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(request).await,
            methods::PING => JsonRpcResponse::success(request.id, serde_json::json!({})),
            methods::TOOLS_LIST => self.handle_tools_list(request).await,
            methods::TOOLS_CALL => self.handle_tools_call(request).await,
            _ => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found()),
        }
    }

    async fn handle_initialize(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": self.capabilities,
            "serverInfo": {
                "name": self.server_name,
                "version": self.server_version
            }
        });
        JsonRpcResponse::success(request.id, result)
    }

    async fn handle_tools_list(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let tools = self.handler.list_tools().await;
        JsonRpcResponse::success(request.id, serde_json::json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let params = match request.params {
            Some(p) => p,
            None => return JsonRpcResponse::error(request.id, JsonRpcError::invalid_params()),
        };

        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return JsonRpcResponse::error(request.id, JsonRpcError::invalid_params()),
        };

        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or(serde_json::Value::Object(Default::default()));

        match self.handler.call_tool(name, arguments).await {
            Ok(result) => {
                let content = vec![serde_json::json!({
                    "type": "text",
                    "text": result.to_string()
                })];
                JsonRpcResponse::success(
                    request.id,
                    serde_json::json!({
                        "content": content,
                        "isError": false
                    }),
                )
            }
            Err(e) => {
                let content = vec![serde_json::json!({
                    "type": "text",
                    "text": e
                })];
                JsonRpcResponse::success(
                    request.id,
                    serde_json::json!({
                        "content": content,
                        "isError": true
                    }),
                )
            }
        }
    }
}

/// Serve MCP over this process's stdin/stdout until EOF.
pub async fn serve_stdio<H: McpHandler>(server: McpServer<H>) -> io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = server.handle_line(&line).await {
            let json = serde_json::to_string(&response)?;
            stdout.write_all(json.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;
    use serde_json::json;

    struct EchoHandler;

    impl McpHandler for EchoHandler {
        async fn list_tools(&self) -> Vec<McpTool> {
            vec![McpTool {
                name: "echo".to_string(),
                description: "Echo the arguments back".to_string(),
                input_schema: json!({"type": "object"}),
            }]
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: serde_json::Value,
        ) -> Result<serde_json::Value, String> {
            match name {
                "echo" => Ok(json!({"success": true, "echo": arguments})),
                other => Err(format!("unknown tool: {}", other)),
            }
        }
    }

    fn server() -> McpServer<EchoHandler> {
        McpServer::new(Arc::new(EchoHandler)).with_name("echo-backend")
    }

    #[tokio::test]
    async fn initialize_reports_server_info_and_capabilities() {
        let request = JsonRpcRequest::new(RequestId::Number(1), methods::INITIALIZE);
        let response = server().handle_request(request).await;

        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "echo-backend");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
    }

    #[tokio::test]
    async fn ping_answers_with_empty_result() {
        let request = JsonRpcRequest::new(RequestId::Number(2), methods::PING);
        let response = server().handle_request(request).await;
        assert_eq!(response.result.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn tools_list_returns_catalog() {
        let request = JsonRpcRequest::new(RequestId::Number(3), methods::TOOLS_LIST);
        let response = server().handle_request(request).await;

        let result = response.result.unwrap();
        assert_eq!(result["tools"][0]["name"], "echo");
        assert!(result["tools"][0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn tools_call_wraps_result_as_text_content() {
        let request = JsonRpcRequest::new(RequestId::Number(4), methods::TOOLS_CALL)
            .with_params(json!({"name": "echo", "arguments": {"x": 1}}));
        let response = server().handle_request(request).await;

        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);
        let text = result["content"][0]["text"].as_str().unwrap();
        let payload: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["echo"]["x"], 1);
    }

    #[tokio::test]
    async fn tool_failure_becomes_is_error_result() {
        let request = JsonRpcRequest::new(RequestId::Number(5), methods::TOOLS_CALL)
            .with_params(json!({"name": "missing", "arguments": {}}));
        let response = server().handle_request(request).await;

        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("unknown tool"));
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let request = JsonRpcRequest::new(RequestId::Number(6), "resources/list");
        let response = server().handle_request(request).await;
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        let line = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        assert!(server().handle_line(line).await.is_none());
    }

    #[tokio::test]
    async fn missing_params_is_invalid() {
        let request = JsonRpcRequest::new(RequestId::Number(7), methods::TOOLS_CALL);
        let response = server().handle_request(request).await;
        assert_eq!(response.error.unwrap().code, -32602);
    }
}
