//! Backend session management
//!
//! One [`BackendSession`] per successfully launched backend. The
//! [`SessionRegistry`] owns the sessions in registration order and is the
//! single object the supervisor, health monitor, catalog aggregator and
//! invocation router operate on: constructed at startup, torn down at
//! shutdown, never ambient global state.

pub mod channel;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

pub use channel::{BackendChannel, ChannelConnector, StdioConnector, ToolPayload};

use crate::error::{Error, Result};
use crate::registry::ServerConfig;

/// Tool definition in the model-facing shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Live, initialized connection to one backend.
///
/// A session is either fully initialized (channel open, tools populated)
/// or absent from the registry; partially constructed sessions are never
/// visible. The channel mutex serializes calls so at most one request is
/// outstanding per backend; `healthy` is atomic so routing reads stay
/// consistent without a global lock.
pub struct BackendSession {
    name: String,
    channel: tokio::sync::Mutex<Box<dyn BackendChannel>>,
    tools: Vec<ToolSchema>,
    healthy: AtomicBool,
    last_checked: parking_lot::Mutex<DateTime<Utc>>,
}

impl BackendSession {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &[ToolSchema] {
        &self.tools
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn last_checked(&self) -> DateTime<Utc> {
        *self.last_checked.lock()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|tool| tool.name == name)
    }

    fn mark(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
        *self.last_checked.lock() = Utc::now();
    }
}

/// Routing failures, surfaced to the model as tool-result payloads rather
/// than faults.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    #[error("Tool {0} not found on any healthy server")]
    NotFound(String),
    #[error("Tool execution failed: {0}")]
    Execution(String),
}

impl InvokeError {
    /// Render as the error payload fed back to the model.
    pub fn into_payload(self) -> Value {
        serde_json::json!({"error": self.to_string()})
    }
}

/// Registry of live backend sessions, in registration order
pub struct SessionRegistry {
    sessions: Vec<Arc<BackendSession>>,
}

impl SessionRegistry {
    /// Launch every enabled backend: spawn, handshake, fetch the tool
    /// catalog. A failing backend is logged and its descriptor disabled;
    /// it never aborts the launch of the others.
    pub async fn launch_all(
        configs: &mut [ServerConfig],
        connector: &dyn ChannelConnector,
    ) -> Self {
        let mut sessions: Vec<Arc<BackendSession>> = Vec::new();

        for config in configs.iter_mut() {
            if !config.enabled {
                continue;
            }
            info!(server = %config.name, "initializing backend");
            match Self::launch_one(config, connector).await {
                Ok(session) => {
                    info!(
                        server = %config.name,
                        tools = session.tools.len(),
                        "backend ready"
                    );
                    sessions.push(Arc::new(session));
                }
                Err(e) => {
                    warn!(server = %config.name, error = %e, "backend failed to launch, disabling");
                    config.enabled = false;
                }
            }
        }

        Self { sessions }
    }

    async fn launch_one(
        config: &ServerConfig,
        connector: &dyn ChannelConnector,
    ) -> Result<BackendSession> {
        let mut channel = connector.connect(config).await?;
        channel.initialize().await?;
        let tools = channel.list_tools().await?;

        Ok(BackendSession {
            name: config.name.clone(),
            channel: tokio::sync::Mutex::new(channel),
            tools,
            healthy: AtomicBool::new(true),
            last_checked: parking_lot::Mutex::new(Utc::now()),
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn healthy_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_healthy()).count()
    }

    pub fn sessions(&self) -> &[Arc<BackendSession>] {
        &self.sessions
    }

    pub fn get(&self, name: &str) -> Option<&Arc<BackendSession>> {
        self.sessions.iter().find(|s| s.name == name)
    }

    /// Probe every session for liveness, concurrently. Failures are
    /// captured into the session's `healthy` flag and never raised.
    pub async fn check_all(&self) {
        let probes = self.sessions.iter().map(|session| async move {
            let outcome = {
                let mut channel = session.channel.lock().await;
                channel.ping().await
            };
            match outcome {
                Ok(()) => {
                    debug!(server = %session.name, "health check passed");
                    session.mark(true);
                }
                Err(e) => {
                    warn!(server = %session.name, error = %e, "health check failed");
                    session.mark(false);
                }
            }
        });
        join_all(probes).await;
    }

    /// Aggregate the tool catalog from healthy sessions, in registration
    /// order. Same-named tools from different backends are all listed;
    /// routing resolves the ambiguity first-registered-wins.
    pub fn all_tools(&self) -> Vec<ToolSchema> {
        self.sessions
            .iter()
            .filter(|session| session.is_healthy())
            .flat_map(|session| session.tools.iter().cloned())
            .collect()
    }

    /// Route a tool call to the first healthy session advertising it and
    /// normalize the reply.
    pub async fn invoke(
        &self,
        tool_name: &str,
        arguments: Value,
        request_id: &str,
    ) -> std::result::Result<Value, InvokeError> {
        for session in self.sessions.iter().filter(|s| s.is_healthy()) {
            if !session.has_tool(tool_name) {
                continue;
            }

            debug!(request_id, tool = tool_name, server = %session.name, "routing tool call");
            let outcome = {
                let mut channel = session.channel.lock().await;
                channel.call_tool(tool_name, arguments).await
            };

            return match outcome {
                Ok(payload) => Ok(payload.into_value()),
                Err(Error::ToolExecution(message)) => {
                    // The backend answered; the tool itself failed. The
                    // session stays healthy.
                    error!(request_id, tool = tool_name, error = %message, "tool execution failed");
                    Err(InvokeError::Execution(message))
                }
                Err(e) => {
                    error!(
                        request_id,
                        tool = tool_name,
                        server = %session.name,
                        error = %e,
                        "backend call failed, marking session unhealthy"
                    );
                    session.mark(false);
                    Err(InvokeError::Execution(e.to_string()))
                }
            };
        }

        Err(InvokeError::NotFound(tool_name.to_string()))
    }

    /// Close every session's channel in sequence. A failure closing one
    /// is logged and does not prevent closing the rest.
    pub async fn close_all(&self) {
        info!("closing backend connections");
        for session in &self.sessions {
            let outcome = {
                let mut channel = session.channel.lock().await;
                channel.close().await
            };
            match outcome {
                Ok(()) => info!(server = %session.name, "connection closed"),
                Err(e) => warn!(server = %session.name, error = %e, "error closing connection"),
            }
        }
    }
}
