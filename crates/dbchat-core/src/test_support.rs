//! Channel doubles shared by the session and chat test suites.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::registry::ServerConfig;
use crate::session::channel::{BackendChannel, ChannelConnector, ToolPayload};
use crate::session::ToolSchema;

/// Scripted behavior for one mock backend.
#[derive(Clone)]
pub(crate) struct MockBehavior {
    pub tools: Vec<ToolSchema>,
    replies: HashMap<String, String>,
    tool_errors: HashMap<String, String>,
    channel_failures: HashSet<String>,
    pub fail_ping: Arc<AtomicBool>,
    fail_close: bool,
    pub calls: Arc<Mutex<Vec<(String, Value)>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockBehavior {
    pub fn new(tools: Vec<ToolSchema>) -> Self {
        Self {
            tools,
            replies: HashMap::new(),
            tool_errors: HashMap::new(),
            channel_failures: HashSet::new(),
            fail_ping: Arc::new(AtomicBool::new(false)),
            fail_close: false,
            calls: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Script the text the backend replies with for a tool.
    pub fn with_reply(mut self, tool: &str, text: &str) -> Self {
        self.replies.insert(tool.to_string(), text.to_string());
        self
    }

    /// Script a backend-reported tool failure.
    pub fn with_tool_error(mut self, tool: &str, message: &str) -> Self {
        self.tool_errors.insert(tool.to_string(), message.to_string());
        self
    }

    /// Script a transport-level failure for a tool call.
    pub fn with_channel_failure(mut self, tool: &str) -> Self {
        self.channel_failures.insert(tool.to_string());
        self
    }

    pub fn with_close_failure(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

pub(crate) struct MockChannel {
    behavior: MockBehavior,
}

#[async_trait]
impl BackendChannel for MockChannel {
    async fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    async fn list_tools(&mut self) -> Result<Vec<ToolSchema>> {
        Ok(self.behavior.tools.clone())
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolPayload> {
        self.behavior
            .calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));

        if self.behavior.channel_failures.contains(name) {
            return Err(Error::Channel("connection reset".to_string()));
        }
        if let Some(message) = self.behavior.tool_errors.get(name) {
            return Err(Error::ToolExecution(message.clone()));
        }
        let text = self
            .behavior
            .replies
            .get(name)
            .cloned()
            .unwrap_or_else(|| "no content".to_string());
        Ok(ToolPayload::parse(&text))
    }

    async fn ping(&mut self) -> Result<()> {
        if self.behavior.fail_ping.load(Ordering::SeqCst) {
            Err(Error::Channel("ping failed".to_string()))
        } else {
            Ok(())
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.behavior.fail_close {
            return Err(Error::Channel("close failed".to_string()));
        }
        self.behavior.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out mock channels by backend name; unknown names fail
/// to connect, standing in for a backend that will not start.
pub(crate) struct MockConnector {
    behaviors: HashMap<String, MockBehavior>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
        }
    }

    pub fn with_backend(mut self, name: &str, behavior: MockBehavior) -> Self {
        self.behaviors.insert(name.to_string(), behavior);
        self
    }
}

#[async_trait]
impl ChannelConnector for MockConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<Box<dyn BackendChannel>> {
        match self.behaviors.get(&config.name) {
            Some(behavior) => Ok(Box::new(MockChannel {
                behavior: behavior.clone(),
            })),
            None => Err(Error::Launch(format!("no such backend: {}", config.name))),
        }
    }
}

/// A connector where every launch fails.
pub(crate) fn failing_connector() -> MockConnector {
    MockConnector::new()
}
