//! GenAI-backed model provider
//!
//! Talks to the configured LLM through the genai framework with manual
//! tool control: tool definitions are attached to the request, tool-call
//! chunks are accumulated from the response stream, and execution stays
//! with the caller.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use genai::chat::{ChatMessage, ChatRequest, ChatStreamEvent, Tool, ToolCall, ToolResponse};
use genai::resolver::{AuthData, AuthResolver};
use genai::Client;
use genai::WebConfig;
use tracing::error;

use super::{ModelError, ModelProvider, ModelTurn, ToolUseRequest, Turn};
use crate::session::ToolSchema;

/// Classify a genai failure into the retry taxonomy. genai surfaces one
/// error type for every provider, so this inspects the error chain text;
/// the retry loop depends only on the resulting tag.
fn classify(message: &str) -> ModelError {
    let lower = message.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        ModelError::Timeout
    } else if lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit")
    {
        ModelError::RateLimited
    } else {
        ModelError::Other(message.to_string())
    }
}

/// Provider implementation using genai
pub struct GenAIProvider {
    client: Client,
    model: String,
    system_prompt: Option<String>,
}

impl GenAIProvider {
    /// Default timeout for LLM API requests (5 minutes)
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    /// Model used when none is configured
    pub const DEFAULT_MODEL: &'static str = "claude-sonnet-4-5";

    fn default_web_config() -> WebConfig {
        WebConfig::default()
            .with_timeout(Self::DEFAULT_TIMEOUT)
            .with_connect_timeout(Duration::from_secs(30))
    }

    /// Create a provider resolving credentials from the environment
    pub fn new(model: Option<&str>) -> Self {
        let client = Client::builder()
            .with_web_config(Self::default_web_config())
            .build();
        Self {
            client,
            model: model.unwrap_or(Self::DEFAULT_MODEL).to_string(),
            system_prompt: None,
        }
    }

    /// Create a provider with an explicit API key
    pub fn with_api_key(api_key: &str, model: Option<&str>) -> Self {
        let api_key = api_key.to_string();
        let auth_resolver = AuthResolver::from_resolver_fn(
            move |_model_iden| -> std::result::Result<Option<AuthData>, genai::resolver::Error> {
                Ok(Some(AuthData::from_single(api_key.clone())))
            },
        );

        let client = Client::builder()
            .with_web_config(Self::default_web_config())
            .with_auth_resolver(auth_resolver)
            .build();

        Self {
            client,
            model: model.unwrap_or(Self::DEFAULT_MODEL).to_string(),
            system_prompt: None,
        }
    }

    /// Set the system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert history and catalog into a genai request
    fn build_request(&self, history: &[Turn], tools: &[ToolSchema]) -> ChatRequest {
        let mut chat_req = ChatRequest::default();

        if let Some(system) = &self.system_prompt {
            chat_req = chat_req.with_system(system.as_str());
        }

        for turn in history {
            chat_req = match turn {
                Turn::User(text) => chat_req.append_message(ChatMessage::user(text)),
                Turn::Assistant(text) => chat_req.append_message(ChatMessage::assistant(text)),
                Turn::ToolUse { calls, .. } => {
                    // genai renders a Vec<ToolCall> as one assistant
                    // message carrying the tool calls.
                    let genai_calls: Vec<ToolCall> = calls
                        .iter()
                        .map(|call| ToolCall {
                            call_id: call.id.clone(),
                            fn_name: call.name.clone(),
                            fn_arguments: call.arguments.clone(),
                            thought_signatures: None,
                        })
                        .collect();
                    chat_req.append_message(genai_calls)
                }
                Turn::ToolResults(results) => {
                    let mut req = chat_req;
                    for result in results {
                        req = req.append_message(ToolResponse::new(
                            result.call_id.clone(),
                            result.content.clone(),
                        ));
                    }
                    req
                }
            };
        }

        if !tools.is_empty() {
            let genai_tools: Vec<Tool> = tools
                .iter()
                .map(|tool| {
                    Tool::new(&tool.name)
                        .with_description(&tool.description)
                        .with_schema(tool.input_schema.clone())
                })
                .collect();
            chat_req = chat_req.with_tools(genai_tools);
        }

        chat_req
    }
}

#[async_trait]
impl ModelProvider for GenAIProvider {
    async fn complete(
        &self,
        history: &[Turn],
        tools: &[ToolSchema],
    ) -> std::result::Result<ModelTurn, ModelError> {
        let chat_req = self.build_request(history, tools);

        // Stream to avoid idle-connection timeouts on long generations.
        let stream_response = self
            .client
            .exec_chat_stream(&self.model, chat_req, None)
            .await
            .map_err(|e| {
                let message = format!("{:?}", e);
                error!(error = %message, model = %self.model, "model request failed");
                classify(&message)
            })?;

        let mut content = String::new();
        let mut tool_calls: Vec<ToolUseRequest> = Vec::new();
        let mut stream = stream_response.stream;

        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => {
                    content.push_str(&chunk.content);
                }
                Ok(ChatStreamEvent::ToolCallChunk(tc)) => {
                    let call = tc.tool_call;
                    tool_calls.push(ToolUseRequest {
                        id: call.call_id,
                        name: call.fn_name,
                        arguments: call.fn_arguments,
                    });
                }
                Ok(ChatStreamEvent::End(_)) => break,
                Ok(_) => {
                    // Start, reasoning and thought-signature events carry
                    // nothing the conversation needs.
                }
                Err(e) => {
                    let message = format!("{:?}", e);
                    error!(error = %message, model = %self.model, "model stream error");
                    return Err(classify(&message));
                }
            }
        }

        Ok(ModelTurn {
            content: if content.is_empty() {
                None
            } else {
                Some(content)
            },
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_retryable() {
        assert_eq!(
            classify("reqwest error: operation timed out"),
            ModelError::Timeout
        );
        assert_eq!(classify("connect timeout elapsed"), ModelError::Timeout);
    }

    #[test]
    fn rate_limits_are_retryable() {
        assert_eq!(classify("HTTP 429 Too Many Requests"), ModelError::RateLimited);
        assert_eq!(
            classify("error: rate limit exceeded for model"),
            ModelError::RateLimited
        );
    }

    #[test]
    fn everything_else_is_fatal() {
        let err = classify("invalid api key");
        assert_eq!(err, ModelError::Other("invalid api key".to_string()));
    }

    #[test]
    fn default_model_applies() {
        let provider = GenAIProvider::new(None);
        assert_eq!(provider.model(), GenAIProvider::DEFAULT_MODEL);

        let provider = GenAIProvider::new(Some("claude-haiku-4-5"));
        assert_eq!(provider.model(), "claude-haiku-4-5");
    }
}
