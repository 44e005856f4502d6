//! Groq provider implementation for Attache
//!
//! Connects to any OpenAI-compatible chat completions endpoint. Tool
//! definitions are wrapped into the `{"type":"function","function":{...}}`
//! wire format and response messages are converted back into the crate's
//! [`Message`] representation at this boundary.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AttacheError, Result};
use crate::providers::{
    CompletionResponse, FunctionCall, Message, Provider, TokenUsage, ToolCall, ToolChoice,
};

/// OpenAI-compatible chat completions provider
///
/// # Examples
///
/// ```no_run
/// use attache::providers::{GroqProvider, Provider, Message, ToolChoice};
///
/// # async fn example() -> attache::error::Result<()> {
/// let provider = GroqProvider::new(
///     "https://api.groq.com/openai/v1",
///     "api-key",
///     "llama-3.3-70b-versatile",
///     4096,
///     60,
/// )?;
/// let messages = vec![Message::user("Hello!")];
/// let completion = provider.complete(&messages, &[], ToolChoice::Auto).await?;
/// # Ok(())
/// # }
/// ```
pub struct GroqProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_completion_tokens: u32,
}

/// Request body for the chat completions endpoint
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    tool_choice: &'a str,
    max_completion_tokens: u32,
    stream: bool,
}

/// Response body from the chat completions endpoint
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

/// Assistant message as returned on the wire
#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

impl GroqProvider {
    /// Creates a new provider instance
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the OpenAI-compatible API
    /// * `api_key` - Bearer token for the API
    /// * `model` - Model name sent with every request
    /// * `max_completion_tokens` - Completion token cap per call
    /// * `timeout_secs` - Request timeout for the HTTP client
    ///
    /// # Errors
    ///
    /// Returns `AttacheError::Provider` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_completion_tokens: u32,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AttacheError::Provider(format!("failed to create HTTP client: {}", e)))?;

        let base_url = base_url.into();
        let model = model.into();
        tracing::info!("Initialized model provider: base={}, model={}", base_url, model);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model,
            max_completion_tokens,
        })
    }

    /// Wraps bare tool definitions into the function-calling wire format
    fn wrap_tools(tools: &[serde_json::Value]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| serde_json::json!({ "type": "function", "function": t }))
            .collect()
    }

    /// Converts a wire message into the crate's message representation
    fn convert_message(wire: WireMessage) -> Message {
        match wire.tool_calls {
            Some(calls) if !calls.is_empty() => {
                let converted = calls
                    .into_iter()
                    .map(|tc| ToolCall {
                        id: tc.id,
                        function: FunctionCall {
                            name: tc.function.name,
                            arguments: tc.function.arguments,
                        },
                    })
                    .collect();
                Message::assistant_with_tools(wire.content, converted)
            }
            _ => Message::assistant(wire.content.unwrap_or_default()),
        }
    }
}

#[async_trait]
impl Provider for GroqProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
        tool_choice: ToolChoice,
    ) -> Result<CompletionResponse> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            tools: match tool_choice {
                ToolChoice::Auto => Self::wrap_tools(tools),
                ToolChoice::None => Vec::new(),
            },
            tool_choice: tool_choice.as_str(),
            max_completion_tokens: self.max_completion_tokens,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!("Requesting completion: model={}, messages={}", self.model, messages.len());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AttacheError::Provider(format!("completion request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttacheError::Provider(format!(
                "completion returned {}: {}",
                status, body
            ))
            .into());
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AttacheError::Provider(format!("unparseable completion body: {}", e)))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AttacheError::Provider("completion had no choices".to_string()))?;

        let mut completion = CompletionResponse::new(Self::convert_message(choice.message));
        if let Some(usage) = body.usage {
            completion =
                completion.with_usage(TokenUsage::new(usage.prompt_tokens, usage.completion_tokens));
        }

        Ok(completion)
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}
