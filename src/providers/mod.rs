//! Provider trait and message types for Attache
//!
//! This module defines the single tagged message representation used across
//! the whole system, together with the `Provider` trait every model backend
//! implements. Provider responses are converted into [`Message`] values once
//! at this boundary; nothing downstream branches on SDK-specific shapes.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod groq;

pub use groq::GroqProvider;

/// Message structure for conversation
///
/// Represents a message in the conversation with the model. Messages can be
/// from the user, assistant, system, or tool results. Insertion order is
/// conversation order; the model is stateless and reconstructs context
/// solely from this sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (user, assistant, system, tool)
    pub role: String,
    /// Content of the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls requested by the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Tool call id answered by this message (role = tool only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use attache::providers::Message;
    ///
    /// let msg = Message::user("create contact John Doe");
    /// assert_eq!(msg.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Creates a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Creates a tool result message answering the given tool call
    ///
    /// # Examples
    ///
    /// ```
    /// use attache::providers::Message;
    ///
    /// let msg = Message::tool_result("call_123", r#"{"message":"contact deleted"}"#);
    /// assert_eq!(msg.role, "tool");
    /// assert_eq!(msg.tool_call_id, Some("call_123".to_string()));
    /// ```
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Creates an assistant message carrying tool call requests
    pub fn assistant_with_tools(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }
}

/// Function call information inside a tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the tool to invoke
    pub name: String,
    /// Raw JSON arguments as produced by the model
    pub arguments: String,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Function call details
    pub function: FunctionCall,
}

/// Token usage reported by the provider for one completion
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub prompt_tokens: usize,
    /// Number of tokens in the completion
    pub completion_tokens: usize,
    /// Total tokens used (prompt + completion)
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Create a new TokenUsage instance
    ///
    /// # Examples
    ///
    /// ```
    /// use attache::providers::TokenUsage;
    ///
    /// let usage = TokenUsage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Whether the model may request tool invocations in this completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    /// The model decides whether to call tools
    Auto,
    /// Tool use disabled; used for the forced closing call on cap-out
    None,
}

impl ToolChoice {
    /// Wire representation expected by OpenAI-compatible APIs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::None => "none",
        }
    }
}

/// Response from a completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The assistant message produced by the model
    pub message: Message,
    /// Token usage for this completion, when the provider reports it
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    /// Creates a response with no usage information
    pub fn new(message: Message) -> Self {
        Self {
            message,
            usage: None,
        }
    }

    /// Attaches usage information
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Trait implemented by model backends
///
/// Given the full transcript and the tool catalog definitions, a provider
/// returns either free text or a list of requested tool invocations. The
/// call is the loop's only model-side suspension point and must carry a
/// timeout internally.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Requests one completion from the model
    ///
    /// # Arguments
    ///
    /// * `messages` - The full conversation transcript, in order
    /// * `tools` - Tool definitions in wire format
    /// * `tool_choice` - Whether tool use is enabled for this call
    ///
    /// # Errors
    ///
    /// Returns `AttacheError::Provider` on transport failures, non-2xx
    /// responses, or unparseable bodies. These are the only loop-fatal
    /// errors in the system.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
        tool_choice: ToolChoice,
    ) -> Result<CompletionResponse>;

    /// Model name used for usage records
    fn model(&self) -> String;
}
