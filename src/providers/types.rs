//! Provider types for Omni Agent
//!
//! This module defines the core types and traits for model backends,
//! including the `LLMProvider` trait, chat options, and response types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{OmniError, Result};
use crate::session::{Message, ToolCall};

/// Definition of a tool that can be called by the model.
///
/// Definitions only advertise capabilities to the backend; arguments are
/// never validated against `parameters` by the agent itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    ///
    /// # Example
    /// ```
    /// use omni_agent::providers::ToolDefinition;
    /// use serde_json::json;
    ///
    /// let tool = ToolDefinition::new(
    ///     "duck_search",
    ///     "Search the web for information",
    ///     json!({
    ///         "type": "object",
    ///         "properties": {
    ///             "query": { "type": "string", "description": "Search query" }
    ///         },
    ///         "required": ["query"]
    ///     }),
    /// );
    /// assert_eq!(tool.name, "duck_search");
    /// ```
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Events produced by a streaming chat call.
#[derive(Debug)]
pub enum StreamEvent {
    /// A piece of answer text
    Delta(String),
    /// The stream finished normally
    Done {
        /// All text produced by the stream
        content: String,
        /// Token usage, when the backend reports it
        usage: Option<Usage>,
    },
    /// The stream failed; no further events follow
    Error(OmniError),
}

/// Trait for model backends.
///
/// A provider translates between the crate's message format and the
/// backend's API, and performs all response-shape normalization itself:
/// callers only ever see [`LLMResponse`] with canonical [`ToolCall`]s.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat request and wait for the full response.
    ///
    /// # Arguments
    /// * `messages` - The conversation (already budgeted)
    /// * `tools` - Available tools the model can call
    /// * `model` - Optional model override (uses default if None)
    /// * `options` - Sampling, window and feature options
    ///
    /// # Errors
    /// A rejected optional feature must surface as
    /// `ProviderError::UnsupportedFeature` so the caller can retry without it.
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse>;

    /// Send a chat request and receive the answer incrementally.
    ///
    /// The default implementation performs one [`chat`](Self::chat) call and
    /// delivers its content as a single delta.
    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let response = self.chat(messages, tools, model, options).await?;
        let (tx, rx) = mpsc::channel(2);
        if !response.content.is_empty() {
            let _ = tx.send(StreamEvent::Delta(response.content.clone())).await;
        }
        let _ = tx
            .send(StreamEvent::Done {
                content: response.content,
                usage: response.usage,
            })
            .await;
        Ok(rx)
    }

    /// The model's own maximum context window in tokens, if known.
    async fn context_window(&self) -> Option<usize> {
        None
    }

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;

    /// Get the provider name.
    fn name(&self) -> &str;
}

/// Options for chat requests.
///
/// Use the builder pattern to construct options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature for sampling (0.0 = deterministic)
    pub temperature: Option<f32>,
    /// Effective context window to request from the backend
    pub context_window: Option<usize>,
    /// Ask for extended reasoning; backends may reject this
    pub reasoning: bool,
}

impl ChatOptions {
    /// Create new default chat options.
    ///
    /// # Example
    /// ```
    /// use omni_agent::providers::ChatOptions;
    ///
    /// let options = ChatOptions::new();
    /// assert!(options.max_tokens.is_none());
    /// assert!(!options.reasoning);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of tokens to generate.
    ///
    /// # Example
    /// ```
    /// use omni_agent::providers::ChatOptions;
    ///
    /// let options = ChatOptions::new().with_max_tokens(512);
    /// assert_eq!(options.max_tokens, Some(512));
    /// ```
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the context window the backend should allocate.
    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window = Some(tokens);
        self
    }

    /// Enable or disable the extended reasoning flag.
    pub fn with_reasoning(mut self, enabled: bool) -> Self {
        self.reasoning = enabled;
        self
    }
}

/// Response from a chat request, normalized at the provider boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Text content of the response (may be empty)
    pub content: String,
    /// Structured tool calls, in the order the model emitted them
    pub tool_calls: Vec<ToolCall>,
    /// Token usage information (if available)
    pub usage: Option<Usage>,
}

impl LLMResponse {
    /// Create a simple text response with no tool calls.
    ///
    /// # Example
    /// ```
    /// use omni_agent::providers::LLMResponse;
    ///
    /// let response = LLMResponse::text("Hello, world!");
    /// assert_eq!(response.content, "Hello, world!");
    /// assert!(!response.has_tool_calls());
    /// ```
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            tool_calls: vec![],
            usage: None,
        }
    }

    /// Create a response with tool calls.
    ///
    /// # Example
    /// ```
    /// use omni_agent::providers::LLMResponse;
    /// use omni_agent::session::ToolCall;
    /// use serde_json::json;
    ///
    /// let call = ToolCall::new("duck_search", json!({"query": "rust"}));
    /// let response = LLMResponse::with_tools("", vec![call]);
    /// assert!(response.has_tool_calls());
    /// ```
    pub fn with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.to_string(),
            tool_calls,
            usage: None,
        }
    }

    /// Create a response with neither content nor tool calls.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if this response contains any tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Set usage information for this response.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Token usage information from a chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the prompt
    pub prompt_tokens: u32,
    /// Number of tokens in the completion
    pub completion_tokens: u32,
    /// Total tokens used (prompt + completion)
    pub total_tokens: u32,
}

impl Usage {
    /// Create new usage information.
    ///
    /// # Example
    /// ```
    /// use omni_agent::providers::Usage;
    ///
    /// let usage = Usage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}
