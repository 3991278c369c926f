//! Ollama Provider Implementation
//!
//! This module implements the `LLMProvider` trait for a local Ollama server's
//! `/api/chat` endpoint, handling message conversion, tool calls, NDJSON
//! streaming and context-window discovery via `/api/show`.
//!
//! # Example
//!
//! ```rust,ignore
//! use omni_agent::providers::{ollama::OllamaProvider, ChatOptions, LLMProvider};
//! use omni_agent::session::Message;
//!
//! async fn example() {
//!     let provider = OllamaProvider::new("http://localhost:11434", "qwen3:8b");
//!
//!     let messages = vec![
//!         Message::system("You are a helpful assistant."),
//!         Message::user("Hello!"),
//!     ];
//!
//!     let response = provider
//!         .chat(messages, vec![], None, ChatOptions::default())
//!         .await
//!         .unwrap();
//!
//!     println!("Ollama: {}", response.content);
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, info, warn};

use crate::error::{OmniError, ProviderError, Result};
use crate::session::{Message, Role, ToolArgs, ToolCall};

use super::{
    parse_provider_error, ChatOptions, LLMProvider, LLMResponse, StreamEvent, ToolDefinition,
    Usage,
};

/// Default Ollama API base URL.
pub const DEFAULT_API_BASE: &str = "http://localhost:11434";

// ============================================================================
// Ollama API Request Types
// ============================================================================

/// `/api/chat` request body.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool>,
    stream: bool,
    /// Only sent when requested; older models reject the key outright
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
    options: OllamaOptions,
}

/// Model runtime options.
#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// A message in Ollama's format.
#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

/// A tool call, both in requests and responses.
#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    /// Usually an object; some models send a JSON-encoded string
    #[serde(default)]
    arguments: Value,
}

/// Ollama tool definition.
#[derive(Debug, Serialize)]
struct OllamaTool {
    r#type: &'static str,
    function: OllamaFunctionDef,
}

#[derive(Debug, Serialize)]
struct OllamaFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

// ============================================================================
// Ollama API Response Types
// ============================================================================

/// One `/api/chat` response object (the whole body, or one NDJSON line).
#[derive(Debug, Default, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

// ============================================================================
// Ollama Provider
// ============================================================================

/// Ollama model backend.
///
/// Implements the `LLMProvider` trait for Ollama's chat API.
/// The model's maximum context length is probed once and cached.
pub struct OllamaProvider {
    /// API base URL (no trailing slash)
    api_base: String,
    /// Model used when the caller passes no override
    model: String,
    /// HTTP client for making requests
    client: Client,
    /// Cached result of the `/api/show` probe
    model_max_ctx: OnceCell<Option<usize>>,
}

impl OllamaProvider {
    /// Create a new Ollama provider for `model` served at `api_base`.
    ///
    /// # Example
    /// ```
    /// use omni_agent::providers::ollama::OllamaProvider;
    /// use omni_agent::providers::LLMProvider;
    ///
    /// let provider = OllamaProvider::new("http://localhost:11434/", "qwen3:8b");
    /// assert_eq!(provider.name(), "ollama");
    /// assert_eq!(provider.default_model(), "qwen3:8b");
    /// ```
    pub fn new(api_base: &str, model: &str) -> Self {
        Self::with_client(api_base, model, Client::new())
    }

    /// Create a provider whose requests time out after `timeout`.
    pub fn with_timeout(api_base: &str, model: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(api_base, model, client)
    }

    /// Create a new Ollama provider with a custom HTTP client.
    pub fn with_client(api_base: &str, model: &str, client: Client) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            model_max_ctx: OnceCell::new(),
        }
    }

    fn build_request(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
        stream: bool,
    ) -> OllamaRequest {
        OllamaRequest {
            model: model.unwrap_or(&self.model).to_string(),
            messages: convert_messages(messages),
            tools: convert_tools(tools),
            stream,
            think: options.reasoning.then_some(true),
            options: OllamaOptions {
                temperature: options.temperature,
                num_ctx: options.context_window,
                num_predict: options.max_tokens,
            },
        }
    }

    async fn post_chat(&self, request: &OllamaRequest) -> Result<reqwest::Response> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            think = request.think.unwrap_or(false),
            "Ollama chat request"
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.api_base))
            .json(request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            let body = match serde_json::from_str::<OllamaErrorResponse>(&error_text) {
                Ok(err) => err.error,
                Err(_) => error_text,
            };
            return Err(OmniError::from(parse_provider_error(status, &body)));
        }
        Ok(response)
    }

    async fn probe_context_length(&self) -> Option<usize> {
        let response = self
            .client
            .post(format!("{}/api/show", self.api_base))
            .json(&serde_json::json!({ "model": self.model }))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            warn!(model = %self.model, status = %response.status(), "Model info probe failed");
            return None;
        }
        let info: Value = response.json().await.ok()?;
        let found = find_context_length(&info);
        info!(model = %self.model, context_length = ?found, "Probed model context window");
        found
    }
}

fn classify_transport_error(err: reqwest::Error) -> OmniError {
    if err.is_timeout() {
        OmniError::from(ProviderError::Timeout(err.to_string()))
    } else {
        OmniError::Http(err)
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert crate messages to Ollama API format.
fn convert_messages(messages: Vec<Message>) -> Vec<OllamaMessage> {
    messages
        .into_iter()
        .map(|msg| {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };

            let tool_calls = msg.tool_calls.filter(|tcs| !tcs.is_empty()).map(|tcs| {
                tcs.into_iter()
                    .map(|tc| OllamaToolCall {
                        function: OllamaFunctionCall {
                            name: tc.name,
                            arguments: Value::Object(tc.arguments),
                        },
                    })
                    .collect()
            });

            OllamaMessage {
                role,
                content: msg.content,
                tool_calls,
                tool_name: msg.tool_name,
            }
        })
        .collect()
}

/// Convert tool definitions to Ollama API format.
fn convert_tools(tools: Vec<ToolDefinition>) -> Vec<OllamaTool> {
    tools
        .into_iter()
        .map(|t| OllamaTool {
            r#type: "function",
            function: OllamaFunctionDef {
                name: t.name,
                description: t.description,
                parameters: t.parameters,
            },
        })
        .collect()
}

/// Normalize one tool call. Calls without a name are dropped; unparseable or
/// non-object arguments become an empty mapping.
fn normalize_tool_call(call: OllamaToolCall) -> Option<ToolCall> {
    let name = call.function.name.trim();
    if name.is_empty() {
        return None;
    }
    let arguments: ToolArgs = match call.function.arguments {
        Value::Object(map) => map,
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            _ => ToolArgs::new(),
        },
        _ => ToolArgs::new(),
    };
    Some(ToolCall {
        name: name.to_string(),
        arguments,
    })
}

/// Convert an Ollama response to an `LLMResponse`.
fn convert_response(response: OllamaResponse) -> LLMResponse {
    let message = response.message.unwrap_or_default();
    let content = message.content.unwrap_or_default();
    let tool_calls: Vec<ToolCall> = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter_map(normalize_tool_call)
        .collect();

    let mut llm_response = LLMResponse::with_tools(&content, tool_calls);
    if response.prompt_eval_count.is_some() || response.eval_count.is_some() {
        llm_response = llm_response.with_usage(Usage::new(
            response.prompt_eval_count.unwrap_or(0),
            response.eval_count.unwrap_or(0),
        ));
    }
    llm_response
}

/// Find the model's context length in an `/api/show` body.
///
/// Looks at `model_info` keys such as `qwen3.context_length` first, then
/// a `num_ctx` line in the `parameters` text.
fn find_context_length(info: &Value) -> Option<usize> {
    let as_count = |v: &Value| -> Option<usize> {
        match v {
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    };

    if let Some(model_info) = info.get("model_info").and_then(Value::as_object) {
        let found = model_info
            .iter()
            .find(|(key, _)| key.ends_with("context_length"))
            .and_then(|(_, v)| as_count(v));
        if found.is_some_and(|n| n > 0) {
            return found;
        }
    }

    if let Some(params) = info.get("parameters").and_then(Value::as_str) {
        for line in params.lines() {
            let mut parts = line.split_whitespace();
            if parts.next() == Some("num_ctx") {
                if let Some(n) = parts.next().and_then(|v| v.parse().ok()) {
                    return Some(n);
                }
            }
        }
    }

    info.get("context_length")
        .and_then(as_count)
        .filter(|n| *n > 0)
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let request = self.build_request(messages, tools, model, options, false);
        let response = self.post_chat(&request).await?;

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| OmniError::Provider(format!("Failed to parse Ollama response: {}", e)))?;

        if let Some(error) = ollama_response.error {
            return Err(OmniError::from(parse_provider_error(400, &error)));
        }

        let llm_response = convert_response(ollama_response);
        debug!(
            content_len = llm_response.content.len(),
            tool_calls = llm_response.tool_calls.len(),
            "Ollama response received"
        );
        Ok(llm_response)
    }

    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        use futures::StreamExt;

        let request = self.build_request(messages, tools, model, options, true);
        let response = self.post_chat(&request).await?;

        let (tx, rx) = mpsc::channel::<StreamEvent>(32);
        let byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut assembled_content = String::new();
            let mut usage: Option<Usage> = None;
            let mut line_buffer: Vec<u8> = Vec::new();

            tokio::pin!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(StreamEvent::Error(OmniError::Provider(format!(
                                "Stream read error: {}",
                                e
                            ))))
                            .await;
                        return;
                    }
                };

                // Split on raw bytes so a multibyte char cut across chunks survives.
                line_buffer.extend_from_slice(&chunk);

                while let Some(newline_pos) = line_buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = line_buffer.drain(..=newline_pos).collect();
                    let decoded = String::from_utf8_lossy(&raw);
                    let line = decoded.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let event: OllamaResponse = match serde_json::from_str(line) {
                        Ok(v) => v,
                        Err(e) => {
                            debug!(error = %e, "Skipping unparseable stream line");
                            continue;
                        }
                    };

                    if let Some(error) = event.error {
                        let _ = tx
                            .send(StreamEvent::Error(OmniError::from(parse_provider_error(
                                400, &error,
                            ))))
                            .await;
                        return;
                    }

                    let text = event
                        .message
                        .and_then(|m| m.content)
                        .unwrap_or_default();
                    if !text.is_empty() {
                        assembled_content.push_str(&text);
                        if tx.send(StreamEvent::Delta(text)).await.is_err() {
                            // Receiver dropped: the caller abandoned the stream.
                            return;
                        }
                    }

                    if event.done {
                        if event.prompt_eval_count.is_some() || event.eval_count.is_some() {
                            usage = Some(Usage::new(
                                event.prompt_eval_count.unwrap_or(0),
                                event.eval_count.unwrap_or(0),
                            ));
                        }
                        let _ = tx
                            .send(StreamEvent::Done {
                                content: std::mem::take(&mut assembled_content),
                                usage,
                            })
                            .await;
                        return;
                    }
                }
            }

            let _ = tx
                .send(StreamEvent::Done {
                    content: assembled_content,
                    usage,
                })
                .await;
        });

        Ok(rx)
    }

    async fn context_window(&self) -> Option<usize> {
        *self
            .model_max_ctx
            .get_or_init(|| self.probe_context_length())
            .await
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

// ============================================================================
// Tests
// ============================================================================
