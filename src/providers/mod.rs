//! Providers module - Model backends
//!
//! This module defines the `LLMProvider` trait and common types for talking
//! to a language model. Backends implement `LLMProvider` and normalize their
//! wire format into [`LLMResponse`] at that boundary, so the agent loop only
//! ever sees one response shape.
//!
//! # Example
//!
//! ```rust,ignore
//! use omni_agent::providers::{ChatOptions, LLMProvider, OllamaProvider};
//! use omni_agent::session::Message;
//!
//! async fn example() {
//!     let provider = OllamaProvider::new("http://localhost:11434", "qwen3:8b");
//!     let messages = vec![Message::user("Hello!")];
//!     let options = ChatOptions::new().with_max_tokens(512);
//!
//!     let response = provider.chat(messages, vec![], None, options).await.unwrap();
//!     println!("Response: {}", response.content);
//! }
//! ```

pub mod ollama;
mod types;

use crate::error::ProviderError;

pub use ollama::OllamaProvider;
pub use types::{ChatOptions, LLMProvider, LLMResponse, StreamEvent, ToolDefinition, Usage};

/// Parse an HTTP status code and response body into a structured [`ProviderError`].
///
/// Only a client error that names the reasoning flag (Ollama answers
/// `"<model>" does not support thinking`) is classified as
/// [`ProviderError::UnsupportedFeature`], so the caller can retry without
/// that flag. Other refusals such as `does not support tools` stay
/// `InvalidRequest` and must not trigger the retry.
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    if (400..500).contains(&status) && mentions_reasoning_flag(body) {
        return ProviderError::UnsupportedFeature(body.to_string());
    }

    match status {
        401 | 403 => ProviderError::Auth(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        408 => ProviderError::Timeout(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 => ProviderError::InvalidRequest(body.to_string()),
        500..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}

/// Whether `body` talks about the `think` option. Quoted text is skipped
/// because Ollama quotes the model tag, and tags like `qwen3-thinking` are
/// not a statement about the flag.
fn mentions_reasoning_flag(body: &str) -> bool {
    body.split('"')
        .step_by(2)
        .any(|unquoted| unquoted.to_lowercase().contains("think"))
}
