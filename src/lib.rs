//! Omni Agent - A local research assistant that drives a language model through
//! multi-step tool use.

pub mod agent;
pub mod config;
pub mod error;
pub mod providers;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::{AgentEvent, AgentLoop, AnswerStream};
pub use config::Config;
pub use error::{OmniError, ProviderError, Result};
pub use providers::{
    ChatOptions, LLMProvider, LLMResponse, OllamaProvider, StreamEvent, ToolDefinition, Usage,
};
pub use session::{ConversationStore, Message, Role, SessionMeta, SessionStore, ToolCall};
pub use tools::{Tool, ToolContext, ToolRegistry};
