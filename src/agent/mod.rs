//! Agent module - The turn-execution engine
//!
//! This module drives a conversation between the user and a model backend
//! that may call tools before answering. The agent is responsible for:
//!
//! - Building the system prompt and a budget-fitting view of the history
//! - Calling the model backend, batch or streaming
//! - Recovering tool calls the model wrote as inline JSON
//! - Dispatching tool calls and feeding results back to the model
//! - Recovering from an empty terminal response (the nudge)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ user input  │────>│  AgentLoop  │────>│ LLMProvider │
//! └─────────────┘     │             │<────│  (Ollama)   │
//!                     └─────────────┘     └─────────────┘
//!                       │         │
//!                       ▼         ▼
//!              ┌──────────────┐ ┌────────────────┐
//!              │ Conversation │ │ ToolDispatcher │
//!              │   (+store)   │ │  + registry    │
//!              └──────────────┘ └────────────────┘
//! ```

pub mod budget;
mod context;
mod dispatch;
mod inline_calls;
mod r#loop;
mod observer;
mod stream;

pub use budget::{resolve_window, Budget, ContextBudgeter, TokenEstimator, MIN_BUDGET_TOKENS};
pub use context::ContextBuilder;
pub use dispatch::ToolDispatcher;
pub use inline_calls::extract_inline_calls;
pub use observer::{AgentEvent, EventSink, Observer};
pub use r#loop::AgentLoop;
pub use stream::AnswerStream;
