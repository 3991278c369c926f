//! Tools module - Tool definitions and execution for model function calling
//!
//! Tools let the model act during a turn: read a document, find files, or
//! anything else an embedding application registers.
//!
//! # Overview
//!
//! - `Tool` trait: The interface that all tools must implement
//! - `ToolContext`: Per-invocation context (home directory, session id)
//! - `ToolRegistry`: Name-keyed registry; invocation returns a tagged result
//! - `ExecutionContext`: Scoped home directory, restored after each batch
//!
//! # Built-in Tools
//!
//! - `LoadFileTool`: Load a document under the home directory
//! - `SearchFilesTool`: Find files under the home directory
//!
//! # Example
//!
//! ```rust
//! use omni_agent::tools::{default_registry, ToolContext};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(dir.path().join("todo.txt"), "buy milk").unwrap();
//!
//! let registry = default_registry();
//! let ctx = ToolContext::new().with_home_dir(dir.path());
//! let args = json!({"path": "todo.txt"}).as_object().cloned().unwrap();
//! let result = registry.invoke("load_file", args, &ctx).await.unwrap();
//! assert_eq!(result["content"], "buy milk");
//! # });
//! ```

pub mod filesystem;
mod registry;
mod scope;
mod types;

pub use filesystem::{LoadFileTool, SearchFilesTool};
pub use registry::ToolRegistry;
pub use scope::{ExecutionContext, ExecutionScope};
pub use types::{Tool, ToolContext, ToolFailure, ToolResult};

pub use crate::session::ToolArgs;

/// Build a registry holding the built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(LoadFileTool::new()));
    registry.register(Box::new(SearchFilesTool::new()));
    registry
}
