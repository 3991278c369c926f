//! Tool registry for Omni Agent
//!
//! This module provides the `ToolRegistry` struct for managing and invoking
//! tools. The registry is built once, then shared read-only (behind an `Arc`)
//! by every agent loop.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use tracing::{error, info};

use crate::providers::ToolDefinition;
use crate::session::ToolArgs;

use super::{Tool, ToolContext, ToolFailure, ToolResult};

/// A registry that holds and manages tools.
///
/// # Example
///
/// ```rust
/// use omni_agent::tools::{ToolContext, ToolRegistry, LoadFileTool};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register(Box::new(LoadFileTool::new()));
/// assert!(registry.has("load_file"));
///
/// // No home directory set: the failure comes back as a value, not a panic.
/// let args = json!({"path": "notes.md"}).as_object().cloned().unwrap();
/// let result = registry.invoke("load_file", args, &ToolContext::new()).await;
/// assert!(result.is_err());
/// # });
/// ```
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool in the registry.
    ///
    /// If a tool with the same name already exists, it will be replaced.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        info!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Invoke a tool by name.
    ///
    /// This is the tagged-result boundary: a handler error becomes
    /// `Err(ToolFailure{kind, message})` and a handler panic becomes a
    /// `Panic` failure. Nothing a tool does can propagate past this call.
    /// An unknown name is reported as a `NotFound` failure.
    pub async fn invoke(&self, name: &str, args: ToolArgs, ctx: &ToolContext) -> ToolResult {
        let tool = match self.tools.get(name) {
            Some(t) => t,
            None => {
                return Err(ToolFailure::new(
                    "NotFound",
                    format!("Tool '{}' not available.", name),
                ))
            }
        };

        let start = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(args, ctx)).catch_unwind().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(value)) => {
                info!(tool = name, duration_ms, "Tool executed successfully");
                Ok(value)
            }
            Ok(Err(e)) => {
                error!(tool = name, error = %e, duration_ms, "Tool execution failed");
                Err(ToolFailure::from(e))
            }
            Err(payload) => {
                let failure = ToolFailure::panic(panic_message(payload.as_ref()));
                error!(tool = name, error = %failure, duration_ms, "Tool panicked");
                Err(failure)
            }
        }
    }

    /// Get all tool definitions for use with model providers, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|tool| ToolDefinition::new(tool.name(), tool.description(), tool.parameters()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Get the names of all registered tools, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check if a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    if let Some(s) = payload.downcast_ref::<&str>() {
        Some(s.to_string())
    } else {
        payload.downcast_ref::<String>().cloned()
    }
}
