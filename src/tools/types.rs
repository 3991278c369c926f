//! Tool types for Omni Agent
//!
//! This module defines the `Tool` trait that all tools implement, the
//! `ToolContext` handed to each invocation, and `ToolFailure`, the error half
//! of the tagged result returned at the registry boundary.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{OmniError, Result};
use crate::session::ToolArgs;

/// Trait that all tools must implement.
///
/// Tools are executable functions the model can call, such as searching the
/// web or reading a file under the home directory.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use omni_agent::error::Result;
/// use omni_agent::session::ToolArgs;
/// use omni_agent::tools::{Tool, ToolContext};
///
/// struct ClockTool;
///
/// #[async_trait]
/// impl Tool for ClockTool {
///     fn name(&self) -> &str { "clock" }
///     fn description(&self) -> &str { "Returns the current UTC time" }
///     fn parameters(&self) -> Value {
///         json!({"type": "object", "properties": {}, "required": []})
///     }
///     async fn execute(&self, _args: ToolArgs, _ctx: &ToolContext) -> Result<Value> {
///         Ok(json!(chrono::Utc::now().to_rfc3339()))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name.
    ///
    /// This name is used to identify the tool when the model requests it.
    /// It should be unique within a registry.
    fn name(&self) -> &str;

    /// Get the tool description sent to the model.
    fn description(&self) -> &str;

    /// Get the JSON schema for the tool's parameters.
    fn parameters(&self) -> Value;

    /// Execute the tool with the given arguments.
    ///
    /// The returned value is serialized into the conversation by the
    /// dispatcher. Errors become `ERROR: <kind>: <message>` tool results;
    /// they never abort the turn.
    async fn execute(&self, args: ToolArgs, ctx: &ToolContext) -> Result<Value>;
}

/// Execution context handed to a tool invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolContext {
    /// Directory file tools are confined to, if one is set
    pub home_dir: Option<PathBuf>,
    /// Session the invocation belongs to
    pub session_id: Option<String>,
}

impl ToolContext {
    /// Create an empty context.
    ///
    /// # Example
    /// ```
    /// use omni_agent::tools::ToolContext;
    ///
    /// let ctx = ToolContext::new().with_home_dir("/tmp/docs");
    /// assert_eq!(ctx.home_dir().unwrap().to_str(), Some("/tmp/docs"));
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the home directory.
    pub fn with_home_dir(mut self, home_dir: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home_dir.into());
        self
    }

    /// Set the session id.
    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    /// The home directory, if set.
    pub fn home_dir(&self) -> Option<&Path> {
        self.home_dir.as_deref()
    }
}

/// Why a tool invocation failed.
///
/// Rendered into the conversation as `"{kind}: {message}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    /// Short error kind, e.g. `IoError` or `Panic`
    pub kind: String,
    /// Human-readable detail
    pub message: String,
}

impl ToolFailure {
    /// Create a failure from its parts.
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    /// A handler panicked; `payload` is the panic payload if it was a string.
    pub fn panic(payload: Option<String>) -> Self {
        Self::new(
            "Panic",
            payload.unwrap_or_else(|| "tool panicked".to_string()),
        )
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<OmniError> for ToolFailure {
    fn from(err: OmniError) -> Self {
        Self::new(err.kind(), err.detail())
    }
}

/// Outcome of one tool invocation.
pub type ToolResult = std::result::Result<Value, ToolFailure>;
