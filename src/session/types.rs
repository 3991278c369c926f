//! Session types for Omni Agent
//!
//! This module defines the core types for conversation management:
//! messages, roles, tool calls and per-session metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arguments of a tool call: argument name to JSON value.
pub type ToolArgs = Map<String, Value>;

/// Metadata describing one stored conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Short opaque identifier (12 hex chars)
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// When this session was created
    pub created_at: DateTime<Utc>,
    /// When a message was last appended or the session renamed
    pub updated_at: DateTime<Utc>,
    /// Model tag the session was started with
    #[serde(default)]
    pub model: String,
}

impl SessionMeta {
    /// Create metadata for a fresh session with a generated id.
    ///
    /// # Example
    /// ```
    /// use omni_agent::session::SessionMeta;
    ///
    /// let meta = SessionMeta::new(None, "qwen3:8b");
    /// assert_eq!(meta.id.len(), 12);
    /// assert_eq!(meta.name, format!("session-{}", meta.id));
    /// ```
    pub fn new(name: Option<&str>, model: &str) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
        let name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("session-{}", id),
        };
        let now = Utc::now();
        Self {
            id,
            name,
            created_at: now,
            updated_at: now,
            model: model.to_string(),
        }
    }
}

/// A single message in a conversation.
///
/// Messages can be from users, assistants, system prompts, or tool results.
/// Optional fields are omitted from the serialized form when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The text content of the message (may be empty for tool-call batches)
    #[serde(default)]
    pub content: String,
    /// Tool calls requested by the assistant (assistant only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Name of the tool that produced this result (tool only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Arguments the tool was invoked with (tool only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<ToolArgs>,
    /// When the message was created
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            tool_calls: None,
            tool_name: None,
            tool_args: None,
            created_at: Utc::now(),
        }
    }

    /// Create a new user message.
    ///
    /// # Example
    /// ```
    /// use omni_agent::session::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: &str) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: &str) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: &str) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create an assistant message carrying a batch of tool calls and no text.
    ///
    /// # Example
    /// ```
    /// use omni_agent::session::{Message, ToolCall};
    /// use serde_json::json;
    ///
    /// let call = ToolCall::new("duck_search", json!({"query": "rust"}));
    /// let msg = Message::assistant_with_tools(vec![call]);
    /// assert!(msg.has_tool_calls());
    /// assert!(msg.content.is_empty());
    /// ```
    pub fn assistant_with_tools(calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, "");
        msg.tool_calls = Some(calls);
        msg
    }

    /// Create a tool result message.
    ///
    /// # Arguments
    /// * `tool_name` - Name of the tool that was invoked
    /// * `content` - Result text (or error text)
    /// * `args` - Arguments the tool ran with, kept for replay and audit
    pub fn tool_result(tool_name: &str, content: &str, args: Option<ToolArgs>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content);
        msg.tool_name = Some(tool_name.to_string());
        msg.tool_args = args;
        msg
    }

    /// Check if this message carries a non-empty tool-call batch.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty())
    }

    /// Check if this is a tool result message.
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message from the user
    User,
    /// Message from the AI assistant
    Assistant,
    /// System prompt or instruction
    System,
    /// Result from a tool execution
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool call requested by the assistant.
///
/// Identity is positional within one assistant message. On the wire and on
/// disk a call is stored in the canonical `{"function": {"name", "arguments"}}`
/// shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireToolCall", into = "WireToolCall")]
pub struct ToolCall {
    /// Name of the tool to invoke
    pub name: String,
    /// Arguments keyed by parameter name
    pub arguments: ToolArgs,
}

impl ToolCall {
    /// Create a tool call. Non-object `arguments` become an empty mapping.
    ///
    /// # Example
    /// ```
    /// use omni_agent::session::ToolCall;
    /// use serde_json::json;
    ///
    /// let call = ToolCall::new("load_file", json!({"path": "notes.md"}));
    /// assert_eq!(call.arguments["path"], "notes.md");
    /// ```
    pub fn new(name: &str, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.to_string(),
            arguments,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: ToolArgs,
}

impl From<WireToolCall> for ToolCall {
    fn from(wire: WireToolCall) -> Self {
        Self {
            name: wire.function.name,
            arguments: wire.function.arguments,
        }
    }
}

impl From<ToolCall> for WireToolCall {
    fn from(call: ToolCall) -> Self {
        Self {
            function: WireFunction {
                name: call.name,
                arguments: call.arguments,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
        let role: Role = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, Role::Assistant);
    }

    #[test]
    fn test_tool_call_canonical_shape() {
        let call = ToolCall::new("duck_search", json!({"query": "x"}));
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(
            value,
            json!({"function": {"name": "duck_search", "arguments": {"query": "x"}}})
        );
    }

    #[test]
    fn test_tool_call_missing_arguments_defaults_to_empty() {
        let call: ToolCall = serde_json::from_value(json!({"function": {"name": "t"}})).unwrap();
        assert_eq!(call.name, "t");
        assert!(call.arguments.is_empty());
    }

    #[test]
    fn test_tool_call_non_object_arguments_become_empty() {
        let call = ToolCall::new("t", json!("not a map"));
        assert!(call.arguments.is_empty());
    }

    #[test]
    fn test_message_omits_unset_fields() {
        let value = serde_json::to_value(Message::user("hi")).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("tool_calls"));
        assert!(!obj.contains_key("tool_name"));
        assert!(!obj.contains_key("tool_args"));
        assert_eq!(obj["role"], "user");
        assert!(obj.contains_key("created_at"));
    }

    #[test]
    fn test_tool_result_keeps_name_and_args() {
        let args = json!({"path": "a.txt"}).as_object().cloned();
        let msg = Message::tool_result("load_file", "contents", args);
        assert!(msg.is_tool_result());
        assert_eq!(msg.tool_name.as_deref(), Some("load_file"));
        assert_eq!(msg.tool_args.unwrap()["path"], "a.txt");
    }

    #[test]
    fn test_message_parses_without_created_at() {
        let msg: Message = serde_json::from_str(r#"{"role":"assistant","content":"ok"}"#).unwrap();
        assert_eq!(msg.content, "ok");
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_empty_tool_call_list_is_not_a_batch() {
        let msg = Message::assistant_with_tools(vec![]);
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_session_meta_custom_name() {
        let meta = SessionMeta::new(Some("  research "), "m");
        assert_eq!(meta.name, "research");
        assert_eq!(meta.model, "m");
        assert!(meta.id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
