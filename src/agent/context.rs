//! System prompt construction
//!
//! The `ContextBuilder` renders the system message that opens every
//! conversation: the current local date and time, the assistant's role, the
//! registered tools and the operating rules. A configured override replaces
//! everything after the date line.

use chrono::{DateTime, Local};

use crate::session::Message;

/// Role statement placed after the date line.
const ROLE_PROMPT: &str =
    "You are Omni, a helpful local research assistant running on the user's machine.";

/// Operating rules appended after the tool list.
const RULES_PROMPT: &str = r#"Rules:
- Use tools when they help; call them through the tool interface, never by writing JSON in your answer.
- File tools only see the user's home directory; paths are relative to it.
- After tools return, answer the user's question directly and cite sources (URL or file path) when you used them.
- If a tool fails, say so briefly and continue with what you have.
- Be concise."#;

/// Builder for the system prompt.
///
/// # Example
///
/// ```rust
/// use omni_agent::agent::ContextBuilder;
///
/// let builder = ContextBuilder::new().with_tools(vec!["load_file".to_string()]);
/// let system = builder.build_system_message();
/// assert!(system.content.starts_with("Today is "));
/// assert!(system.content.contains("load_file"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    tools: Vec<String>,
    override_prompt: Option<String>,
}

impl ContextBuilder {
    /// Create a builder with the built-in prompt and no tools.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tool names listed in the prompt.
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// Replace the role, tools and rules sections with `prompt`.
    ///
    /// # Example
    /// ```rust
    /// use omni_agent::agent::ContextBuilder;
    ///
    /// let builder = ContextBuilder::new().with_system_prompt("Answer in French.");
    /// let system = builder.build_system_message();
    /// assert!(system.content.ends_with("Answer in French."));
    /// assert!(!system.content.contains("Rules:"));
    /// ```
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.override_prompt = Some(prompt.to_string());
        self
    }

    /// Render the prompt for the current local time.
    pub fn build_system_prompt(&self) -> String {
        self.render_at(Local::now())
    }

    /// Build the system message for the current local time.
    pub fn build_system_message(&self) -> Message {
        Message::system(&self.build_system_prompt())
    }

    fn render_at(&self, now: DateTime<Local>) -> String {
        let date_line = format!("Today is {}.", now.format("%A, %B %-d, %Y %H:%M"));

        if let Some(ref prompt) = self.override_prompt {
            return format!("{}\n\n{}", date_line, prompt);
        }

        let tools = if self.tools.is_empty() {
            "No tools are available.".to_string()
        } else {
            format!("Available tools: {}.", self.tools.join(", "))
        };

        format!("{}\n\n{}\n\n{}\n\n{}", date_line, ROLE_PROMPT, tools, RULES_PROMPT)
    }
}
