//! Configuration type definitions for Omni Agent
//!
//! All types implement serde traits for JSON serialization and have sensible
//! defaults, so a partial `config.json` only needs the keys it changes.

use serde::{Deserialize, Serialize};

/// Main configuration struct for Omni Agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Turn-loop behavior (model, sampling, nudge recovery)
    pub agent: AgentConfig,
    /// Context window and budgeting knobs
    pub context: ContextConfig,
    /// Tool dispatch policy
    pub tools: ToolsConfig,
    /// Model backend connection settings
    pub providers: ProvidersConfig,
    /// Conversation persistence
    pub storage: StorageConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Default model tag requested from the backend.
pub const DEFAULT_MODEL: &str = "qwen3:8b";
/// Follow-up instruction injected when the model ends a turn with nothing.
pub const DEFAULT_NUDGE_PROMPT: &str = "Summarize the results succinctly.";
/// Marker prepended to an answer recovered through the nudge.
pub const DEFAULT_NUDGE_PREFIX: &str = "\nSo, ";

/// Agent turn-loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model tag, e.g. `qwen3:8b`
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum output tokens per call (`num_predict`)
    pub max_tokens: u32,
    /// Request extended reasoning when the model supports it
    pub reasoning: bool,
    /// Maximum tool dispatch rounds within one batch turn
    pub max_tool_iterations: u32,
    /// Use incremental delivery in the interactive chat
    pub streaming: bool,
    /// Replaces the built-in system prompt when set
    pub system_prompt: Option<String>,
    /// Follow-up user instruction used by nudge recovery
    pub nudge_prompt: String,
    /// Continuation marker prepended to a nudge-recovered answer
    pub nudge_prefix: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 512,
            reasoning: true,
            max_tool_iterations: 20,
            streaming: false,
            system_prompt: None,
            nudge_prompt: DEFAULT_NUDGE_PROMPT.to_string(),
            nudge_prefix: DEFAULT_NUDGE_PREFIX.to_string(),
        }
    }
}

// ============================================================================
// Context Configuration
// ============================================================================

/// Context window and token budgeting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// User cap on the context window; the smaller of this and the model's
    /// own maximum is used
    pub num_ctx: Option<usize>,
    /// Window used when neither the user nor the backend provides one
    pub default_num_ctx: usize,
    /// Tokens held back from the window for the reply
    pub margin_tokens: usize,
    /// Characters per token for the length heuristic
    pub chars_per_token: f64,
    /// Fixed per-message token overhead
    pub message_overhead_tokens: usize,
    /// Tool results are clipped to this many characters in the model copy
    pub max_tool_context_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            num_ctx: None,
            default_num_ctx: 262_144,
            margin_tokens: 256,
            chars_per_token: 4.0,
            message_overhead_tokens: 8,
            max_tool_context_chars: 20_000,
        }
    }
}

// ============================================================================
// Tools Configuration
// ============================================================================

/// Tool dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Cap on the stored text preview of a tool result
    pub max_result_chars: usize,
    /// Name of the web search tool that gets a `max_results` default
    pub search_tool: String,
    /// Default `max_results` injected for the search tool
    pub search_default_max_results: u64,
    /// Home directory for file tools (`~` is expanded)
    pub home_dir: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_result_chars: 12_000,
            search_tool: "duck_search".to_string(),
            search_default_max_results: 5,
            home_dir: None,
        }
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Model backend configurations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Local Ollama server
    pub ollama: OllamaConfig,
}

/// Ollama connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Base URL of the Ollama HTTP API
    pub api_base: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:11434".to_string(),
            timeout_secs: 300,
        }
    }
}

// ============================================================================
// Storage Configuration
// ============================================================================

/// Conversation storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Store root; `sessions/` is created beneath it. Defaults to `~/.omni-agent`.
    pub root: Option<String>,
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Append logs to this file instead of stderr
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: "warn".to_string(),
            file: None,
        }
    }
}
