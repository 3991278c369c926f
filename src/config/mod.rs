//! Configuration management for Omni Agent
//!
//! Configuration is loaded from `~/.omni-agent/config.json` with `OMNI_*`
//! environment variable overrides applied on top.

mod types;

pub use types::*;

use crate::error::{OmniError, Result};
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the Omni Agent configuration directory path (~/.omni-agent)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".omni-agent")
    }

    /// Returns the path to the config file (~/.omni-agent/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `OMNI_*` environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable numeric
    /// values are ignored.
    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Agent
        if let Some(val) = lookup("OMNI_MODEL") {
            self.agent.model = val;
        }
        if let Some(v) = lookup("OMNI_NUM_PREDICT").and_then(|v| v.parse().ok()) {
            self.agent.max_tokens = v;
        }
        if let Some(val) = lookup("OMNI_STREAM") {
            self.agent.streaming = parse_flag(&val);
        }

        // Context
        if let Some(v) = lookup("OMNI_NUM_CTX").and_then(|v| v.parse().ok()) {
            self.context.num_ctx = Some(v);
        }
        if let Some(v) = lookup("OMNI_CTX_MARGIN").and_then(|v| v.parse().ok()) {
            self.context.margin_tokens = v;
        }
        if let Some(v) = lookup("OMNI_CHARS_PER_TOKEN").and_then(|v| v.parse().ok()) {
            self.context.chars_per_token = v;
        }
        if let Some(v) = lookup("OMNI_MAX_TOOL_CTX_CHARS").and_then(|v| v.parse().ok()) {
            self.context.max_tool_context_chars = v;
        }

        // Tools / storage / provider
        if let Some(val) = lookup("OMNI_HOME_DIR") {
            self.tools.home_dir = Some(val);
        }
        if let Some(val) = lookup("OMNI_STORE_ROOT") {
            self.storage.root = Some(val);
        }
        if let Some(val) = lookup("OMNI_OLLAMA_HOST") {
            self.providers.ollama.api_base = val;
        }

        // Logging
        if let Some(val) = lookup("OMNI_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("OMNI_LOG_FORMAT") {
            match val.to_ascii_lowercase().as_str() {
                "json" => self.logging.format = LogFormat::Json,
                "text" => self.logging.format = LogFormat::Text,
                _ => {}
            }
        }
    }

    /// Reject values the budgeting math cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.context.chars_per_token.is_finite() && self.context.chars_per_token > 0.0) {
            return Err(OmniError::Config(format!(
                "context.chars_per_token must be a positive number, got {}",
                self.context.chars_per_token
            )));
        }
        if self.agent.model.trim().is_empty() {
            return Err(OmniError::Config("agent.model must not be empty".into()));
        }
        Ok(())
    }

    /// Directory holding the conversation store.
    pub fn store_root(&self) -> PathBuf {
        match &self.storage.root {
            Some(root) => expand_home(root),
            None => Self::dir(),
        }
    }

    /// Configured home directory for file tools, if any.
    pub fn home_dir(&self) -> Option<PathBuf> {
        self.tools
            .home_dir
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(expand_home)
    }
}

fn parse_flag(val: &str) -> bool {
    matches!(
        val.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Expand ~ to home directory in a path string
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    PathBuf::from(path)
}
