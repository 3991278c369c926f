//! Shared CLI helpers used across command handlers.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use omni_agent::config::Config;
use omni_agent::providers::OllamaProvider;
use omni_agent::session::{ConversationStore, SessionStore};

/// Open the file-backed conversation store under the configured root.
pub(crate) fn open_store(config: &Config) -> Result<Arc<dyn ConversationStore>> {
    let root = config.store_root();
    let store = SessionStore::with_path(root.clone())
        .with_context(|| format!("Failed to open conversation store at {:?}", root))?;
    Ok(Arc::new(store))
}

/// Build the Ollama provider from config.
pub(crate) fn build_provider(config: &Config) -> OllamaProvider {
    let ollama = &config.providers.ollama;
    OllamaProvider::with_timeout(
        &ollama.api_base,
        &config.agent.model,
        Duration::from_secs(ollama.timeout_secs),
    )
}

/// Print `prompt` and read one line from stdin. `None` on EOF.
pub(crate) fn prompt_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut input)
        .with_context(|| "Failed to read input")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}
