//! Logging initialization for Omni Agent.
//!
//! Supports two formats:
//! - `text`: compact `timestamp LEVEL target message {fields}` lines
//! - `json`: structured JSON lines for log aggregators
//!
//! Output goes to stderr (or a file) so it never interleaves with answers
//! streamed to stdout.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::Result;
use std::sync::Mutex;

/// Initialize the global tracing subscriber from config.
///
/// Call this once at startup before any tracing events are emitted.
/// Falls back to `RUST_LOG` env var; if unset, uses `cfg.level`.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    if let Some(path) = &cfg.file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let writer = Mutex::new(file);
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(writer);
        match cfg.format {
            LogFormat::Json => builder.json().init(),
            LogFormat::Text => builder.compact().init(),
        }
        return Ok(());
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match cfg.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.with_target(true).compact().init(),
    }
    Ok(())
}
