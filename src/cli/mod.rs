//! CLI module - command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod chat;
pub mod common;
pub mod sessions;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

use omni_agent::config::Config;

#[derive(Parser)]
#[command(name = "omni-agent")]
#[command(version)]
#[command(about = "Local research assistant with tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat
    Chat {
        /// Stream the answer as it is generated
        #[arg(long)]
        stream: bool,
        /// Model tag to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,
        /// Directory the file tools are confined to
        #[arg(long, value_name = "DIR")]
        home_dir: Option<PathBuf>,
        /// Resume a stored session
        #[arg(long, value_name = "ID")]
        session: Option<String>,
    },
    /// Manage stored conversations
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum SessionsAction {
    /// List sessions, most recent first
    List,
    /// Delete a session
    Delete {
        /// Session id
        id: String,
    },
    /// Rename a session
    Rename {
        /// Session id
        id: String,
        /// New name
        name: String,
    },
    /// Export a session as Markdown
    Export {
        /// Session id
        id: String,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Parse arguments and run the selected command.
pub async fn run() -> Result<()> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    omni_agent::utils::logging::init_logging(&config.logging)
        .with_context(|| "Failed to initialize logging")?;

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Chat {
            stream,
            model,
            home_dir,
            session,
        }) => {
            chat::cmd_chat(config, stream, model, home_dir, session).await?;
        }
        Some(Commands::Sessions { action }) => {
            sessions::cmd_sessions(&config, action).await?;
        }
    }

    Ok(())
}
