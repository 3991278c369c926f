//! Interactive chat command handler.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use omni_agent::agent::{AgentEvent, AgentLoop};
use omni_agent::config::{expand_home, Config};
use omni_agent::session::export_markdown;
use omni_agent::tools::default_registry;
use omni_agent::utils::string::preview;

use super::common::{build_provider, open_store, prompt_line};

const HELP: &str = "\
Commands:
  /new [name]        start a new session
  /list              list stored sessions
  /load <id>         switch to a stored session
  /delete <id>       delete a stored session
  /saveas <name>     rename the current session
  /export [id]       print a session as Markdown (default: current)
  /home-dir [path]   show or set the directory file tools may read
  /help              show this help
  /quit              exit";

/// A line typed at the chat prompt.
#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Ask(String),
    New(Option<String>),
    List,
    Load(String),
    Delete(String),
    SaveAs(String),
    Export(Option<String>),
    HomeDir(Option<String>),
    Help,
    Quit,
    Unknown(String),
    Usage(&'static str),
}

impl ReplCommand {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if !line.starts_with('/') {
            return Some(Self::Ask(line.to_string()));
        }

        let (cmd, rest) = match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };
        let arg = (!rest.is_empty()).then(|| rest.to_string());

        let parsed = match cmd {
            "/new" => Self::New(arg),
            "/list" => Self::List,
            "/load" => arg.map(Self::Load).unwrap_or(Self::Usage("/load <id>")),
            "/delete" => arg.map(Self::Delete).unwrap_or(Self::Usage("/delete <id>")),
            "/saveas" => arg.map(Self::SaveAs).unwrap_or(Self::Usage("/saveas <name>")),
            "/export" => Self::Export(arg),
            "/home-dir" => Self::HomeDir(arg),
            "/help" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        };
        Some(parsed)
    }
}

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::ToolStart { name, args } => {
            let args = serde_json::to_string(args).unwrap_or_default();
            eprintln!("  → {} {}", name, preview(&args, 120));
        }
        AgentEvent::ToolEnd { name } => eprintln!("  ✓ {}", name),
        AgentEvent::ToolError { name, error } => {
            eprintln!("  ✗ {}: {}", name, preview(error, 200))
        }
        _ => {}
    }
}

/// Run the interactive chat.
pub(crate) async fn cmd_chat(
    mut config: Config,
    stream: bool,
    model: Option<String>,
    home_dir: Option<PathBuf>,
    session: Option<String>,
) -> Result<()> {
    if let Some(model) = model {
        config.agent.model = model;
    }
    if let Some(dir) = home_dir {
        config.tools.home_dir = Some(dir.to_string_lossy().to_string());
    }
    let streaming = stream || config.agent.streaming;

    let store = open_store(&config)?;
    let provider = Arc::new(build_provider(&config));
    let registry = Arc::new(default_registry());

    let mut agent = AgentLoop::new(config, provider, registry, store)
        .await
        .with_context(|| "Failed to start agent")?
        .with_observer(print_event);

    if let Some(id) = session {
        agent
            .load_session(&id)
            .await
            .with_context(|| format!("Failed to load session {}", id))?;
    }

    println!("Omni Agent ({})", agent.config().agent.model);
    println!(
        "Session {} ({}). Type /help for commands.",
        agent.session().name,
        agent.session().id
    );
    println!();

    while let Some(line) = prompt_line("> ")? {
        let Some(command) = ReplCommand::parse(&line) else {
            continue;
        };
        if command == ReplCommand::Quit {
            break;
        }
        if let Err(e) = handle(&mut agent, command, streaming).await {
            eprintln!("Error: {:#}", e);
        }
        println!();
    }

    println!("Goodbye!");
    Ok(())
}

async fn handle(agent: &mut AgentLoop, command: ReplCommand, streaming: bool) -> Result<()> {
    match command {
        ReplCommand::Ask(text) => {
            if streaming {
                let mut answer = agent.ask_stream(&text);
                while let Some(piece) = answer.next().await {
                    print!("{}", piece?);
                    io::stdout().flush()?;
                }
                println!();
            } else {
                match agent.ask(&text).await? {
                    Some(answer) => println!("{}", answer),
                    None => println!("(no answer)"),
                }
            }
        }
        ReplCommand::New(name) => {
            let meta = agent.new_session(name.as_deref()).await?;
            println!("Started session {} ({})", meta.name, meta.id);
        }
        ReplCommand::List => {
            let current = agent.session().id.clone();
            for meta in agent.store().list_sessions().await? {
                let marker = if meta.id == current { "*" } else { " " };
                println!(
                    "{} {}  {:<30}  {}",
                    marker,
                    meta.id,
                    meta.name,
                    meta.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        ReplCommand::Load(id) => {
            let meta = agent.load_session(&id).await?;
            println!(
                "Loaded {} ({} messages)",
                meta.name,
                agent.messages().len() - 1
            );
        }
        ReplCommand::Delete(id) => {
            let deleted = agent.store().delete(&id).await?;
            if !deleted {
                println!("No session {}", id);
            } else if id == agent.session().id {
                let meta = agent.new_session(None).await?;
                println!("Deleted current session; started {}", meta.id);
            } else {
                println!("Deleted {}", id);
            }
        }
        ReplCommand::SaveAs(name) => {
            let meta = agent.rename_session(&name).await?;
            println!("Renamed session {} to {}", meta.id, meta.name);
        }
        ReplCommand::Export(id) => {
            let id = id.unwrap_or_else(|| agent.session().id.clone());
            let markdown = export_markdown(agent.store().as_ref(), &id).await?;
            println!("{}", markdown);
        }
        ReplCommand::HomeDir(None) => match agent.home_dir() {
            Some(dir) => println!("Home directory: {}", dir.display()),
            None => println!("No home directory set."),
        },
        ReplCommand::HomeDir(Some(path)) => {
            let dir = expand_home(&path);
            if !dir.is_dir() {
                anyhow::bail!("{} is not a directory", dir.display());
            }
            println!("Home directory set to {}", dir.display());
            agent.set_home_dir(Some(dir));
        }
        ReplCommand::Help => println!("{}", HELP),
        ReplCommand::Usage(usage) => println!("Usage: {}", usage),
        ReplCommand::Unknown(cmd) => println!("Unknown command {}. Type /help.", cmd),
        ReplCommand::Quit => {}
    }
    Ok(())
}
