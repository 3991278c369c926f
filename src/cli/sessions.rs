//! Session management command handlers.

use anyhow::{Context, Result};

use omni_agent::config::Config;
use omni_agent::session::export_markdown;

use super::common::open_store;
use super::SessionsAction;

/// Run a `sessions` subcommand.
pub(crate) async fn cmd_sessions(config: &Config, action: SessionsAction) -> Result<()> {
    let store = open_store(config)?;

    match action {
        SessionsAction::List => {
            let sessions = store.list_sessions().await?;
            if sessions.is_empty() {
                println!("No sessions stored.");
                return Ok(());
            }
            println!("{:<14}{:<32}{:<18}MODEL", "ID", "NAME", "UPDATED");
            for meta in sessions {
                println!(
                    "{:<14}{:<32}{:<18}{}",
                    meta.id,
                    meta.name,
                    meta.updated_at.format("%Y-%m-%d %H:%M"),
                    meta.model
                );
            }
        }
        SessionsAction::Delete { id } => {
            if store.delete(&id).await? {
                println!("Deleted session {}", id);
            } else {
                anyhow::bail!("No session {}", id);
            }
        }
        SessionsAction::Rename { id, name } => {
            if store.rename(&id, &name).await? {
                println!("Renamed session {} to {}", id, name);
            } else {
                anyhow::bail!("No session {}", id);
            }
        }
        SessionsAction::Export { id, output } => {
            let markdown = export_markdown(store.as_ref(), &id).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, markdown)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    println!("Exported session {} to {}", id, path.display());
                }
                None => println!("{}", markdown),
            }
        }
    }

    Ok(())
}
