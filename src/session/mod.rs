//! Session module - Conversation persistence
//!
//! This module provides the conversation store used by the agent loop:
//! - The [`ConversationStore`] trait, an append-only, ordered log per session
//! - [`SessionStore`], with in-memory and JSONL file backends
//! - [`Conversation`], the in-memory mirror the agent works against
//! - Markdown export of a stored conversation
//!
//! # Example
//!
//! ```
//! use omni_agent::session::{ConversationStore, Message, SessionStore};
//!
//! # tokio_test::block_on(async {
//! let store = SessionStore::new_memory();
//! let session = store.new_session(Some("demo"), "qwen3:8b").await.unwrap();
//!
//! store.append(&session.id, &Message::user("Hello!")).await.unwrap();
//! store.append(&session.id, &Message::assistant("Hi there!")).await.unwrap();
//!
//! let messages = store.load_messages(&session.id).await.unwrap();
//! assert_eq!(messages.len(), 2);
//! # });
//! ```

mod conversation;
pub mod types;

pub use conversation::Conversation;
pub use types::{Message, Role, SessionMeta, ToolArgs, ToolCall};

use crate::error::{OmniError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Durable, ordered storage for conversations.
///
/// The agent loop never writes files itself: every message it appends to its
/// in-memory history goes through [`ConversationStore::append`] first. The
/// store does not retry; its errors propagate to the caller.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a new, empty session.
    async fn new_session(&self, name: Option<&str>, model: &str) -> Result<SessionMeta>;

    /// Append one message to the end of a session.
    async fn append(&self, session_id: &str, message: &Message) -> Result<()>;

    /// Load every stored message of a session in append order.
    async fn load_messages(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Metadata for a single session, if it exists.
    async fn session(&self, session_id: &str) -> Result<Option<SessionMeta>>;

    /// All sessions, most recently updated first.
    async fn list_sessions(&self) -> Result<Vec<SessionMeta>>;

    /// Delete a session. Returns `false` if it did not exist.
    async fn delete(&self, session_id: &str) -> Result<bool>;

    /// Rename a session. Returns `false` if it did not exist.
    async fn rename(&self, session_id: &str, name: &str) -> Result<bool>;
}

#[derive(Debug, Clone)]
struct StoredSession {
    meta: SessionMeta,
    messages: Vec<Message>,
}

/// Conversation store with in-memory or file-based persistence.
///
/// On disk every session is two files under `<root>/sessions/`:
/// `<id>.jsonl` (one message per line) and `<id>.meta.json`.
///
/// # Thread Safety
///
/// Writes are serialized through an internal lock, so one store may be shared
/// by several agent loops through an `Arc`.
pub struct SessionStore {
    /// Sessions kept when running without persistence
    sessions: Arc<RwLock<HashMap<String, StoredSession>>>,
    /// Directory holding session files, if persistence is enabled
    storage_path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl SessionStore {
    /// Create an in-memory store without persistence.
    ///
    /// This is useful for testing or throwaway conversations.
    pub fn new_memory() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Create a file-backed store rooted at `root`.
    ///
    /// Session files live in `root/sessions/`, which is created if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    ///
    /// # Example
    /// ```no_run
    /// use omni_agent::session::SessionStore;
    /// use std::path::PathBuf;
    ///
    /// let store = SessionStore::with_path(PathBuf::from("/tmp/omni")).unwrap();
    /// ```
    pub fn with_path(root: PathBuf) -> Result<Self> {
        let storage_path = root.join("sessions");
        std::fs::create_dir_all(&storage_path)?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: Some(storage_path),
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding session files, if persistence is enabled.
    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }

    fn file_path(dir: &Path, session_id: &str, suffix: &str) -> Result<PathBuf> {
        if !is_valid_session_id(session_id) {
            return Err(OmniError::NotFound(format!("session '{}'", session_id)));
        }
        Ok(dir.join(format!("{}{}", session_id, suffix)))
    }

    async fn read_meta(dir: &Path, session_id: &str) -> Result<Option<SessionMeta>> {
        let path = Self::file_path(dir, session_id, ".meta.json")?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_meta(dir: &Path, meta: &SessionMeta) -> Result<()> {
        let path = Self::file_path(dir, &meta.id, ".meta.json")?;
        let content = serde_json::to_string_pretty(meta)?;
        tokio::fs::write(&path, content).await?;
        Ok(())
    }
}

/// Session ids are generated hex strings; anything else could escape the
/// sessions directory.
fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait]
impl ConversationStore for SessionStore {
    async fn new_session(&self, name: Option<&str>, model: &str) -> Result<SessionMeta> {
        let meta = SessionMeta::new(name, model);
        let _guard = self.write_lock.lock().await;

        match &self.storage_path {
            Some(dir) => {
                Self::write_meta(dir, &meta).await?;
                let log = Self::file_path(dir, &meta.id, ".jsonl")?;
                tokio::fs::File::create(&log).await?;
            }
            None => {
                self.sessions.write().await.insert(
                    meta.id.clone(),
                    StoredSession {
                        meta: meta.clone(),
                        messages: Vec::new(),
                    },
                );
            }
        }

        debug!(session = %meta.id, name = %meta.name, "Created session");
        Ok(meta)
    }

    async fn append(&self, session_id: &str, message: &Message) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let Some(dir) = &self.storage_path else {
            let mut sessions = self.sessions.write().await;
            let stored = sessions
                .get_mut(session_id)
                .ok_or_else(|| OmniError::NotFound(format!("session '{}'", session_id)))?;
            stored.messages.push(message.clone());
            stored.meta.updated_at = Utc::now();
            return Ok(());
        };

        let mut meta = Self::read_meta(dir, session_id)
            .await?
            .ok_or_else(|| OmniError::NotFound(format!("session '{}'", session_id)))?;

        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        let path = Self::file_path(dir, session_id, ".jsonl")?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        meta.updated_at = Utc::now();
        Self::write_meta(dir, &meta).await
    }

    async fn load_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let Some(dir) = &self.storage_path else {
            let sessions = self.sessions.read().await;
            return sessions
                .get(session_id)
                .map(|s| s.messages.clone())
                .ok_or_else(|| OmniError::NotFound(format!("session '{}'", session_id)));
        };

        let path = Self::file_path(dir, session_id, ".jsonl")?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return match Self::read_meta(dir, session_id).await? {
                    Some(_) => Ok(Vec::new()),
                    None => Err(OmniError::NotFound(format!("session '{}'", session_id))),
                };
            }
            Err(e) => return Err(e.into()),
        };

        let mut messages = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!(
                    session = %session_id,
                    line = lineno + 1,
                    error = %e,
                    "Skipping unreadable message line"
                ),
            }
        }
        Ok(messages)
    }

    async fn session(&self, session_id: &str) -> Result<Option<SessionMeta>> {
        match &self.storage_path {
            Some(dir) => {
                if !is_valid_session_id(session_id) {
                    return Ok(None);
                }
                Self::read_meta(dir, session_id).await
            }
            None => Ok(self
                .sessions
                .read()
                .await
                .get(session_id)
                .map(|s| s.meta.clone())),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<SessionMeta>> {
        let mut metas: Vec<SessionMeta> = match &self.storage_path {
            None => self
                .sessions
                .read()
                .await
                .values()
                .map(|s| s.meta.clone())
                .collect(),
            Some(dir) => {
                let mut metas = Vec::new();
                let mut entries = tokio::fs::read_dir(dir).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let name = entry.file_name().to_string_lossy().to_string();
                    if !name.ends_with(".meta.json") {
                        continue;
                    }
                    let content = match tokio::fs::read_to_string(entry.path()).await {
                        Ok(content) => content,
                        Err(e) => {
                            warn!(file = %name, error = %e, "Skipping unreadable session metadata");
                            continue;
                        }
                    };
                    match serde_json::from_str::<SessionMeta>(&content) {
                        Ok(meta) => metas.push(meta),
                        Err(e) => {
                            warn!(file = %name, error = %e, "Skipping corrupt session metadata")
                        }
                    }
                }
                metas
            }
        };

        metas.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(metas)
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let Some(dir) = &self.storage_path else {
            return Ok(self.sessions.write().await.remove(session_id).is_some());
        };
        if !is_valid_session_id(session_id) {
            return Ok(false);
        }

        let mut removed = false;
        for suffix in [".jsonl", ".meta.json"] {
            let path = Self::file_path(dir, session_id, suffix)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    async fn rename(&self, session_id: &str, name: &str) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OmniError::Session("session name must not be empty".into()));
        }
        let _guard = self.write_lock.lock().await;

        let Some(dir) = &self.storage_path else {
            let mut sessions = self.sessions.write().await;
            return Ok(match sessions.get_mut(session_id) {
                Some(stored) => {
                    stored.meta.name = name.to_string();
                    stored.meta.updated_at = Utc::now();
                    true
                }
                None => false,
            });
        };
        if !is_valid_session_id(session_id) {
            return Ok(false);
        }

        match Self::read_meta(dir, session_id).await? {
            Some(mut meta) => {
                meta.name = name.to_string();
                meta.updated_at = Utc::now();
                Self::write_meta(dir, &meta).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ============================================================================
// Markdown export
// ============================================================================

/// Render a stored conversation as a Markdown document.
///
/// Tool-call batches are included as a collapsed JSON block; tool results are
/// headed with the tool's name.
pub async fn export_markdown(store: &dyn ConversationStore, session_id: &str) -> Result<String> {
    let messages = store.load_messages(session_id).await?;
    let meta = store.session(session_id).await?;
    Ok(render_markdown(session_id, meta.as_ref(), &messages))
}

fn render_markdown(session_id: &str, meta: Option<&SessionMeta>, messages: &[Message]) -> String {
    let mut out = match meta {
        Some(meta) => format!("# Conversation: {} ({})\n", meta.name, session_id),
        None => format!("# Conversation: {}\n", session_id),
    };

    for msg in messages {
        let heading = match (&msg.role, &msg.tool_name) {
            (Role::User, _) => "User".to_string(),
            (Role::Assistant, _) => "Assistant".to_string(),
            (Role::System, _) => "System".to_string(),
            (Role::Tool, Some(name)) => format!("Tool ({})", name),
            (Role::Tool, None) => "Tool".to_string(),
        };
        out.push_str(&format!("\n## {}\n\n", heading));

        if !msg.content.is_empty() {
            out.push_str(&msg.content);
            out.push('\n');
        }
        if let Some(calls) = msg.tool_calls.as_ref().filter(|c| !c.is_empty()) {
            let json = serde_json::to_string_pretty(calls).unwrap_or_else(|_| "[]".to_string());
            out.push_str("\n<details><summary>Tool calls</summary>\n\n```json\n");
            out.push_str(&json);
            out.push_str("\n```\n\n</details>\n");
        }
    }
    out
}
