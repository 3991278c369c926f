//! In-memory mirror of the active conversation.

use super::{ConversationStore, Message, Role, SessionMeta};
use crate::error::Result;
use std::sync::Arc;

/// The conversation state an agent loop works against.
///
/// Always starts with exactly one system message, which lives only in memory
/// and is rebuilt whenever a session is started or loaded. Every other message
/// is written to the store before it is mirrored here, so the two never
/// diverge in content or order.
pub struct Conversation {
    store: Arc<dyn ConversationStore>,
    session: SessionMeta,
    messages: Vec<Message>,
}

impl Conversation {
    /// Start a conversation for `session` with the given system prompt.
    pub fn new(store: Arc<dyn ConversationStore>, session: SessionMeta, system_prompt: &str) -> Self {
        Self {
            store,
            session,
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Replace the state wholesale: new session, fresh system prompt, then
    /// the session's prior messages in stored order.
    pub fn reset(&mut self, session: SessionMeta, system_prompt: &str, history: Vec<Message>) {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(system_prompt));
        messages.extend(history.into_iter().filter(|m| m.role != Role::System));
        self.session = session;
        self.messages = messages;
    }

    /// Swap in fresh metadata for the same session, keeping the history.
    pub fn refresh_session(&mut self, session: SessionMeta) {
        debug_assert_eq!(session.id, self.session.id);
        self.session = session;
    }

    /// Persist `message`, then append it to the in-memory history.
    pub async fn push(&mut self, message: Message) -> Result<()> {
        self.store.append(&self.session.id, &message).await?;
        self.messages.push(message);
        Ok(())
    }

    /// The full history, system message first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The session this conversation is bound to.
    pub fn session(&self) -> &SessionMeta {
        &self.session
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }
}
