//! Agent loop implementation
//!
//! This module provides the core `AgentLoop` that runs one user turn at a
//! time: build the budgeted context, call the model, dispatch any requested
//! tools, and repeat until the model produces an answer.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{OmniError, Result};
use crate::providers::{ChatOptions, LLMProvider, LLMResponse, StreamEvent, ToolDefinition};
use crate::session::{Conversation, ConversationStore, Message, SessionMeta, ToolCall};
use crate::tools::{ExecutionContext, ToolRegistry};

use super::budget::{resolve_window, Budget, ContextBudgeter};
use super::context::ContextBuilder;
use super::dispatch::ToolDispatcher;
use super::inline_calls::extract_inline_calls;
use super::observer::{AgentEvent, EventSink};
use super::stream::AnswerStream;

/// The main agent loop that drives a conversation.
///
/// One `AgentLoop` serves one conversation at a time and processes turns
/// sequentially (`ask` takes `&mut self`). The tool registry is shared
/// read-only; everything else is owned by the loop.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use omni_agent::agent::AgentLoop;
/// use omni_agent::config::Config;
/// use omni_agent::providers::OllamaProvider;
/// use omni_agent::session::SessionStore;
/// use omni_agent::tools::default_registry;
///
/// # async fn run() -> omni_agent::Result<()> {
/// let config = Config::default();
/// let provider = Arc::new(OllamaProvider::new(&config.providers.ollama.api_base, &config.agent.model));
/// let store = Arc::new(SessionStore::new_memory());
/// let mut agent = AgentLoop::new(config, provider, Arc::new(default_registry()), store).await?;
///
/// if let Some(answer) = agent.ask("What's in notes.md?").await? {
///     println!("{}", answer);
/// }
/// # Ok(())
/// # }
/// ```
pub struct AgentLoop {
    config: Config,
    provider: Arc<dyn LLMProvider>,
    registry: Arc<ToolRegistry>,
    context_builder: ContextBuilder,
    budgeter: ContextBudgeter,
    dispatcher: ToolDispatcher,
    events: EventSink,
    conversation: Conversation,
    execution: ExecutionContext,
    home_dir: Option<PathBuf>,
    /// Cleared for the rest of the loop's life once the model rejects it
    reasoning: bool,
}

impl AgentLoop {
    /// Create an agent loop and start a fresh session in `store`.
    ///
    /// # Errors
    /// Returns an error if the store cannot create the session.
    pub async fn new(
        config: Config,
        provider: Arc<dyn LLMProvider>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn ConversationStore>,
    ) -> Result<Self> {
        let mut context_builder = ContextBuilder::new()
            .with_tools(registry.names().into_iter().map(String::from).collect());
        if let Some(ref prompt) = config.agent.system_prompt {
            context_builder = context_builder.with_system_prompt(prompt);
        }

        let session = store.new_session(None, &config.agent.model).await?;
        let conversation = Conversation::new(
            store,
            session,
            &context_builder.build_system_prompt(),
        );
        info!(session = %conversation.session().id, model = %config.agent.model, "Agent session started");

        Ok(Self {
            budgeter: ContextBudgeter::from_config(&config.context),
            dispatcher: ToolDispatcher::new(Arc::clone(&registry), &config.tools),
            home_dir: config.home_dir(),
            reasoning: config.agent.reasoning,
            events: EventSink::default(),
            execution: ExecutionContext::new(),
            context_builder,
            conversation,
            provider,
            registry,
            config,
        })
    }

    /// Attach an observer for turn and tool events.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        self.events = EventSink::new(Arc::new(observer));
        self.dispatcher = self.dispatcher.with_events(self.events.clone());
        self
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Run one turn and return the final answer, if the model produced one.
    ///
    /// Tool failures and unknown tools are recorded in the conversation and
    /// never fail the turn. A backend error propagates after the single
    /// reasoning-downgrade retry.
    pub async fn ask(&mut self, text: &str) -> Result<Option<String>> {
        self.begin_turn(text).await?;

        let max_rounds = self.config.agent.max_tool_iterations;
        let mut rounds = 0u32;
        let mut last_content: Option<String> = None;

        loop {
            let response = self.call_model().await?;
            let (content, calls) = Self::split_response(response);

            if !content.trim().is_empty() {
                self.record_assistant(&content).await?;
                last_content = Some(content.clone());
            }

            if !calls.is_empty() {
                if rounds >= max_rounds {
                    warn!(
                        rounds,
                        pending = calls.len(),
                        "Tool loop reached maximum iterations, ending turn"
                    );
                    break;
                }
                rounds += 1;
                debug!("Tool round {} of {}", rounds, max_rounds);
                self.dispatch(calls).await?;
                continue;
            }

            if content.trim().is_empty() {
                last_content = self.nudge().await?;
            }
            break;
        }

        self.end_turn();
        Ok(last_content)
    }

    /// Run one turn, delivering the final answer incrementally.
    ///
    /// Nothing happens until the returned stream is first pulled.
    pub fn ask_stream(&mut self, text: &str) -> AnswerStream<'_> {
        AnswerStream::new(self, text.to_string())
    }

    async fn nudge(&mut self) -> Result<Option<String>> {
        info!("Empty model response, nudging for a summary");
        self.push_nudge().await?;

        let response = self.call_model().await?;
        if response.content.trim().is_empty() {
            return Ok(None);
        }
        // A second round of tools is not run here; a reply that is only an
        // inline call is not an answer either.
        if extract_inline_calls(&response.content).is_some() {
            debug!("Nudge reply was an inline tool call, dropping it");
            return Ok(None);
        }
        let answer = format!("{}{}", self.config.agent.nudge_prefix, response.content);
        self.record_assistant(&answer).await?;
        Ok(Some(answer))
    }

    // ========================================================================
    // Steps shared with the streaming path
    // ========================================================================

    pub(super) async fn begin_turn(&mut self, text: &str) -> Result<()> {
        self.conversation.push(Message::user(text)).await?;
        self.events.emit(AgentEvent::TurnStart);
        Ok(())
    }

    pub(super) fn end_turn(&self) {
        self.events.emit(AgentEvent::TurnEnd);
    }

    pub(super) fn emit(&self, event: AgentEvent) {
        self.events.emit(event);
    }

    pub(super) fn nudge_prefix(&self) -> &str {
        &self.config.agent.nudge_prefix
    }

    pub(super) async fn push_nudge(&mut self) -> Result<()> {
        let prompt = self.config.agent.nudge_prompt.clone();
        self.conversation.push(Message::user(&prompt)).await
    }

    pub(super) async fn record_assistant(&mut self, content: &str) -> Result<()> {
        self.persist_assistant(content).await?;
        self.events.emit(AgentEvent::AssistantMessage {
            content: content.to_string(),
        });
        Ok(())
    }

    /// Persist an answer observers already saw as `AssistantDelta` events.
    pub(super) async fn persist_assistant(&mut self, content: &str) -> Result<()> {
        self.conversation.push(Message::assistant(content)).await
    }

    pub(super) async fn dispatch(&mut self, calls: Vec<ToolCall>) -> Result<()> {
        self.dispatcher
            .dispatch(
                calls,
                &mut self.conversation,
                &self.execution,
                self.home_dir.clone(),
            )
            .await
    }

    /// Separate answer text from tool calls. Content that is itself an
    /// inline tool call is dropped.
    pub(super) fn split_response(response: LLMResponse) -> (String, Vec<ToolCall>) {
        if response.has_tool_calls() {
            return (response.content, response.tool_calls);
        }
        match extract_inline_calls(&response.content) {
            Some(calls) => {
                debug!(count = calls.len(), "Recovered inline tool calls");
                (String::new(), calls)
            }
            None => (response.content, Vec::new()),
        }
    }

    async fn prepare_call(&self) -> (Vec<Message>, ChatOptions) {
        let ctx = &self.config.context;
        let model_max = self.provider.context_window().await;
        let window = resolve_window(ctx.num_ctx, model_max, ctx.default_num_ctx);
        let budget = Budget::new(window, ctx.margin_tokens).effective();

        let messages = self.budgeter.select(self.conversation.messages(), budget);
        let options = ChatOptions::new()
            .with_temperature(self.config.agent.temperature)
            .with_max_tokens(self.config.agent.max_tokens)
            .with_context_window(window)
            .with_reasoning(self.reasoning);
        (messages, options)
    }

    /// One batch model call, retried once without reasoning if the model
    /// rejects it.
    pub(super) async fn call_model(&mut self) -> Result<LLMResponse> {
        let provider = Arc::clone(&self.provider);
        let model = self.config.agent.model.clone();
        self.with_downgrade(|messages, tools, options| {
            let provider = Arc::clone(&provider);
            let model = model.clone();
            async move { provider.chat(messages, tools, Some(&model), options).await }
        })
        .await
    }

    /// Open a streaming model call with the same downgrade rule as
    /// [`call_model`](Self::call_model).
    pub(super) async fn open_stream(&mut self) -> Result<mpsc::Receiver<StreamEvent>> {
        let provider = Arc::clone(&self.provider);
        let model = self.config.agent.model.clone();
        self.with_downgrade(|messages, tools, options| {
            let provider = Arc::clone(&provider);
            let model = model.clone();
            async move {
                provider
                    .chat_stream(messages, tools, Some(&model), options)
                    .await
            }
        })
        .await
    }

    /// Run `call` against the budgeted context. If the backend rejects the
    /// reasoning flag, reasoning is switched off for the rest of the loop's
    /// life and `call` runs exactly once more. Any other error, or a second
    /// rejection, is returned as is.
    async fn with_downgrade<T, F, Fut>(&mut self, call: F) -> Result<T>
    where
        F: Fn(Vec<Message>, Vec<ToolDefinition>, ChatOptions) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (messages, options) = self.prepare_call().await;
        let tools = self.registry.definitions();

        match call(messages.clone(), tools.clone(), options.clone()).await {
            Err(e) if options.reasoning && e.is_capability_error() => {
                warn!(error = %e, "Model rejected reasoning mode, retrying without it");
                self.reasoning = false;
                call(messages, tools, options.with_reasoning(false)).await
            }
            other => other,
        }
    }

    // ========================================================================
    // Sessions and accessors
    // ========================================================================

    /// Start a new session and make it current.
    pub async fn new_session(&mut self, name: Option<&str>) -> Result<SessionMeta> {
        let meta = self
            .store()
            .new_session(name, &self.config.agent.model)
            .await?;
        let prompt = self.context_builder.build_system_prompt();
        self.conversation.reset(meta.clone(), &prompt, Vec::new());
        info!(session = %meta.id, "Started new session");
        Ok(meta)
    }

    /// Replace the current state with a stored session.
    ///
    /// The history becomes a fresh system message followed by the stored
    /// messages in order.
    pub async fn load_session(&mut self, session_id: &str) -> Result<SessionMeta> {
        let store = Arc::clone(self.store());
        let meta = store
            .session(session_id)
            .await?
            .ok_or_else(|| OmniError::NotFound(format!("session {}", session_id)))?;
        let history = store.load_messages(session_id).await?;
        let prompt = self.context_builder.build_system_prompt();
        info!(session = %meta.id, messages = history.len(), "Loaded session");
        self.conversation.reset(meta.clone(), &prompt, history);
        Ok(meta)
    }

    /// Rename the current session in the store and in memory.
    pub async fn rename_session(&mut self, name: &str) -> Result<SessionMeta> {
        let store = Arc::clone(self.store());
        let id = self.session().id.clone();
        if !store.rename(&id, name).await? {
            return Err(OmniError::NotFound(format!("session {}", id)));
        }
        let meta = store
            .session(&id)
            .await?
            .ok_or_else(|| OmniError::NotFound(format!("session {}", id)))?;
        self.conversation.refresh_session(meta.clone());
        Ok(meta)
    }

    /// Set (or clear) the home directory tools run in.
    pub fn set_home_dir(&mut self, home_dir: Option<PathBuf>) {
        self.home_dir = home_dir;
    }

    /// The home directory tools run in.
    pub fn home_dir(&self) -> Option<&PathBuf> {
        self.home_dir.as_ref()
    }

    /// The current session.
    pub fn session(&self) -> &SessionMeta {
        self.conversation.session()
    }

    /// The in-memory history, system message first.
    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    /// The conversation store.
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        self.conversation.store()
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether reasoning mode is still requested.
    pub fn reasoning_enabled(&self) -> bool {
        self.reasoning
    }
}
