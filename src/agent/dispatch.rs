//! Tool batch execution.
//!
//! The dispatcher turns a batch of model-requested calls into conversation
//! messages: one assistant message carrying the batch, then one tool message
//! per call in request order. Tool failures become `ERROR:` text; only store
//! failures propagate.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::config::ToolsConfig;
use crate::error::Result;
use crate::session::{Conversation, Message, ToolCall};
use crate::tools::{ExecutionContext, ToolRegistry};
use crate::utils::string::clip_chars;

use super::observer::{AgentEvent, EventSink};

/// Executes tool-call batches against a registry.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    max_result_chars: usize,
    search_tool: String,
    search_default_max_results: u64,
    events: EventSink,
}

impl ToolDispatcher {
    /// Create a dispatcher with the policy from the `tools` config section.
    pub fn new(registry: Arc<ToolRegistry>, cfg: &ToolsConfig) -> Self {
        Self {
            registry,
            max_result_chars: cfg.max_result_chars,
            search_tool: cfg.search_tool.clone(),
            search_default_max_results: cfg.search_default_max_results,
            events: EventSink::default(),
        }
    }

    /// Deliver tool events to `events`.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// The registry calls are resolved against.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run `calls` in order and record them in `conversation`.
    ///
    /// `home_dir` is in effect for the whole batch and the prior value of
    /// `execution` is restored afterwards on every exit path.
    pub async fn dispatch(
        &self,
        calls: Vec<ToolCall>,
        conversation: &mut Conversation,
        execution: &ExecutionContext,
        home_dir: Option<PathBuf>,
    ) -> Result<()> {
        conversation
            .push(Message::assistant_with_tools(calls.clone()))
            .await?;

        let scope = execution.enter(home_dir);
        let tool_ctx = scope.tool_context(&conversation.session().id);
        info!(count = calls.len(), "Dispatching tool batch");

        for call in calls {
            let name = call.name;
            let mut args = call.arguments;

            if !self.registry.has(&name) {
                let content = format!("ERROR: Tool '{}' not available.", name);
                self.events.emit(AgentEvent::ToolError {
                    name: name.clone(),
                    error: content.clone(),
                });
                conversation
                    .push(Message::tool_result(&name, &content, Some(args)))
                    .await?;
                continue;
            }

            if name == self.search_tool && !args.contains_key("max_results") {
                args.insert(
                    "max_results".to_string(),
                    Value::from(self.search_default_max_results),
                );
            }

            self.events.emit(AgentEvent::ToolStart {
                name: name.clone(),
                args: args.clone(),
            });

            let content = match self.registry.invoke(&name, args.clone(), &tool_ctx).await {
                Ok(value) => {
                    self.events.emit(AgentEvent::ToolEnd { name: name.clone() });
                    self.preview(&value)
                }
                Err(failure) => {
                    let content = format!("ERROR: {}", failure);
                    self.events.emit(AgentEvent::ToolError {
                        name: name.clone(),
                        error: content.clone(),
                    });
                    content
                }
            };

            conversation
                .push(Message::tool_result(&name, &content, Some(args)))
                .await?;
        }

        Ok(())
    }

    /// Text preview of a tool value: strings as-is, everything else as JSON,
    /// clipped to `max_result_chars`.
    fn preview(&self, value: &Value) -> String {
        let text = match value {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
        };
        clip_chars(&text, self.max_result_chars).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OmniError;
    use crate::session::{ConversationStore, Role, SessionStore, ToolArgs};
    use crate::tools::{Tool, ToolContext};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct SearchTool;

    #[async_trait]
    impl Tool for SearchTool {
        fn name(&self) -> &str {
            "duck_search"
        }
        fn description(&self) -> &str {
            "search"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, args: ToolArgs, _ctx: &ToolContext) -> Result<Value> {
            Ok(json!({"max_results": args.get("max_results").cloned()}))
        }
    }

    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: ToolArgs, _ctx: &ToolContext) -> Result<Value> {
            Err(OmniError::Tool("boom".into()))
        }
    }

    struct HomeTool;

    #[async_trait]
    impl Tool for HomeTool {
        fn name(&self) -> &str {
            "home"
        }
        fn description(&self) -> &str {
            "reports the home dir"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: ToolArgs, ctx: &ToolContext) -> Result<Value> {
            Ok(json!(ctx
                .home_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_default()))
        }
    }

    async fn setup() -> (ToolDispatcher, Conversation) {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SearchTool));
        registry.register(Box::new(FailTool));
        registry.register(Box::new(HomeTool));
        let dispatcher = ToolDispatcher::new(Arc::new(registry), &ToolsConfig::default());

        let store: Arc<dyn ConversationStore> = Arc::new(SessionStore::new_memory());
        let meta = store.new_session(None, "test").await.unwrap();
        (dispatcher, Conversation::new(store, meta, "sys"))
    }

    #[tokio::test]
    async fn test_batch_order_and_failures() {
        let (dispatcher, mut conv) = setup().await;
        let calls = vec![
            ToolCall::new("home", json!({})),
            ToolCall::new("fail", json!({})),
            ToolCall::new("ghost", json!({"q": 1})),
        ];
        dispatcher
            .dispatch(calls, &mut conv, &ExecutionContext::new(), None)
            .await
            .unwrap();

        let msgs = conv.messages();
        assert_eq!(msgs.len(), 5);
        assert!(msgs[1].has_tool_calls());
        assert_eq!(msgs[2].tool_name.as_deref(), Some("home"));
        assert_eq!(msgs[3].content, "ERROR: ToolError: boom");
        assert_eq!(msgs[4].content, "ERROR: Tool 'ghost' not available.");
        assert_eq!(msgs[4].tool_args.as_ref().unwrap()["q"], 1);
        assert!(msgs[2..].iter().all(|m| m.role == Role::Tool));

        let stored = conv.store().load_messages(&conv.session().id).await.unwrap();
        assert_eq!(stored.len(), 4);
    }

    #[tokio::test]
    async fn test_search_default_max_results() {
        let (dispatcher, mut conv) = setup().await;
        let calls = vec![
            ToolCall::new("duck_search", json!({"query": "rust"})),
            ToolCall::new("duck_search", json!({"query": "rust", "max_results": 2})),
        ];
        dispatcher
            .dispatch(calls, &mut conv, &ExecutionContext::new(), None)
            .await
            .unwrap();
        let msgs = conv.messages();
        assert_eq!(msgs[2].content, r#"{"max_results":5}"#);
        assert_eq!(msgs[2].tool_args.as_ref().unwrap()["max_results"], 5);
        assert_eq!(msgs[3].content, r#"{"max_results":2}"#);
    }

    #[tokio::test]
    async fn test_home_dir_scoped_to_batch() {
        let (dispatcher, mut conv) = setup().await;
        let execution = ExecutionContext::new();
        dispatcher
            .dispatch(
                vec![ToolCall::new("home", json!({}))],
                &mut conv,
                &execution,
                Some(PathBuf::from("/srv/docs")),
            )
            .await
            .unwrap();
        assert_eq!(conv.messages()[2].content, "/srv/docs");
        assert_eq!(execution.current_home(), None);
    }

    #[tokio::test]
    async fn test_events_and_preview_clip() {
        let (dispatcher, mut conv) = setup().await;
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        let dispatcher = ToolDispatcher {
            max_result_chars: 3,
            ..dispatcher
        }
        .with_events(EventSink::new(Arc::new(move |e: &AgentEvent| {
            sink_events.lock().unwrap().push(e.clone());
        })));

        dispatcher
            .dispatch(
                vec![
                    ToolCall::new("home", json!({})),
                    ToolCall::new("fail", json!({})),
                ],
                &mut conv,
                &ExecutionContext::new(),
                Some(PathBuf::from("/abcdef")),
            )
            .await
            .unwrap();

        assert_eq!(conv.messages()[2].content, "/ab");
        let events = events.lock().unwrap();
        assert!(matches!(events[0], AgentEvent::ToolStart { .. }));
        assert!(matches!(events[1], AgentEvent::ToolEnd { .. }));
        assert!(matches!(events[3], AgentEvent::ToolError { .. }));
    }
}
