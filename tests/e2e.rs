//! End-to-end tests for Omni Agent
//!
//! These tests drive `AgentLoop` the way the CLI does, combining the store,
//! the tool registry, the dispatcher and a model backend. The backends are
//! scripted mocks, so no network or Ollama install is needed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use omni_agent::agent::{AgentEvent, AgentLoop};
use omni_agent::config::Config;
use omni_agent::error::{OmniError, ProviderError, Result};
use omni_agent::providers::{
    parse_provider_error, ChatOptions, LLMProvider, LLMResponse, StreamEvent, ToolDefinition,
};
use omni_agent::session::{ConversationStore, Message, Role, SessionStore, ToolArgs, ToolCall};
use omni_agent::tools::{default_registry, Tool, ToolContext, ToolRegistry};

// ============================================================================
// Mock Providers and Tools
// ============================================================================

/// Replays batch responses in order, and streams in order for streaming
/// calls. Runs out with a provider error. Scripted stream failures are
/// returned by the first streaming calls, before any stream is opened.
struct ScriptedProvider {
    batch: Mutex<Vec<Result<LLMResponse>>>,
    streams: Mutex<Vec<Vec<String>>>,
    stream_failures: Mutex<Vec<OmniError>>,
    calls: AtomicUsize,
    seen_options: Mutex<Vec<ChatOptions>>,
    seen_messages: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    fn new(batch: Vec<Result<LLMResponse>>) -> Self {
        Self::with_streams(batch, Vec::new())
    }

    fn with_streams(mut batch: Vec<Result<LLMResponse>>, streams: Vec<Vec<&str>>) -> Self {
        batch.reverse();
        let mut streams: Vec<Vec<String>> = streams
            .into_iter()
            .map(|s| s.into_iter().map(String::from).collect())
            .collect();
        streams.reverse();
        Self {
            batch: Mutex::new(batch),
            streams: Mutex::new(streams),
            stream_failures: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            seen_options: Mutex::new(Vec::new()),
            seen_messages: Mutex::new(Vec::new()),
        }
    }

    fn with_stream_failures(self, mut failures: Vec<OmniError>) -> Self {
        failures.reverse();
        *self.stream_failures.lock().unwrap() = failures;
        self
    }

    fn reasoning_flags(&self) -> Vec<bool> {
        self.seen_options
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.reasoning)
            .collect()
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn chat(
        &self,
        messages: Vec<Message>,
        _tools: Vec<ToolDefinition>,
        _model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_options.lock().unwrap().push(options);
        self.seen_messages.lock().unwrap().push(messages);
        self.batch
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(OmniError::Provider("script exhausted".into())))
    }

    async fn chat_stream(
        &self,
        _messages: Vec<Message>,
        _tools: Vec<ToolDefinition>,
        _model: Option<&str>,
        options: ChatOptions,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_options.lock().unwrap().push(options);
        if let Some(failure) = self.stream_failures.lock().unwrap().pop() {
            return Err(failure);
        }
        let deltas = self
            .streams
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| OmniError::Provider("no stream scripted".into()))?;

        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let content = deltas.concat();
            for delta in deltas {
                if tx.send(StreamEvent::Delta(delta)).await.is_err() {
                    return;
                }
            }
            let _ = tx
                .send(StreamEvent::Done {
                    content,
                    usage: None,
                })
                .await;
        });
        Ok(rx)
    }
}

/// Stand-in web search returning two results.
struct MockSearchTool;

#[async_trait]
impl Tool for MockSearchTool {
    fn name(&self) -> &str {
        "duck_search"
    }

    fn description(&self) -> &str {
        "Search the web"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string"}, "max_results": {"type": "integer"}},
            "required": ["query"]
        })
    }

    async fn execute(&self, args: ToolArgs, _ctx: &ToolContext) -> Result<Value> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| OmniError::Tool("missing 'query'".into()))?;
        Ok(json!({
            "status": "ok",
            "query": query,
            "results": [
                {"title": "X", "url": "https://example.com/x"},
                {"title": "Y", "url": "https://example.com/y"}
            ]
        }))
    }
}

struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _args: ToolArgs, _ctx: &ToolContext) -> Result<Value> {
        Err(OmniError::Tool("connection refused".into()))
    }
}

fn registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(MockSearchTool));
    registry.register(Box::new(FailingTool));
    Arc::new(registry)
}

fn search_call(query: &str) -> ToolCall {
    ToolCall::new("duck_search", json!({ "query": query }))
}

async fn build_agent(
    provider: Arc<ScriptedProvider>,
    registry: Arc<ToolRegistry>,
) -> (AgentLoop, Arc<dyn ConversationStore>) {
    let store: Arc<dyn ConversationStore> = Arc::new(SessionStore::new_memory());
    let agent = AgentLoop::new(Config::default(), provider, registry, Arc::clone(&store))
        .await
        .unwrap();
    (agent, store)
}

async fn stored(agent: &AgentLoop, store: &Arc<dyn ConversationStore>) -> Vec<Message> {
    store.load_messages(&agent.session().id).await.unwrap()
}

// ============================================================================
// Batch turns
// ============================================================================

#[tokio::test]
async fn test_search_then_answer_end_to_end() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(LLMResponse::with_tools("", vec![search_call("x")])),
        Ok(LLMResponse::text("Answer: X (source: url)")),
    ]));
    let (mut agent, store) = build_agent(Arc::clone(&provider), registry()).await;

    let answer = agent.ask("What is X?").await.unwrap();
    assert_eq!(answer.as_deref(), Some("Answer: X (source: url)"));

    let messages = stored(&agent, &store).await;
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert!(messages[1].has_tool_calls());
    assert_eq!(messages[2].tool_name.as_deref(), Some("duck_search"));
    assert_eq!(messages[2].tool_args.as_ref().unwrap()["max_results"], 5);
    let result: Value = serde_json::from_str(&messages[2].content).unwrap();
    assert_eq!(result["results"].as_array().unwrap().len(), 2);

    // In-memory history mirrors the store after the system message.
    assert_eq!(agent.messages().len(), messages.len() + 1);
    assert_eq!(&agent.messages()[1..], &messages[..]);
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_empty_terminal_response_is_nudged() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(LLMResponse::empty()),
        Ok(LLMResponse::text("done")),
    ]));
    let (mut agent, store) = build_agent(provider, registry()).await;

    let answer = agent.ask("Summarize").await.unwrap();
    assert_eq!(answer.as_deref(), Some("\nSo, done"));

    let messages = stored(&agent, &store).await;
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[1].content, "Summarize the results succinctly.");
    assert_eq!(messages[2].content, "\nSo, done");
}

#[tokio::test]
async fn test_failing_call_in_batch_does_not_stop_the_batch() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(LLMResponse::with_tools(
            "",
            vec![
                search_call("a"),
                ToolCall::new("fetch_url", json!({"url": "https://example.com"})),
                search_call("b"),
            ],
        )),
        Ok(LLMResponse::text("partial answer")),
    ]));
    let (mut agent, store) = build_agent(provider, registry()).await;

    agent.ask("compare a and b").await.unwrap();

    let tool_messages: Vec<Message> = stored(&agent, &store)
        .await
        .into_iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(tool_messages.len(), 3);
    assert!(!tool_messages[0].content.starts_with("ERROR"));
    assert_eq!(
        tool_messages[1].content,
        "ERROR: ToolError: connection refused"
    );
    assert_eq!(tool_messages[1].tool_name.as_deref(), Some("fetch_url"));
    assert!(tool_messages[2].content.contains("\"query\":\"b\""));
}

#[tokio::test]
async fn test_inline_json_call_is_dispatched_not_shown() {
    let inline = "```json\n{\"name\":\"duck_search\",\"arguments\":{\"query\":\"rust\"}}\n```";
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(LLMResponse::text(inline)),
        Ok(LLMResponse::text("Rust is a language.")),
    ]));
    let (mut agent, store) = build_agent(provider, registry()).await;

    let answer = agent.ask("what is rust").await.unwrap();
    assert_eq!(answer.as_deref(), Some("Rust is a language."));

    let messages = stored(&agent, &store).await;
    assert!(messages.iter().all(|m| !m.content.contains("```")));
    assert_eq!(messages[1].tool_calls.as_ref().unwrap()[0].name, "duck_search");
}

#[tokio::test]
async fn test_capability_error_retried_once_without_reasoning() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::UnsupportedFeature("\"m\" does not support thinking".into()).into()),
        Ok(LLMResponse::text("fine")),
    ]));
    let (mut agent, _store) = build_agent(Arc::clone(&provider), registry()).await;

    assert_eq!(agent.ask("hi").await.unwrap().as_deref(), Some("fine"));
    let options = provider.seen_options.lock().unwrap();
    assert_eq!(options.len(), 2);
    assert!(options[0].reasoning);
    assert!(!options[1].reasoning);
}

#[tokio::test]
async fn test_second_capability_error_propagates() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::UnsupportedFeature("no thinking".into()).into()),
        Err(ProviderError::UnsupportedFeature("no thinking".into()).into()),
    ]));
    let (mut agent, _store) = build_agent(Arc::clone(&provider), registry()).await;

    let err = agent.ask("hi").await.unwrap_err();
    assert!(err.is_capability_error());
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_unsupported_tools_is_not_retried() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(parse_provider_error(400, "\"gemma3:4b\" does not support tools").into()),
        Ok(LLMResponse::text("never reached")),
    ]));
    let (mut agent, _store) = build_agent(Arc::clone(&provider), registry()).await;

    let err = agent.ask("hi").await.unwrap_err();
    assert!(!err.is_capability_error());
    assert_eq!(provider.call_count(), 1);
    assert_eq!(provider.reasoning_flags(), vec![true]);
    assert!(agent.reasoning_enabled());
}

#[tokio::test]
async fn test_observer_sees_turn_lifecycle() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(LLMResponse::with_tools("", vec![search_call("x")])),
        Ok(LLMResponse::text("ok")),
    ]));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let (agent, _store) = build_agent(provider, registry()).await;
    let mut agent = agent.with_observer(move |e: &AgentEvent| sink.lock().unwrap().push(e.clone()));

    agent.ask("go").await.unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.first(), Some(&AgentEvent::TurnStart));
    assert!(matches!(events[1], AgentEvent::ToolStart { ref name, .. } if name == "duck_search"));
    assert!(matches!(events[2], AgentEvent::ToolEnd { .. }));
    assert_eq!(
        events[3],
        AgentEvent::AssistantMessage {
            content: "ok".into()
        }
    );
    assert_eq!(events.last(), Some(&AgentEvent::TurnEnd));
}

#[tokio::test]
async fn test_panicking_observer_does_not_break_turn() {
    let provider = Arc::new(ScriptedProvider::new(vec![Ok(LLMResponse::text("still here"))]));
    let (agent, _store) = build_agent(provider, registry()).await;
    let mut agent = agent.with_observer(|_: &AgentEvent| panic!("observer bug"));

    assert_eq!(
        agent.ask("hello").await.unwrap().as_deref(),
        Some("still here")
    );
}

#[tokio::test]
async fn test_budget_trims_old_history() {
    let mut config = Config::default();
    config.context.num_ctx = Some(1024);
    config.context.margin_tokens = 256;
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(LLMResponse::text("first")),
        Ok(LLMResponse::text("second")),
    ]));
    let store: Arc<dyn ConversationStore> = Arc::new(SessionStore::new_memory());
    let mut agent = AgentLoop::new(config, provider.clone(), registry(), store)
        .await
        .unwrap();

    agent.ask(&"long ".repeat(1000)).await.unwrap();
    agent.ask("short follow-up").await.unwrap();

    let sent = provider.seen_messages.lock().unwrap();
    let second = &sent[1];
    assert_eq!(second[0].role, Role::System);
    assert_eq!(second.last().unwrap().content, "short follow-up");
    assert!(second.iter().all(|m| m.content.len() < 5000));
    assert_eq!(agent.messages().len(), 5);
}

#[tokio::test]
async fn test_file_tools_use_session_home_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.md"), "meeting at noon").unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(LLMResponse::with_tools(
            "",
            vec![ToolCall::new("load_file", json!({"path": "notes.md"}))],
        )),
        Ok(LLMResponse::text("At noon.")),
        Ok(LLMResponse::with_tools(
            "",
            vec![ToolCall::new("load_file", json!({"path": "notes.md"}))],
        )),
        Ok(LLMResponse::text("Can't read it.")),
    ]));
    let (mut agent, store) = build_agent(provider, Arc::new(default_registry())).await;

    agent.set_home_dir(Some(dir.path().to_path_buf()));
    agent.ask("when is the meeting?").await.unwrap();
    agent.set_home_dir(None);
    agent.ask("and again?").await.unwrap();

    let tool_messages: Vec<Message> = stored(&agent, &store)
        .await
        .into_iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    let loaded: Value = serde_json::from_str(&tool_messages[0].content).unwrap();
    assert_eq!(loaded["content"], "meeting at noon");
    assert!(tool_messages[1]
        .content
        .starts_with("ERROR: SecurityViolation"));
}

// ============================================================================
// Streaming turns
// ============================================================================

#[tokio::test]
async fn test_stream_after_tool_dispatch() {
    let provider = Arc::new(ScriptedProvider::with_streams(
        vec![Ok(LLMResponse::with_tools("", vec![search_call("x")]))],
        vec![vec!["Answer: ", "X"]],
    ));
    let (mut agent, store) = build_agent(provider, registry()).await;

    let pieces: Vec<String> = agent
        .ask_stream("What is X?")
        .into_stream()
        .map(|r| r.unwrap())
        .collect()
        .await;
    assert_eq!(pieces, vec!["Answer: ", "X"]);

    let messages = stored(&agent, &store).await;
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(messages[3].content, "Answer: X");
}

#[tokio::test]
async fn test_stream_cancelled_early_persists_no_answer() {
    let provider = Arc::new(ScriptedProvider::with_streams(
        vec![Ok(LLMResponse::with_tools("", vec![search_call("x")]))],
        vec![vec!["one ", "two ", "three ", "four ", "five"]],
    ));
    let (mut agent, store) = build_agent(provider, registry()).await;

    {
        let mut stream = agent.ask_stream("count");
        assert_eq!(stream.next().await.unwrap().unwrap(), "one ");
        assert_eq!(stream.next().await.unwrap().unwrap(), "two ");
    }

    let messages = stored(&agent, &store).await;
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    // Tool dispatch stays committed; the partial answer does not.
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool]);
    assert_eq!(&agent.messages()[1..], &messages[..]);
}

#[tokio::test]
async fn test_stream_exhausted_persists_full_answer() {
    let provider = Arc::new(ScriptedProvider::with_streams(
        vec![Ok(LLMResponse::empty())],
        vec![vec!["one ", "two ", "three"]],
    ));
    let (mut agent, store) = build_agent(provider, registry()).await;

    let mut stream = agent.ask_stream("count");
    let mut pieces = Vec::new();
    while let Some(piece) = stream.next().await {
        pieces.push(piece.unwrap());
    }
    assert_eq!(pieces.len(), 3);

    let messages = stored(&agent, &store).await;
    assert_eq!(messages.last().unwrap().content, "one two three");
}

#[tokio::test]
async fn test_stream_nudge_yields_prefix_first() {
    let provider = Arc::new(ScriptedProvider::with_streams(
        vec![Ok(LLMResponse::with_tools("", vec![search_call("x")]))],
        vec![vec![], vec!["done"]],
    ));
    let (mut agent, store) = build_agent(provider, registry()).await;

    let pieces: Vec<String> = agent
        .ask_stream("q")
        .into_stream()
        .map(|r| r.unwrap())
        .collect()
        .await;
    assert_eq!(pieces, vec!["\nSo, ", "done"]);

    let messages = stored(&agent, &store).await;
    let n = messages.len();
    assert_eq!(messages[n - 2].content, "Summarize the results succinctly.");
    assert_eq!(messages[n - 1].content, "\nSo, done");
}

#[tokio::test]
async fn test_stream_direct_answer_single_increment() {
    let provider = Arc::new(ScriptedProvider::new(vec![Ok(LLMResponse::text(
        "Paris is the capital.",
    ))]));
    let (mut agent, _store) = build_agent(Arc::clone(&provider), registry()).await;

    let pieces: Vec<String> = agent
        .ask_stream("capital of France?")
        .into_stream()
        .map(|r| r.unwrap())
        .collect()
        .await;
    assert_eq!(pieces, vec!["Paris is the capital."]);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_stream_capability_error_retried_once_without_reasoning() {
    let provider = Arc::new(
        ScriptedProvider::with_streams(vec![Ok(LLMResponse::empty())], vec![vec!["ok ", "then"]])
            .with_stream_failures(vec![ProviderError::UnsupportedFeature(
                "\"m\" does not support thinking".into(),
            )
            .into()]),
    );
    let (mut agent, store) = build_agent(Arc::clone(&provider), registry()).await;

    let pieces: Vec<String> = agent
        .ask_stream("hi")
        .into_stream()
        .map(|r| r.unwrap())
        .collect()
        .await;
    assert_eq!(pieces, vec!["ok ", "then"]);
    // Batch call, rejected stream, retried stream.
    assert_eq!(provider.reasoning_flags(), vec![true, true, false]);
    assert!(!agent.reasoning_enabled());
    assert_eq!(stored(&agent, &store).await.last().unwrap().content, "ok then");
}

#[tokio::test]
async fn test_stream_second_capability_error_is_yielded() {
    let rejected = || -> OmniError { ProviderError::UnsupportedFeature("no thinking".into()).into() };
    let provider = Arc::new(
        ScriptedProvider::with_streams(vec![Ok(LLMResponse::empty())], vec![vec!["unused"]])
            .with_stream_failures(vec![rejected(), rejected()]),
    );
    let (mut agent, store) = build_agent(Arc::clone(&provider), registry()).await;

    let mut stream = agent.ask_stream("hi");
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(err.is_capability_error());
    assert!(stream.next().await.is_none());
    drop(stream);

    assert_eq!(provider.reasoning_flags(), vec![true, true, false]);
    let roles: Vec<Role> = stored(&agent, &store).await.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User]);
}

#[tokio::test]
async fn test_streamed_answer_is_reported_only_as_deltas() {
    let provider = Arc::new(ScriptedProvider::with_streams(
        vec![Ok(LLMResponse::with_tools("", vec![search_call("x")]))],
        vec![vec!["Answer: ", "X"]],
    ));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let (agent, store) = build_agent(provider, registry()).await;
    let mut agent = agent.with_observer(move |e: &AgentEvent| sink.lock().unwrap().push(e.clone()));

    let pieces: Vec<String> = agent
        .ask_stream("What is X?")
        .into_stream()
        .map(|r| r.unwrap())
        .collect()
        .await;
    assert_eq!(pieces.concat(), "Answer: X");

    let events = events.lock().unwrap();
    let deltas: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::AssistantDelta { delta } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, vec!["Answer: ", "X"]);
    assert!(!events
        .iter()
        .any(|e| matches!(e, AgentEvent::AssistantMessage { .. })));
    assert_eq!(events.last(), Some(&AgentEvent::TurnEnd));
    assert_eq!(stored(&agent, &store).await.last().unwrap().content, "Answer: X");
}
