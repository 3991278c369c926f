//! Turn lifecycle events for observers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::session::ToolArgs;

/// An event emitted while a turn runs.
///
/// Serializes with an `event` tag, e.g. `{"event":"tool_start","name":..,"args":..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A user message was accepted
    TurnStart,
    /// A complete assistant message was recorded. Not sent for an answer
    /// that was already delivered as `AssistantDelta` pieces.
    AssistantMessage { content: String },
    /// A streamed piece of the final answer
    AssistantDelta { delta: String },
    /// A tool is about to run
    ToolStart { name: String, args: ToolArgs },
    /// A tool returned a value
    ToolEnd { name: String },
    /// A tool failed or was not available
    ToolError { name: String, error: String },
    /// The turn finished
    TurnEnd,
}

/// Observer callback.
pub type Observer = Arc<dyn Fn(&AgentEvent) + Send + Sync>;

/// Delivers events to an optional observer.
///
/// A panicking observer is logged and otherwise ignored; it can never abort
/// a turn.
#[derive(Clone, Default)]
pub struct EventSink {
    observer: Option<Observer>,
}

impl EventSink {
    /// A sink that delivers to `observer`.
    pub fn new(observer: Observer) -> Self {
        Self {
            observer: Some(observer),
        }
    }

    /// Deliver `event`.
    pub fn emit(&self, event: AgentEvent) {
        let Some(observer) = &self.observer else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| observer(&event))).is_err() {
            warn!(?event, "Observer panicked; event dropped");
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_reaches_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink = EventSink::new(Arc::new(move |e: &AgentEvent| {
            sink_seen.lock().unwrap().push(e.clone());
        }));
        sink.emit(AgentEvent::TurnStart);
        sink.emit(AgentEvent::ToolEnd {
            name: "load_file".into(),
        });
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_panicking_observer_is_swallowed() {
        let sink = EventSink::new(Arc::new(|_: &AgentEvent| panic!("observer bug")));
        sink.emit(AgentEvent::TurnEnd);
        EventSink::default().emit(AgentEvent::TurnEnd);
    }

    #[test]
    fn test_event_serialization() {
        let event = AgentEvent::ToolError {
            name: "x".into(),
            error: "NotFound: nope".into(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"event": "tool_error", "name": "x", "error": "NotFound: nope"})
        );
        assert_eq!(
            serde_json::to_value(AgentEvent::TurnStart).unwrap(),
            serde_json::json!({"event": "turn_start"})
        );
    }
}
