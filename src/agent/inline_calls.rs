//! Recovery of tool calls written as JSON text.
//!
//! Some models answer a tool request by printing the call as JSON in the
//! content channel instead of using structured tool calls. This module
//! recognizes a fenced JSON block or a content body that is entirely one JSON
//! value, and normalizes what it finds into [`ToolCall`]s.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::session::ToolCall;

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\[.*?\]|\{.*?\})\s*```").expect("static regex")
});
static BARE_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*(\[.*\]|\{.*\})\s*$").expect("static regex"));

/// Extract tool calls from assistant text.
///
/// Returns `None` when no candidate parses into at least one valid call.
/// Never fails; malformed JSON is simply "not found".
///
/// # Example
/// ```
/// use omni_agent::agent::extract_inline_calls;
///
/// let text = "```json\n{\"name\":\"duck_search\",\"arguments\":{\"query\":\"x\"}}\n```";
/// let calls = extract_inline_calls(text).unwrap();
/// assert_eq!(calls[0].name, "duck_search");
/// assert_eq!(calls[0].arguments["query"], "x");
///
/// assert!(extract_inline_calls("The capital of France is Paris.").is_none());
/// ```
pub fn extract_inline_calls(text: &str) -> Option<Vec<ToolCall>> {
    let fenced = FENCED_JSON
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| parse_calls(m.as_str()));
    if fenced.is_some() {
        return fenced;
    }

    BARE_JSON
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_calls(m.as_str()))
}

fn parse_calls(candidate: &str) -> Option<Vec<ToolCall>> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    let calls: Vec<ToolCall> = match value {
        Value::Array(items) => items.iter().filter_map(normalize_one).collect(),
        obj @ Value::Object(_) => normalize_one(&obj).into_iter().collect(),
        _ => return None,
    };
    (!calls.is_empty()).then_some(calls)
}

/// Accepts `{name, arguments}` or `{function: {name, arguments}}`.
/// A missing `arguments` means no arguments; a non-mapping one rejects the call.
fn normalize_one(value: &Value) -> Option<ToolCall> {
    let obj = value.as_object()?;
    let inner = match obj.get("function") {
        Some(Value::Object(function)) => function,
        _ => obj,
    };

    let name = inner.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let arguments = match inner.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(args)) => args.clone(),
        Some(_) => return None,
    };

    Some(ToolCall {
        name: name.to_string(),
        arguments,
    })
}
