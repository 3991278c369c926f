//! Token budgeting for model calls
//!
//! Estimates token cost from character counts and selects the most recent
//! suffix of the conversation that fits the model's context window.

use std::borrow::Cow;

use tracing::debug;

use crate::config::ContextConfig;
use crate::session::{Message, Role};
use crate::utils::string::{char_len, clip_chars};

/// Floor applied to every effective budget and resolved window.
pub const MIN_BUDGET_TOKENS: usize = 512;

/// Character-count heuristic for token cost.
///
/// # Example
/// ```
/// use omni_agent::agent::TokenEstimator;
///
/// let estimator = TokenEstimator::new(4.0);
/// assert_eq!(estimator.estimate(""), 0);
/// assert_eq!(estimator.estimate("abcd"), 2);
/// assert_eq!(estimator.estimate("abc"), 1);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    chars_per_token: f64,
}

impl TokenEstimator {
    /// Create an estimator. Ratios below 1.0 are clamped to 1.0.
    pub fn new(chars_per_token: f64) -> Self {
        let chars_per_token = if chars_per_token.is_finite() {
            chars_per_token.max(1.0)
        } else {
            4.0
        };
        Self { chars_per_token }
    }

    /// Estimated tokens for `text`: 0 when empty, otherwise
    /// `floor(chars / chars_per_token) + 1`.
    pub fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        (char_len(text) as f64 / self.chars_per_token).floor() as usize + 1
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(4.0)
    }
}

/// Context window and safety margin for one model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Context window the call is made with
    pub window_tokens: usize,
    /// Tokens held back for the model's output
    pub margin_tokens: usize,
}

impl Budget {
    /// Create a budget.
    pub fn new(window_tokens: usize, margin_tokens: usize) -> Self {
        Self {
            window_tokens,
            margin_tokens,
        }
    }

    /// `max(512, window - margin)`.
    ///
    /// # Example
    /// ```
    /// use omni_agent::agent::Budget;
    ///
    /// assert_eq!(Budget::new(8192, 256).effective(), 7936);
    /// assert_eq!(Budget::new(600, 256).effective(), 512);
    /// ```
    pub fn effective(&self) -> usize {
        self.window_tokens
            .saturating_sub(self.margin_tokens)
            .max(MIN_BUDGET_TOKENS)
    }
}

/// Resolve the context window for a call.
///
/// With both a configured cap and the model's own maximum the smaller wins;
/// with one of them that one is used; with neither, `default`. Never below 512.
pub fn resolve_window(configured: Option<usize>, model_max: Option<usize>, default: usize) -> usize {
    let window = match (configured, model_max) {
        (Some(cap), Some(max)) => cap.min(max),
        (Some(cap), None) => cap,
        (None, Some(max)) => max,
        (None, None) => default,
    };
    window.max(MIN_BUDGET_TOKENS)
}

/// Selects the budget-fitting, most recent suffix of a conversation.
#[derive(Debug, Clone)]
pub struct ContextBudgeter {
    estimator: TokenEstimator,
    message_overhead: usize,
    max_tool_chars: usize,
}

impl ContextBudgeter {
    /// Create a budgeter.
    ///
    /// # Arguments
    /// * `estimator` - Token estimator
    /// * `message_overhead` - Fixed per-message cost added to every estimate
    /// * `max_tool_chars` - Tool message content is clipped to this many characters
    pub fn new(estimator: TokenEstimator, message_overhead: usize, max_tool_chars: usize) -> Self {
        Self {
            estimator,
            message_overhead,
            max_tool_chars,
        }
    }

    /// Build a budgeter from the `context` config section.
    pub fn from_config(cfg: &ContextConfig) -> Self {
        Self::new(
            TokenEstimator::new(cfg.chars_per_token),
            cfg.message_overhead_tokens,
            cfg.max_tool_context_chars,
        )
    }

    /// Select the messages to send for a call with `budget` tokens.
    ///
    /// A leading system message is always kept and not counted. The rest is
    /// walked newest first; messages are taken while they fit, and the newest
    /// one is taken even if it alone overflows. The walk stops at the first
    /// message that does not fit, so the result is a contiguous suffix in
    /// chronological order.
    ///
    /// # Example
    /// ```
    /// use omni_agent::agent::{ContextBudgeter, TokenEstimator};
    /// use omni_agent::session::Message;
    ///
    /// let budgeter = ContextBudgeter::new(TokenEstimator::new(4.0), 8, 20_000);
    /// let history = vec![
    ///     Message::system("be brief"),
    ///     Message::user(&"x".repeat(4000)),
    ///     Message::user("latest"),
    /// ];
    /// let selected = budgeter.select(&history, 100);
    /// assert_eq!(selected.len(), 2);
    /// assert_eq!(selected[1].content, "latest");
    /// ```
    pub fn select(&self, history: &[Message], budget: usize) -> Vec<Message> {
        let (system, rest) = match history.split_first() {
            Some((first, rest)) if first.role == Role::System => (Some(first), rest),
            _ => (None, history),
        };

        let mut picked: Vec<Message> = Vec::new();
        let mut used = 0usize;
        for msg in rest.iter().rev() {
            let msg = self.model_copy(msg);
            let cost = self.estimator.estimate(&msg.content) + self.message_overhead;
            if picked.is_empty() || used + cost <= budget {
                used += cost;
                picked.push(msg);
            } else {
                break;
            }
        }

        debug!(
            total = rest.len(),
            selected = picked.len(),
            used_tokens = used,
            budget,
            "Selected context"
        );

        let mut selected = Vec::with_capacity(picked.len() + 1);
        if let Some(system) = system {
            selected.push(system.clone());
        }
        selected.extend(picked.into_iter().rev());
        selected
    }

    fn model_copy(&self, msg: &Message) -> Message {
        let mut copy = msg.clone();
        if msg.role == Role::Tool {
            if let Cow::Owned(clipped) = clip_chars(&msg.content, self.max_tool_chars) {
                copy.content = clipped;
            }
        }
        copy
    }
}

impl Default for ContextBudgeter {
    fn default() -> Self {
        Self::from_config(&ContextConfig::default())
    }
}
