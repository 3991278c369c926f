//! Scoped home-directory context for tool dispatch.
//!
//! An [`ExecutionContext`] holds the home directory seen by tools. Entering it
//! returns an [`ExecutionScope`] guard; dropping the guard restores whatever
//! value was there before, on every exit path including early returns and
//! panics.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use super::ToolContext;

/// Holder of the current home directory for one agent loop.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    home_dir: Mutex<Option<PathBuf>>,
}

impl ExecutionContext {
    /// Create a context with no home directory set.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<PathBuf>> {
        self.home_dir.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The home directory currently in effect.
    pub fn current_home(&self) -> Option<PathBuf> {
        self.slot().clone()
    }

    /// Set `home_dir` for the lifetime of the returned guard.
    ///
    /// # Example
    /// ```
    /// use omni_agent::tools::ExecutionContext;
    /// use std::path::PathBuf;
    ///
    /// let ctx = ExecutionContext::new();
    /// {
    ///     let _scope = ctx.enter(Some(PathBuf::from("/srv/docs")));
    ///     assert_eq!(ctx.current_home(), Some(PathBuf::from("/srv/docs")));
    /// }
    /// assert_eq!(ctx.current_home(), None);
    /// ```
    pub fn enter(&self, home_dir: Option<PathBuf>) -> ExecutionScope<'_> {
        let prior = std::mem::replace(&mut *self.slot(), home_dir);
        ExecutionScope {
            context: self,
            prior: Some(prior),
        }
    }
}

/// Guard that restores the prior home directory when dropped.
#[derive(Debug)]
pub struct ExecutionScope<'a> {
    context: &'a ExecutionContext,
    prior: Option<Option<PathBuf>>,
}

impl ExecutionScope<'_> {
    /// Build the [`ToolContext`] for an invocation inside this scope.
    pub fn tool_context(&self, session_id: &str) -> ToolContext {
        ToolContext {
            home_dir: self.context.current_home(),
            session_id: Some(session_id.to_string()),
        }
    }
}

impl Drop for ExecutionScope<'_> {
    fn drop(&mut self) {
        if let Some(prior) = self.prior.take() {
            *self.context.slot() = prior;
        }
    }
}
