//! Context Window Management
//!
//! Approximates how many tokens the retained conversation will cost and
//! warns the operator when it crosses the configured ceiling. Purely
//! advisory: nothing here blocks a turn.

use crate::memory::store::ConversationHistory;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Rough heuristic for English text
pub const CHARS_PER_TOKEN: usize = 4;

/// Derived, non-persistent token estimate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenBudgetEstimate {
    pub tokens: usize,
    pub ceiling: usize,
    pub over_budget: bool,
}

impl TokenBudgetEstimate {
    /// Get percentage of the ceiling used
    pub fn percent_used(&self) -> f32 {
        if self.ceiling == 0 {
            return 0.0;
        }
        (self.tokens as f32 / self.ceiling as f32) * 100.0
    }
}

/// Estimates conversation size in tokens from character counts
#[derive(Debug, Clone)]
pub struct TokenEstimator {
    ceiling: usize,
}

impl TokenEstimator {
    pub fn new(ceiling: usize) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Approximate token count; empty history is zero
    pub fn estimate(&self, history: &ConversationHistory) -> usize {
        history.char_count() / CHARS_PER_TOKEN
    }

    /// Estimate and warn if the ceiling is exceeded
    ///
    /// Counts the primer and every turn held, including an open one. The
    /// controller calls this after the new message is opened on an already
    /// pruned history, which is the same content the runtime is sent.
    pub fn check(&self, session_id: &str, history: &ConversationHistory) -> TokenBudgetEstimate {
        let tokens = self.estimate(history);
        let over_budget = tokens > self.ceiling;

        if over_budget {
            warn!(
                session_id = %session_id,
                tokens,
                ceiling = self.ceiling,
                "Context is very large; consider clearing the conversation"
            );
        }

        TokenBudgetEstimate {
            tokens,
            ceiling: self.ceiling,
            over_budget,
        }
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(crate::config::CONTEXT_WARNING_THRESHOLD)
    }
}
