//! Agent Memory System
//!
//! Provides conversation history, turn-bounded pruning and token budget
//! estimation for the session core

pub mod store;
pub mod pruner;
pub mod context_manager;

pub use store::{ConversationHistory, ConversationTurn};
pub use pruner::{context_notice, prune};
pub use context_manager::{TokenBudgetEstimate, TokenEstimator};
