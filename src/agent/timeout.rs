//! Approval timeout policies
//!
//! Decides what happens to an interrupt nobody answered in time.

use crate::interrupt::PendingInterrupt;
use crate::models::TurnOutcome;
use crate::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    /// Resume the execution with a reject for every pending request
    AutoReject,
    /// Drop the interrupt and discard the unanswered turn
    AbortTurn,
}

/// Trait for approval-timeout handling
pub trait TimeoutPolicy: Send + Sync {
    fn on_timeout(&self, interrupt: &PendingInterrupt) -> TimeoutAction;
}

/// Errors out the turn, like the chat server's five minute approval window
pub struct AbortOnTimeout;

impl TimeoutPolicy for AbortOnTimeout {
    fn on_timeout(&self, _interrupt: &PendingInterrupt) -> TimeoutAction {
        TimeoutAction::AbortTurn
    }
}

/// Treats silence as an explicit reject
pub struct AutoRejectOnTimeout;

impl TimeoutPolicy for AutoRejectOnTimeout {
    fn on_timeout(&self, _interrupt: &PendingInterrupt) -> TimeoutAction {
        TimeoutAction::AutoReject
    }
}

/// What the sweeper did with one stale interrupt
#[derive(Debug)]
pub struct ExpiredInterrupt {
    pub session_id: String,
    pub action: TimeoutAction,
    pub outcome: Result<TurnOutcome>,
}
