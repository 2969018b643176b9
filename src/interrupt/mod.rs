//! Interrupt registry
//!
//! Tracks at most one paused agent execution per session and arbitrates the
//! pause/resume protocol:
//!
//! IDLE → register → AWAITING_DECISION → resolve → IDLE

use crate::error::SessionError;
use crate::models::{ActionRequest, Decision, ExecutionHandle};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// An agent execution paused before one or more sensitive tool calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingInterrupt {
    pub session_id: String,
    pub handle: ExecutionHandle,
    pub requests: Vec<ActionRequest>,
    pub registered_at: DateTime<Utc>,
}

impl PendingInterrupt {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.registered_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Decisions accepted by `resolve`, ready to forward to the runtime
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDecisions {
    pub handle: ExecutionHandle,
    pub requests: Vec<ActionRequest>,
    pub decisions: Vec<Decision>,
}

/// Per-session pending interrupt table
pub struct InterruptRegistry {
    pending: Arc<RwLock<HashMap<String, PendingInterrupt>>>,
}

impl InterruptRegistry {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record a pause; fails with `Conflict` if one is already pending
    pub async fn register(
        &self,
        session_id: &str,
        handle: ExecutionHandle,
        requests: Vec<ActionRequest>,
    ) -> Result<PendingInterrupt> {
        let mut pending = self.pending.write().await;

        if pending.contains_key(session_id) {
            return Err(SessionError::Conflict(format!(
                "session {} already has a pending interrupt",
                session_id
            )));
        }

        let interrupt = PendingInterrupt {
            session_id: session_id.to_string(),
            handle,
            requests,
            registered_at: Utc::now(),
        };

        info!(
            session_id = %session_id,
            request_count = interrupt.requests.len(),
            "Interrupt registered, awaiting decisions"
        );

        pending.insert(session_id.to_string(), interrupt.clone());
        Ok(interrupt)
    }

    /// Consume the pending interrupt with one decision per request
    ///
    /// Arity and allowed-kind violations leave the interrupt registered.
    pub async fn resolve(
        &self,
        session_id: &str,
        decisions: Vec<Decision>,
    ) -> Result<ResolvedDecisions> {
        let mut pending = self.pending.write().await;

        let interrupt = pending.get(session_id).ok_or_else(|| {
            SessionError::NotFound(format!("session {} has no pending interrupt", session_id))
        })?;

        if decisions.len() != interrupt.requests.len() {
            return Err(SessionError::Arity {
                expected: interrupt.requests.len(),
                actual: decisions.len(),
            });
        }

        for (request, decision) in interrupt.requests.iter().zip(&decisions) {
            if !request.allows(decision.kind()) {
                return Err(SessionError::DecisionNotAllowed(format!(
                    "'{}' is not allowed for {}",
                    decision.kind(),
                    request.tool_name
                )));
            }
        }

        // Validated above; removal cannot miss.
        let interrupt = pending.remove(session_id).ok_or_else(|| {
            SessionError::NotFound(format!("session {} has no pending interrupt", session_id))
        })?;

        debug!(session_id = %session_id, "Interrupt resolved");

        Ok(ResolvedDecisions {
            handle: interrupt.handle,
            requests: interrupt.requests,
            decisions,
        })
    }

    /// Re-register an interrupt loaded from the session store
    ///
    /// Keeps `registered_at`, so the approval window is not reset. Returns
    /// false if the session already has a live interrupt.
    pub async fn restore(&self, interrupt: PendingInterrupt) -> bool {
        let mut pending = self.pending.write().await;
        if pending.contains_key(&interrupt.session_id) {
            return false;
        }
        debug!(session_id = %interrupt.session_id, "Interrupt restored from store");
        pending.insert(interrupt.session_id.clone(), interrupt);
        true
    }

    /// Non-mutating lookup
    pub async fn peek(&self, session_id: &str) -> Option<PendingInterrupt> {
        let pending = self.pending.read().await;
        pending.get(session_id).cloned()
    }

    /// Drop the pending interrupt without decisions (turn failure, reset)
    pub async fn clear(&self, session_id: &str) -> Option<PendingInterrupt> {
        let mut pending = self.pending.write().await;
        let removed = pending.remove(session_id);
        if removed.is_some() {
            debug!(session_id = %session_id, "Interrupt cleared");
        }
        removed
    }

    /// Interrupts pending for longer than `timeout`, oldest first
    pub async fn expired(&self, timeout: Duration, now: DateTime<Utc>) -> Vec<PendingInterrupt> {
        let pending = self.pending.read().await;

        let mut items: Vec<PendingInterrupt> = pending
            .values()
            .filter(|interrupt| interrupt.age(now) > timeout)
            .cloned()
            .collect();

        items.sort_by_key(|interrupt| interrupt.registered_at);
        items
    }
}

impl Default for InterruptRegistry {
    fn default() -> Self {
        Self::new()
    }
}
