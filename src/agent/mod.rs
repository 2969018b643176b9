//! Session/turn controller - drives one request/response cycle
//!
//! SUBMIT → STREAM → (INTERRUPT → DECIDE → RESUME)* → FINALIZE

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::interrupt::{InterruptRegistry, PendingInterrupt};
use crate::memory::{context_notice, prune, ConversationTurn, TokenEstimator};
use crate::models::{Decision, DecisionKind, ExecutionHandle, TurnOutcome};
use crate::runtime::{AgentRuntime, RunRequest, StepEvent, StepStream};
use crate::state::{SessionState, SessionStore, SessionSummary};
use crate::tracker::{StepSink, StepTracker, StepUpdate, TracingSink};
use crate::Result;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod timeout;
pub use timeout::{AbortOnTimeout, AutoRejectOnTimeout, ExpiredInterrupt, TimeoutAction, TimeoutPolicy};

/// Initial content for a new session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSeed {
    #[serde(default)]
    pub primer: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

/// Owns the turn protocol for every session
pub struct SessionController {
    store: Arc<dyn SessionStore>,
    runtime: Arc<dyn AgentRuntime>,
    interrupts: InterruptRegistry,
    estimator: TokenEstimator,
    sink: Arc<dyn StepSink>,
    timeout_policy: Arc<dyn TimeoutPolicy>,
    config: SessionConfig,
    /// One turn at a time per session
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        runtime: Arc<dyn AgentRuntime>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            runtime,
            interrupts: InterruptRegistry::new(),
            estimator: TokenEstimator::new(config.context_warning_tokens),
            sink: Arc::new(TracingSink),
            timeout_policy: Arc::new(AbortOnTimeout),
            config,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn StepSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_timeout_policy(mut self, policy: Arc<dyn TimeoutPolicy>) -> Self {
        self.timeout_policy = policy;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // =============================
    // Turn Protocol
    // =============================

    /// Submit a user message and drive the agent until it answers or pauses
    pub async fn submit_turn(&self, session_id: &str, user_text: &str) -> Result<TurnOutcome> {
        let _turn = self.acquire_turn(session_id).await?;

        let mut state = self.store.load_or_create(session_id).await?;

        if self.live_interrupt(&state).await.is_some() {
            return Err(SessionError::SessionBusy(format!(
                "session {} is awaiting approval",
                session_id
            )));
        }

        let request = RunRequest {
            session_id: session_id.to_string(),
            primer: state.history.primer().map(str::to_string),
            context_notice: context_notice(state.evicted_turns, self.config.max_turns),
            history: state
                .history
                .turns()
                .iter()
                .filter(|t| t.is_complete())
                .cloned()
                .collect(),
            files: state.files.clone(),
            user_message: user_text.to_string(),
        };

        state.history.open_turn(user_text);
        state.touch();

        // History was pruned when the previous turn closed, so this counts
        // what the runtime receives: primer, retained turns and the new message
        let budget = self.estimator.check(session_id, &state.history);
        info!(
            session_id = %session_id,
            turns = state.history.len(),
            estimated_tokens = budget.tokens,
            "Starting turn"
        );

        let stream = match self.runtime.start(request).await {
            Ok(stream) => stream,
            Err(e) => return self.fail_turn(state, e).await,
        };

        self.drive(state, stream).await
    }

    /// Answer a pending interrupt and continue the suspended turn
    pub async fn submit_decisions(
        &self,
        session_id: &str,
        decisions: Vec<Decision>,
    ) -> Result<TurnOutcome> {
        let _turn = self.acquire_turn(session_id).await?;

        let state = self.store.load(session_id).await?.ok_or_else(|| {
            SessionError::NotFound(format!("session {} does not exist", session_id))
        })?;

        self.live_interrupt(&state).await;
        let resolved = self.interrupts.resolve(session_id, decisions).await?;

        info!(
            session_id = %session_id,
            handle = %resolved.handle,
            approved = resolved
                .decisions
                .iter()
                .filter(|d| d.kind() == DecisionKind::Approve)
                .count(),
            "Resuming with decisions"
        );

        self.resume(state, &resolved.handle, resolved.decisions).await
    }

    /// Completed and open turns, oldest first
    pub async fn get_history(&self, session_id: &str) -> Result<Vec<ConversationTurn>> {
        Ok(self
            .store
            .load(session_id)
            .await?
            .map(|state| state.history.turns().to_vec())
            .unwrap_or_default())
    }

    pub async fn pending(&self, session_id: &str) -> Option<PendingInterrupt> {
        if let Some(live) = self.interrupts.peek(session_id).await {
            return Some(live);
        }
        match self.store.load(session_id).await {
            Ok(Some(state)) => state.pending,
            _ => None,
        }
    }

    // =============================
    // Session Management
    // =============================

    pub async fn create_session(&self, seed: SessionSeed) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        let mut state = SessionState::new(session_id.clone());
        if let Some(primer) = seed.primer {
            state.history = crate::memory::ConversationHistory::with_primer(primer);
        }
        state.files = seed.files;
        self.store.save(state).await?;

        info!(session_id = %session_id, "Session created");
        Ok(session_id)
    }

    pub async fn set_auto_approve(&self, session_id: &str, enabled: bool) -> Result<()> {
        let _turn = self.acquire_turn(session_id).await?;
        let mut state = self.store.load_or_create(session_id).await?;
        state.auto_approve = enabled;
        state.touch();
        self.store.save(state).await?;

        info!(session_id = %session_id, enabled, "Auto-approve updated");
        Ok(())
    }

    /// Reset history, files and any pending interrupt; false if unknown
    pub async fn clear_session(&self, session_id: &str) -> Result<bool> {
        let _turn = self.acquire_turn(session_id).await?;
        self.interrupts.clear(session_id).await;

        let Some(mut state) = self.store.load(session_id).await? else {
            return Ok(false);
        };
        state.reset();
        self.store.save(state).await?;
        Ok(true)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let _turn = self.acquire_turn(session_id).await?;
        self.interrupts.clear(session_id).await;
        let deleted = self.store.delete(session_id).await?;
        self.release_turn_lock(session_id).await;
        Ok(deleted)
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.store.list().await
    }

    /// Drop sessions idle past the configured timeout
    ///
    /// A session with a turn in flight is skipped even if its stored
    /// activity time is old.
    pub async fn evict_idle_sessions(&self) -> Result<Vec<String>> {
        let timeout = self.config.session_idle_timeout;
        let mut evicted = Vec::new();

        for session_id in self.store.idle_sessions(timeout).await? {
            let Ok(_turn) = self.acquire_turn(&session_id).await else {
                continue;
            };

            // Activity may have landed between listing and locking
            match self.store.load(&session_id).await? {
                Some(state) if state.is_idle(timeout) => {}
                _ => continue,
            }

            self.interrupts.clear(&session_id).await;
            self.store.delete(&session_id).await?;
            self.release_turn_lock(&session_id).await;
            evicted.push(session_id);
        }

        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted idle sessions");
        }
        Ok(evicted)
    }

    /// Re-register interrupts persisted by suspended sessions, e.g. after a restart
    pub async fn restore_pending_interrupts(&self) -> Result<usize> {
        let mut restored = 0;
        for summary in self.store.list().await? {
            let Some(state) = self.store.load(&summary.session_id).await? else {
                continue;
            };
            if let Some(interrupt) = state.pending {
                if self.interrupts.restore(interrupt).await {
                    restored += 1;
                }
            }
        }

        if restored > 0 {
            info!(restored, "Restored pending interrupts");
        }
        Ok(restored)
    }

    // =============================
    // Approval Timeouts
    // =============================

    /// Apply the timeout policy to every interrupt older than the approval timeout
    pub async fn expire_stale_interrupts(&self, now: DateTime<Utc>) -> Vec<ExpiredInterrupt> {
        let stale = self
            .interrupts
            .expired(self.config.approval_timeout, now)
            .await;

        let mut results = Vec::with_capacity(stale.len());

        for interrupt in stale {
            let session_id = interrupt.session_id.clone();

            // A caller resolving right now wins
            let Ok(_turn) = self.acquire_turn(&session_id).await else {
                continue;
            };
            if self.interrupts.clear(&session_id).await.is_none() {
                continue;
            }

            let action = self.timeout_policy.on_timeout(&interrupt);
            warn!(session_id = %session_id, ?action, "Approval timed out");

            let outcome = match action {
                TimeoutAction::AutoReject => {
                    let decisions = vec![Decision::Reject; interrupt.requests.len()];
                    match self.store.load(&session_id).await {
                        Ok(Some(state)) => self.resume(state, &interrupt.handle, decisions).await,
                        Ok(None) => Err(SessionError::NotFound(format!(
                            "session {} does not exist",
                            session_id
                        ))),
                        Err(e) => Err(e),
                    }
                }
                TimeoutAction::AbortTurn => self.abort_turn(&session_id).await,
            };

            results.push(ExpiredInterrupt {
                session_id,
                action,
                outcome,
            });
        }

        results
    }

    /// Periodically expire stale interrupts and idle sessions
    pub fn spawn_timeout_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;

                let expired = self.expire_stale_interrupts(Utc::now()).await;
                if !expired.is_empty() {
                    debug!(count = expired.len(), "Expired stale interrupts");
                }

                if let Err(e) = self.evict_idle_sessions().await {
                    warn!(error = %e, "Idle session eviction failed");
                }
            }
        })
    }

    // =============================
    // Internals
    // =============================

    async fn acquire_turn(&self, session_id: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.turn_locks.lock().await;
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        lock.try_lock_owned().map_err(|_| {
            SessionError::SessionBusy(format!("session {} has a turn in progress", session_id))
        })
    }

    /// Forget a session's turn lock; called while holding its guard
    async fn release_turn_lock(&self, session_id: &str) {
        let mut locks = self.turn_locks.lock().await;
        // The map and the caller's guard are the only expected references
        if locks
            .get(session_id)
            .map_or(false, |lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(session_id);
        }
    }

    /// The session's interrupt, re-registering a persisted one the registry lost
    async fn live_interrupt(&self, state: &SessionState) -> Option<PendingInterrupt> {
        if let Some(live) = self.interrupts.peek(&state.session_id).await {
            return Some(live);
        }
        let persisted = state.pending.clone()?;
        self.interrupts.restore(persisted.clone()).await;
        Some(persisted)
    }

    async fn resume(
        &self,
        state: SessionState,
        handle: &ExecutionHandle,
        decisions: Vec<Decision>,
    ) -> Result<TurnOutcome> {
        match self.runtime.resume(handle, decisions).await {
            Ok(stream) => self.drive(state, stream).await,
            Err(e) => self.fail_turn(state, e).await,
        }
    }

    /// Consume the stream until a terminal event, an error, or its end
    async fn drive(&self, mut state: SessionState, mut stream: StepStream) -> Result<TurnOutcome> {
        let session_id = state.session_id.clone();
        let mut tracker = StepTracker::new(self.config.tool_result_preview_chars);

        loop {
            let event = match stream.next().await {
                Some(Ok(event)) => event,
                Some(Err(e)) => return self.fail_turn(state, e).await,
                None => {
                    let error = SessionError::IncompleteTurn(format!(
                        "runtime ended session {} turn without a final message",
                        session_id
                    ));
                    return self.fail_turn(state, error).await;
                }
            };

            match event {
                StepEvent::FinalMessage { text } => {
                    return self.complete_turn(state, text).await;
                }
                StepEvent::Interrupt { handle, requests } => {
                    let auto = state.auto_approve
                        && requests.iter().all(|r| r.allows(DecisionKind::Approve));

                    if auto {
                        info!(
                            session_id = %session_id,
                            request_count = requests.len(),
                            "Auto-approving interrupt"
                        );
                        let decisions = vec![Decision::Approve; requests.len()];
                        stream = match self.runtime.resume(&handle, decisions).await {
                            Ok(stream) => stream,
                            Err(e) => return self.fail_turn(state, e).await,
                        };
                        continue;
                    }

                    let interrupt = self
                        .interrupts
                        .register(&session_id, handle, requests.clone())
                        .await?;

                    state.pending = Some(interrupt);
                    state.touch();
                    if let Err(e) = self.store.save(state.clone()).await {
                        return self.fail_turn(state, e).await;
                    }

                    self.sink.emit(
                        &session_id,
                        &StepUpdate::ApprovalRequired {
                            requests: requests.clone(),
                        },
                    );
                    return Ok(TurnOutcome::AwaitingApproval { requests });
                }
                other => {
                    if let Some(update) = tracker.observe(&mut state, other) {
                        self.sink.emit(&session_id, &update);
                    }
                }
            }
        }
    }

    async fn complete_turn(&self, mut state: SessionState, text: String) -> Result<TurnOutcome> {
        state.pending = None;
        if !state.history.close_open_turn(text.clone()) {
            warn!(session_id = %state.session_id, "Final message arrived without an open turn");
        }

        let before = state.history.len();
        state.history = prune(&state.history, self.config.max_turns);
        let evicted = before - state.history.len();
        if evicted > 0 {
            debug!(session_id = %state.session_id, evicted, "Pruned conversation history");
            state.evicted_turns += evicted;
        }

        state.touch();
        let session_id = state.session_id.clone();
        self.store.save(state).await?;

        self.sink
            .emit(&session_id, &StepUpdate::Completed { text: text.clone() });
        Ok(TurnOutcome::Completed { final_text: text })
    }

    /// Surface an error, leaving the session idle with no half-turn
    async fn fail_turn(&self, mut state: SessionState, error: SessionError) -> Result<TurnOutcome> {
        let session_id = state.session_id.clone();

        self.interrupts.clear(&session_id).await;
        state.pending = None;
        state.history.discard_open_turn();
        state.touch();
        self.store.save(state).await?;

        self.sink.emit(
            &session_id,
            &StepUpdate::Failed {
                error: error.to_string(),
            },
        );
        Err(error)
    }

    async fn abort_turn(&self, session_id: &str) -> Result<TurnOutcome> {
        let error = SessionError::ApprovalTimeout(format!(
            "no decision received for session {} within {}s",
            session_id,
            self.config.approval_timeout.as_secs()
        ));

        match self.store.load(session_id).await? {
            Some(state) => self.fail_turn(state, error).await,
            None => Err(error),
        }
    }
}
