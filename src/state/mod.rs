//! Session persistence layer
//!
//! Responsible for storing and loading per-session state.
//! Currently uses in-memory; a persistent store can sit behind the same trait.

use crate::interrupt::PendingInterrupt;
use crate::memory::ConversationHistory;
use crate::models::TodoItem;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Everything one conversation owns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub history: ConversationHistory,
    /// Agent working filesystem snapshot: virtual path → content
    pub files: BTreeMap<String, String>,
    /// Latest todo list reported by the agent
    #[serde(default)]
    pub todos: Vec<TodoItem>,
    /// Turns evicted by pruning since the session started
    #[serde(default)]
    pub evicted_turns: usize,
    #[serde(default)]
    pub auto_approve: bool,
    /// Snapshot of the interrupt this session is suspended on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingInterrupt>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            history: ConversationHistory::new(),
            files: BTreeMap::new(),
            todos: Vec::new(),
            evicted_turns: 0,
            auto_approve: false,
            pending: None,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Reset conversation, files and todos; settings survive
    pub fn reset(&mut self) {
        self.history.clear();
        self.files.clear();
        self.todos.clear();
        self.evicted_turns = 0;
        self.pending = None;
        self.touch();
    }

    pub fn is_idle(&self, idle_timeout: Duration) -> bool {
        (Utc::now() - self.last_activity)
            .to_std()
            .map_or(false, |idle| idle > idle_timeout)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            turn_count: self.history.len(),
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }
}

/// Metadata for listing sessions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub turn_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Trait for session persistence
///
/// A suspended session is saved with its `pending` interrupt, so a durable
/// store keeps approvals across restarts.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>>;
    async fn save(&self, state: SessionState) -> Result<()>;
    async fn delete(&self, session_id: &str) -> Result<bool>;
    async fn list(&self) -> Result<Vec<SessionSummary>>;
    /// Ids of sessions idle longer than `idle_timeout`, oldest activity first
    async fn idle_sessions(&self, idle_timeout: Duration) -> Result<Vec<String>>;

    async fn load_or_create(&self, session_id: &str) -> Result<SessionState> {
        match self.load(session_id).await? {
            Some(state) => Ok(state),
            None => {
                let state = SessionState::new(session_id);
                self.save(state.clone()).await?;
                Ok(state)
            }
        }
    }
}

/// In-memory session store for development
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionState>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn save(&self, state: SessionState) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(state.session_id.clone(), state);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(session_id).is_some())
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.read().await;

        let mut items: Vec<SessionSummary> =
            sessions.values().map(SessionState::summary).collect();

        // Sort by creation time ascending
        items.sort_by_key(|s| s.created_at);
        Ok(items)
    }

    async fn idle_sessions(&self, idle_timeout: Duration) -> Result<Vec<String>> {
        let sessions = self.sessions.read().await;

        let mut idle: Vec<&SessionState> = sessions
            .values()
            .filter(|s| s.is_idle(idle_timeout))
            .collect();
        idle.sort_by_key(|s| s.last_activity);

        Ok(idle.into_iter().map(|s| s.session_id.clone()).collect())
    }
}
