//! Step tracking for display
//!
//! Folds the runtime's non-terminal step events into session state and
//! turns each one into a display update for whoever is watching the turn.

use crate::models::{ActionRequest, TodoItem};
use crate::runtime::StepEvent;
use crate::state::SessionState;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// What a watcher (CLI, WebSocket, log) is told about a turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepUpdate {
    Step {
        step_number: u32,
        node: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subagent: Option<String>,
    },
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        preview: String,
        success: bool,
    },
    TodoUpdate {
        todos: Vec<TodoItem>,
    },
    FileUpdate {
        paths: Vec<String>,
    },
    ApprovalRequired {
        requests: Vec<ActionRequest>,
    },
    Completed {
        text: String,
    },
    Failed {
        error: String,
    },
}

/// Receives display updates for a session
pub trait StepSink: Send + Sync {
    fn emit(&self, session_id: &str, update: &StepUpdate);
}

/// Logs every update through `tracing`
pub struct TracingSink;

impl StepSink for TracingSink {
    fn emit(&self, session_id: &str, update: &StepUpdate) {
        match update {
            StepUpdate::Step { step_number, node, .. } => {
                debug!(session_id = %session_id, step_number, node = %node, "Agent step");
            }
            StepUpdate::ToolCall { tool_name, .. } => {
                info!(session_id = %session_id, tool_name = %tool_name, "Tool call");
            }
            StepUpdate::ToolResult { tool_name, success, .. } => {
                debug!(session_id = %session_id, tool_name = %tool_name, success, "Tool result");
            }
            StepUpdate::TodoUpdate { todos } => {
                debug!(session_id = %session_id, todo_count = todos.len(), "Todo list updated");
            }
            StepUpdate::FileUpdate { paths } => {
                debug!(session_id = %session_id, ?paths, "Files updated");
            }
            StepUpdate::ApprovalRequired { requests } => {
                info!(session_id = %session_id, request_count = requests.len(), "Approval required");
            }
            StepUpdate::Completed { .. } => {
                info!(session_id = %session_id, "Turn completed");
            }
            StepUpdate::Failed { error } => {
                warn!(session_id = %session_id, error = %error, "Turn failed");
            }
        }
    }
}

/// Session-tagged update sent over a broadcast channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionUpdate {
    pub session_id: String,
    pub update: StepUpdate,
}

/// Fans updates out to any number of subscribers (e.g. WebSocket handlers)
pub struct BroadcastSink {
    sender: broadcast::Sender<SessionUpdate>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.sender.subscribe()
    }
}

impl StepSink for BroadcastSink {
    fn emit(&self, session_id: &str, update: &StepUpdate) {
        // No subscribers is fine
        let _ = self.sender.send(SessionUpdate {
            session_id: session_id.to_string(),
            update: update.clone(),
        });
    }
}

/// Per-stream fold over step events
pub struct StepTracker {
    step_count: u32,
    preview_chars: usize,
}

impl StepTracker {
    pub fn new(preview_chars: usize) -> Self {
        Self {
            step_count: 0,
            preview_chars,
        }
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    /// Apply a non-terminal event to the session and describe it
    ///
    /// Returns `None` for terminal events and for file updates that changed nothing.
    pub fn observe(&mut self, state: &mut SessionState, event: StepEvent) -> Option<StepUpdate> {
        match event {
            StepEvent::StepMarker { node, subagent } => {
                self.step_count += 1;
                Some(StepUpdate::Step {
                    step_number: self.step_count,
                    node,
                    subagent,
                })
            }
            StepEvent::ToolCall {
                call_id,
                tool_name,
                arguments,
            } => Some(StepUpdate::ToolCall {
                call_id,
                tool_name,
                arguments,
            }),
            StepEvent::ToolResult {
                call_id,
                tool_name,
                result,
                success,
            } => Some(StepUpdate::ToolResult {
                call_id,
                tool_name,
                preview: truncate_preview(&result, self.preview_chars),
                success,
            }),
            StepEvent::TodoUpdate { todos } => {
                state.todos = todos.clone();
                Some(StepUpdate::TodoUpdate { todos })
            }
            StepEvent::FileUpdate { files } => {
                let mut changed = Vec::new();
                for (path, content) in files {
                    if state.files.get(&path) != Some(&content) {
                        changed.push(path.clone());
                        state.files.insert(path, content);
                    }
                }
                if changed.is_empty() {
                    None
                } else {
                    Some(StepUpdate::FileUpdate { paths: changed })
                }
            }
            StepEvent::FinalMessage { .. } | StepEvent::Interrupt { .. } => None,
        }
    }
}

/// Cut long tool output for display
pub fn truncate_preview(content: &str, max_chars: usize) -> String {
    let total = content.chars().count();
    if total <= max_chars {
        return content.to_string();
    }
    let head: String = content.chars().take(max_chars).collect();
    format!("{}... ({} characters total)", head, total)
}
