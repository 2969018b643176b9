//! Agent runtime seam
//!
//! The runtime (LLM graph, tools, subagents) is an external collaborator. The
//! session core only sees a lazy, finite, non-restartable stream of typed
//! step events with one suspension point: `StepEvent::Interrupt`.

use crate::memory::ConversationTurn;
use crate::models::{ActionRequest, Decision, ExecutionHandle, TodoItem};
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod retry;
pub mod scripted;

pub use retry::{RetryPolicy, RetryingRuntime};
pub use scripted::ScriptedRuntime;

/// One step emitted by the runtime while a turn executes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEvent {
    /// A graph node (main agent, tool executor, subagent) started work
    StepMarker {
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
        result: String,
        success: bool,
    },
    TodoUpdate {
        todos: Vec<TodoItem>,
    },
    /// Files written by the agent: virtual path → content
    FileUpdate {
        files: BTreeMap<String, String>,
    },
    FinalMessage {
        text: String,
    },
    Interrupt {
        handle: ExecutionHandle,
        requests: Vec<ActionRequest>,
    },
}

impl StepEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StepEvent::StepMarker { .. } => "step_marker",
            StepEvent::ToolCall { .. } => "tool_call",
            StepEvent::ToolResult { .. } => "tool_result",
            StepEvent::TodoUpdate { .. } => "todo_update",
            StepEvent::FileUpdate { .. } => "file_update",
            StepEvent::FinalMessage { .. } => "final_message",
            StepEvent::Interrupt { .. } => "interrupt",
        }
    }
}

/// Stream of step events; an `Err` item ends the turn
pub type StepStream = BoxStream<'static, Result<StepEvent>>;

/// Input for a fresh execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primer: Option<String>,
    /// Set once older turns have been pruned away
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_notice: Option<String>,
    /// Completed turns preceding the new message
    pub history: Vec<ConversationTurn>,
    pub files: BTreeMap<String, String>,
    pub user_message: String,
}

/// Trait for the agent execution backend
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Begin executing a new user message
    async fn start(&self, request: RunRequest) -> Result<StepStream>;

    /// Continue a paused execution with one decision per pending request
    async fn resume(&self, handle: &ExecutionHandle, decisions: Vec<Decision>) -> Result<StepStream>;
}
