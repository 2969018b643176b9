//! Core data models shared by the session core

use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Approve,
    Reject,
    Edit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

//
// ================= Approval =================
//

fn default_allowed_decisions() -> Vec<DecisionKind> {
    vec![DecisionKind::Approve, DecisionKind::Reject]
}

/// A proposed tool invocation that needs a human decision before it runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRequest {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_allowed_decisions")]
    pub allowed_decisions: Vec<DecisionKind>,
}

impl ActionRequest {
    pub fn new(tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            description: None,
            allowed_decisions: default_allowed_decisions(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_allowed(mut self, allowed: Vec<DecisionKind>) -> Self {
        self.allowed_decisions = allowed;
        self
    }

    pub fn allows(&self, kind: DecisionKind) -> bool {
        self.allowed_decisions.contains(&kind)
    }
}

/// Human answer to one `ActionRequest`, in request order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
    Edit { modified_arguments: serde_json::Value },
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Approve => DecisionKind::Approve,
            Decision::Reject => DecisionKind::Reject,
            Decision::Edit { .. } => DecisionKind::Edit,
        }
    }
}

/// Opaque reference to a paused execution inside the agent runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ExecutionHandle(pub String);

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ================= Todos =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TodoItem {
    pub content: String,
    pub status: TodoStatus,
}

//
// ================= Turn Outcome =================
//

/// Successful result of driving a turn
///
/// Failures are returned as `Err(SessionError)`; `SessionError::kind` gives the
/// tag callers render as `{error: kind}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed { final_text: String },
    AwaitingApproval { requests: Vec<ActionRequest> },
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed { .. })
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionKind::Approve => "approve",
            DecisionKind::Reject => "reject",
            DecisionKind::Edit => "edit",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_request_defaults_to_approve_reject() {
        let request: ActionRequest = serde_json::from_value(serde_json::json!({
            "tool_name": "update_investment_holding",
            "arguments": {"ticker": "AAPL", "shares": 10}
        }))
        .unwrap();

        assert!(request.allows(DecisionKind::Approve));
        assert!(request.allows(DecisionKind::Reject));
        assert!(!request.allows(DecisionKind::Edit));
        assert!(request.description.is_none());
    }

    #[test]
    fn test_decision_wire_format() {
        let edit: Decision = serde_json::from_value(serde_json::json!({
            "type": "edit",
            "modified_arguments": {"shares": 5}
        }))
        .unwrap();
        assert_eq!(edit.kind(), DecisionKind::Edit);

        let approve = serde_json::to_value(Decision::Approve).unwrap();
        assert_eq!(approve, serde_json::json!({"type": "approve"}));
    }

    #[test]
    fn test_turn_outcome_tagging() {
        let outcome = TurnOutcome::Completed {
            final_text: "AAPL is $150.00".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(outcome.is_completed());
    }
}
