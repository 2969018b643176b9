//! Error types for the session core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Error, Debug)]
pub enum SessionError {

    // =============================
    // Turn / Interrupt Protocol
    // =============================

    #[error("Session busy: {0}")]
    SessionBusy(String),

    #[error("Interrupt conflict: {0}")]
    Conflict(String),

    #[error("No pending interrupt: {0}")]
    NotFound(String),

    #[error("Decision count mismatch: expected {expected}, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("Decision not allowed: {0}")]
    DecisionNotAllowed(String),

    #[error("Incomplete turn: {0}")]
    IncompleteTurn(String),

    #[error("Approval timeout: {0}")]
    ApprovalTimeout(String),

    // =============================
    // Collaborators
    // =============================

    #[error("Transient runtime error: {0}")]
    RuntimeTransient(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Stable tag for an error, used in the `{error: kind}` outcome shape
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SessionBusy,
    Conflict,
    NotFound,
    Arity,
    DecisionNotAllowed,
    IncompleteTurn,
    ApprovalTimeout,
    RuntimeTransient,
    Runtime,
    Store,
    Config,
    Serialization,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::SessionBusy(_) => ErrorKind::SessionBusy,
            SessionError::Conflict(_) => ErrorKind::Conflict,
            SessionError::NotFound(_) => ErrorKind::NotFound,
            SessionError::Arity { .. } => ErrorKind::Arity,
            SessionError::DecisionNotAllowed(_) => ErrorKind::DecisionNotAllowed,
            SessionError::IncompleteTurn(_) => ErrorKind::IncompleteTurn,
            SessionError::ApprovalTimeout(_) => ErrorKind::ApprovalTimeout,
            SessionError::RuntimeTransient(_) => ErrorKind::RuntimeTransient,
            SessionError::Runtime(_) => ErrorKind::Runtime,
            SessionError::Store(_) => ErrorKind::Store,
            SessionError::Config(_) => ErrorKind::Config,
            SessionError::SerializationError(_) => ErrorKind::Serialization,
        }
    }

    /// Whether a retry policy may try the failed call again
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::RuntimeTransient(_))
    }
}
