//! Finance Agent Session Core
//!
//! Sits between a chat client and a multi-agent runtime and owns:
//! - Conversation history, bounded to the last N turns
//! - Advisory token-budget estimation
//! - The human-in-the-loop interrupt/resume protocol
//! - Per-session turn control (one turn in flight per session)
//!
//! TURN LOOP:
//! SUBMIT → STREAM → INTERRUPT? → DECIDE → RESUME → FINALIZE

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod memory;
pub mod models;
pub mod runtime;
pub mod state;
pub mod tracker;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::{SessionController, SessionSeed};
pub use config::SessionConfig;
pub use error::{ErrorKind, SessionError};
