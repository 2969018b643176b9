//! Runtime configuration
//!
//! Defaults mirror the chat client's constants; every value can be
//! overridden through the environment (or a `.env` file).

use crate::error::SessionError;
use crate::runtime::RetryPolicy;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Keep last N turns
pub const MAX_CONVERSATION_TURNS: usize = 5;
/// Token warning threshold
pub const CONTEXT_WARNING_THRESHOLD: usize = 150_000;
pub const APPROVAL_TIMEOUT_SECS: u64 = 300;
pub const SESSION_TIMEOUT_HOURS: u64 = 24;
/// Tool results longer than this are cut for display
pub const TOOL_RESULT_PREVIEW_CHARS: usize = 1000;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_turns: usize,
    pub context_warning_tokens: usize,
    pub approval_timeout: Duration,
    pub session_idle_timeout: Duration,
    pub tool_result_preview_chars: usize,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: MAX_CONVERSATION_TURNS,
            context_warning_tokens: CONTEXT_WARNING_THRESHOLD,
            approval_timeout: Duration::from_secs(APPROVAL_TIMEOUT_SECS),
            session_idle_timeout: Duration::from_secs(SESSION_TIMEOUT_HOURS * 3600),
            tool_result_preview_chars: TOOL_RESULT_PREVIEW_CHARS,
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from the environment, falling back to defaults
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        if let Some(turns) = read_var::<usize>("MAX_CONVERSATION_TURNS")? {
            config.max_turns = turns;
        }
        if let Some(tokens) = read_var::<usize>("CONTEXT_WARNING_THRESHOLD")? {
            config.context_warning_tokens = tokens;
        }
        if let Some(secs) = read_var::<u64>("APPROVAL_TIMEOUT_SECS")? {
            config.approval_timeout = Duration::from_secs(secs);
        }
        if let Some(hours) = read_var::<u64>("SESSION_TIMEOUT_HOURS")? {
            config.session_idle_timeout = Duration::from_secs(hours * 3600);
        }
        if let Some(attempts) = read_var::<u32>("RUNTIME_MAX_RETRIES")? {
            config.retry.max_attempts = attempts;
        }

        debug!(?config, "Session configuration loaded");
        Ok(config)
    }
}

fn read_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SessionError::Config(format!("{} has invalid value '{}'", name, raw))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_turns, 5);
        assert_eq!(config.context_warning_tokens, 150_000);
        assert_eq!(config.approval_timeout, Duration::from_secs(300));
        assert_eq!(config.session_idle_timeout, Duration::from_secs(86_400));
    }

    #[test]
    fn test_read_var_rejects_garbage() {
        env::set_var("FAS_TEST_BAD_TURNS", "five");
        let result = read_var::<usize>("FAS_TEST_BAD_TURNS");
        assert!(matches!(result, Err(SessionError::Config(_))));
        env::remove_var("FAS_TEST_BAD_TURNS");
    }

    #[test]
    fn test_read_var_missing_is_none() {
        let result = read_var::<usize>("FAS_TEST_UNSET_VARIABLE").unwrap();
        assert!(result.is_none());
    }
}
