//! Retry wrapper for the agent runtime
//!
//! Exponential backoff around `start`/`resume` when the runtime reports an
//! upstream rate limit. A stream that fails mid-way is never replayed.

use crate::models::{Decision, ExecutionHandle};
use crate::runtime::{AgentRuntime, RunRequest, StepStream};
use crate::Result;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Multiplier for each subsequent wait
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let millis = self.base_delay.as_millis() as f64 * self.backoff_factor.powi((attempt - 1) as i32);
        let millis = millis.min(self.max_delay.as_millis() as f64) as u64;
        Duration::from_millis(millis)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(e) if e.is_transient() && self.should_retry(attempt) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Runtime call failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Decorates any runtime with a retry policy
pub struct RetryingRuntime<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R: AgentRuntime> RetryingRuntime<R> {
    pub fn new(inner: R, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: AgentRuntime> AgentRuntime for RetryingRuntime<R> {
    async fn start(&self, request: RunRequest) -> Result<StepStream> {
        self.policy
            .run("start", || self.inner.start(request.clone()))
            .await
    }

    async fn resume(&self, handle: &ExecutionHandle, decisions: Vec<Decision>) -> Result<StepStream> {
        self.policy
            .run("resume", || self.inner.resume(handle, decisions.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::runtime::StepEvent;
    use futures::stream::{self, StreamExt};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures_left: AtomicU32,
        calls: AtomicU32,
        transient: bool,
    }

    impl Flaky {
        fn new(failures: u32, transient: bool) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
                transient,
            }
        }

        fn attempt(&self) -> Result<StepStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(if self.transient {
                    SessionError::RuntimeTransient("429 Too Many Requests".into())
                } else {
                    SessionError::Runtime("bad request".into())
                });
            }
            Ok(stream::iter(vec![Ok(StepEvent::FinalMessage { text: "ok".into() })]).boxed())
        }
    }

    #[async_trait]
    impl AgentRuntime for Flaky {
        async fn start(&self, _request: RunRequest) -> Result<StepStream> {
            self.attempt()
        }

        async fn resume(&self, _handle: &ExecutionHandle, _decisions: Vec<Decision>) -> Result<StepStream> {
            self.attempt()
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(5),
        }
    }

    fn request() -> RunRequest {
        RunRequest {
            session_id: "s1".into(),
            primer: None,
            context_notice: None,
            history: vec![],
            files: BTreeMap::new(),
            user_message: "hi".into(),
        }
    }

    #[test]
    fn test_exponential_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(20), Duration::from_secs(60));
    }

    #[test]
    fn test_exhaustion_after_max_attempts() {
        let policy = RetryPolicy { max_attempts: 2, ..Default::default() };
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!RetryPolicy::none().should_retry(1));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let runtime = RetryingRuntime::new(Flaky::new(2, true), fast_policy(3));
        assert!(runtime.start(request()).await.is_ok());
        assert_eq!(runtime.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let runtime = RetryingRuntime::new(Flaky::new(5, true), fast_policy(2));
        let handle = ExecutionHandle("h".into());
        let result = runtime.resume(&handle, vec![]).await;
        assert!(matches!(result, Err(SessionError::RuntimeTransient(_))));
        assert_eq!(runtime.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_transient_is_not_retried() {
        let runtime = RetryingRuntime::new(Flaky::new(1, false), fast_policy(3));
        assert!(runtime.start(request()).await.is_err());
        assert_eq!(runtime.inner().calls.load(Ordering::SeqCst), 1);
    }
}
