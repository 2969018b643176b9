//! Scripted runtime for development & testing
//!
//! Keeps the session core functional without an LLM: every `start` or
//! `resume` call pops the next canned script and replays it as a stream.

use crate::error::SessionError;
use crate::models::{ActionRequest, Decision, ExecutionHandle};
use crate::runtime::{AgentRuntime, RunRequest, StepEvent, StepStream};
use crate::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Items replayed for one `start`/`resume` call
pub type Script = Vec<Result<StepEvent>>;

#[derive(Default)]
struct Recorded {
    scripts: VecDeque<Script>,
    starts: Vec<RunRequest>,
    resumes: Vec<(ExecutionHandle, Vec<Decision>)>,
}

/// Runtime that replays queued scripts and records what it was asked
#[derive(Clone, Default)]
pub struct ScriptedRuntime {
    inner: Arc<Mutex<Recorded>>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next script
    pub async fn push_script(&self, script: Script) {
        self.inner.lock().await.scripts.push_back(script);
    }

    /// Queue a script that answers immediately
    pub async fn push_reply(&self, text: &str) {
        self.push_script(vec![Ok(StepEvent::FinalMessage {
            text: text.to_string(),
        })])
        .await;
    }

    /// Queue a script that pauses for approval
    pub async fn push_interrupt(&self, handle: &str, requests: Vec<ActionRequest>) {
        self.push_script(vec![Ok(StepEvent::Interrupt {
            handle: ExecutionHandle(handle.to_string()),
            requests,
        })])
        .await;
    }

    /// Queue scripts from a JSON array of event arrays; returns how many
    pub async fn push_json(&self, json: &str) -> Result<usize> {
        let scripts: Vec<Vec<StepEvent>> = serde_json::from_str(json)?;
        let count = scripts.len();
        for script in scripts {
            self.push_script(script.into_iter().map(Ok).collect()).await;
        }
        Ok(count)
    }

    pub async fn start_requests(&self) -> Vec<RunRequest> {
        self.inner.lock().await.starts.clone()
    }

    pub async fn resume_calls(&self) -> Vec<(ExecutionHandle, Vec<Decision>)> {
        self.inner.lock().await.resumes.clone()
    }

    async fn next_script(&self) -> Result<StepStream> {
        let script = self
            .inner
            .lock()
            .await
            .scripts
            .pop_front()
            .ok_or_else(|| SessionError::Runtime("no script queued".to_string()))?;

        Ok(stream::iter(script).boxed())
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn start(&self, request: RunRequest) -> Result<StepStream> {
        self.inner.lock().await.starts.push(request);
        self.next_script().await
    }

    async fn resume(&self, handle: &ExecutionHandle, decisions: Vec<Decision>) -> Result<StepStream> {
        self.inner
            .lock()
            .await
            .resumes
            .push((handle.clone(), decisions));
        self.next_script().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn request(message: &str) -> RunRequest {
        RunRequest {
            session_id: "s1".to_string(),
            primer: None,
            context_notice: None,
            history: vec![],
            files: BTreeMap::new(),
            user_message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_replays_scripts_in_order() {
        let runtime = ScriptedRuntime::new();
        runtime.push_reply("first").await;
        runtime.push_reply("second").await;

        let mut stream = runtime.start(request("a")).await.unwrap();
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event, StepEvent::FinalMessage { text: "first".into() });
        assert!(stream.next().await.is_none());

        let handle = ExecutionHandle("h".into());
        let mut stream = runtime.resume(&handle, vec![Decision::Approve]).await.unwrap();
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event, StepEvent::FinalMessage { text: "second".into() });

        assert_eq!(runtime.start_requests().await.len(), 1);
        assert_eq!(runtime.resume_calls().await[0].1, vec![Decision::Approve]);
    }

    #[tokio::test]
    async fn test_empty_queue_is_runtime_error() {
        let runtime = ScriptedRuntime::new();
        let result = runtime.start(request("a")).await;
        assert!(matches!(result, Err(SessionError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_push_json_queues_each_script() {
        let runtime = ScriptedRuntime::new();
        let json = r#"[
            [{"type": "final_message", "text": "AAPL is $150.00"}],
            [{"type": "interrupt", "handle": "thread-1", "requests": [
                {"tool_name": "update_investment_holding", "arguments": {"ticker": "AAPL"}}
            ]}]
        ]"#;
        assert_eq!(runtime.push_json(json).await.unwrap(), 2);

        let mut stream = runtime.start(request("a")).await.unwrap();
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.name(), "final_message");

        let mut stream = runtime.start(request("b")).await.unwrap();
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.name(), "interrupt");

        assert!(matches!(
            runtime.push_json("{}").await,
            Err(SessionError::SerializationError(_))
        ));
    }
}
