//! Deterministic engine for tests and offline runs.
//!
//! Each `retrieve_run` consumes one [`ScriptStep`]; once the script is
//! exhausted runs report `completed` and `latest_reply` returns the
//! configured reply.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use helmsman_core::domain::run::{Run, RunId, RunStatus, ToolCall, ToolOutput};
use helmsman_core::domain::thread::ThreadId;

use super::{ConversationEngine, EngineError};

#[derive(Clone, Debug)]
pub enum ScriptStep {
    Status(RunStatus),
    Action(Vec<ToolCall>),
    Fail(String),
    TransportError(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineCall {
    CreateThread(ThreadId),
    AddMessage { thread: ThreadId, content: String },
    CreateRun { thread: ThreadId, run: RunId },
    RetrieveRun { thread: ThreadId, run: RunId },
    SubmitToolOutputs { thread: ThreadId, run: RunId, outputs: Vec<ToolOutput> },
    CancelRun { thread: ThreadId, run: RunId },
    LatestReply { thread: ThreadId, run: RunId },
}

#[derive(Debug)]
pub struct ScriptedEngine {
    steps: Mutex<VecDeque<ScriptStep>>,
    reply: String,
    calls: Mutex<Vec<EngineCall>>,
    sequence: AtomicU64,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ScriptedEngine {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            reply: "done".to_string(),
            calls: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = reply.into();
        self
    }

    /// Appends steps for a later exchange on the same engine.
    pub async fn push_steps(&self, steps: Vec<ScriptStep>) {
        self.steps.lock().await.extend(steps);
    }

    pub async fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().await.clone()
    }

    pub async fn submitted_batches(&self) -> Vec<Vec<ToolOutput>> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                EngineCall::SubmitToolOutputs { outputs, .. } => Some(outputs.clone()),
                _ => None,
            })
            .collect()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn record(&self, call: EngineCall) {
        self.calls.lock().await.push(call);
    }
}

fn run(id: RunId, thread: &ThreadId, status: RunStatus) -> Run {
    Run { id, thread_id: thread.clone(), status, required_action: Vec::new(), last_error: None }
}

#[async_trait]
impl ConversationEngine for ScriptedEngine {
    async fn create_thread(&self) -> Result<ThreadId, EngineError> {
        let thread = ThreadId(self.next_id("thread"));
        self.record(EngineCall::CreateThread(thread.clone())).await;
        Ok(thread)
    }

    async fn add_user_message(&self, thread: &ThreadId, content: &str) -> Result<(), EngineError> {
        self.record(EngineCall::AddMessage { thread: thread.clone(), content: content.to_string() })
            .await;
        Ok(())
    }

    async fn create_run(&self, thread: &ThreadId) -> Result<Run, EngineError> {
        let id = RunId(self.next_id("run"));
        self.record(EngineCall::CreateRun { thread: thread.clone(), run: id.clone() }).await;
        Ok(run(id, thread, RunStatus::Queued))
    }

    async fn retrieve_run(&self, thread: &ThreadId, run_id: &RunId) -> Result<Run, EngineError> {
        self.record(EngineCall::RetrieveRun { thread: thread.clone(), run: run_id.clone() }).await;

        let step = self.steps.lock().await.pop_front();
        match step {
            None => Ok(run(run_id.clone(), thread, RunStatus::Completed)),
            Some(ScriptStep::Status(status)) => Ok(run(run_id.clone(), thread, status)),
            Some(ScriptStep::Action(calls)) => Ok(Run {
                required_action: calls,
                ..run(run_id.clone(), thread, RunStatus::RequiresAction)
            }),
            Some(ScriptStep::Fail(reason)) => Ok(Run {
                last_error: Some(reason),
                ..run(run_id.clone(), thread, RunStatus::Failed)
            }),
            Some(ScriptStep::TransportError(message)) => Err(EngineError::Transport(message)),
        }
    }

    async fn submit_tool_outputs(
        &self,
        thread: &ThreadId,
        run_id: &RunId,
        outputs: &[ToolOutput],
    ) -> Result<Run, EngineError> {
        self.record(EngineCall::SubmitToolOutputs {
            thread: thread.clone(),
            run: run_id.clone(),
            outputs: outputs.to_vec(),
        })
        .await;
        Ok(run(RunId(self.next_id("run")), thread, RunStatus::Queued))
    }

    async fn cancel_run(&self, thread: &ThreadId, run_id: &RunId) -> Result<(), EngineError> {
        self.record(EngineCall::CancelRun { thread: thread.clone(), run: run_id.clone() }).await;
        Ok(())
    }

    async fn latest_reply(&self, thread: &ThreadId, run_id: &RunId) -> Result<String, EngineError> {
        self.record(EngineCall::LatestReply { thread: thread.clone(), run: run_id.clone() }).await;
        if self.reply.is_empty() {
            return Err(EngineError::EmptyReply(run_id.as_str().to_string()));
        }
        Ok(self.reply.clone())
    }
}
