//! Drives one run from creation to a final answer.
//!
//! The loop is iterative: every `requires_action` round dispatches the full
//! set of tool calls, submits them as one batch and keeps polling the run id
//! the engine hands back. Rounds and wall-clock time are both capped by
//! [`RunPolicy`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use helmsman_core::config::EngineConfig;
use helmsman_core::domain::run::{Run, RunId, RunStatus};
use helmsman_core::domain::thread::ThreadId;

use crate::context::ExecutionContext;
use crate::dispatcher::Dispatcher;
use crate::engine::{ConversationEngine, EngineError};
use crate::prompt::analysis_prompt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunPolicy {
    pub poll_interval: Duration,
    pub max_action_rounds: u32,
    pub deadline: Duration,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_action_rounds: 25,
            deadline: Duration::from_secs(300),
        }
    }
}

impl RunPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_action_rounds: config.max_action_rounds,
            deadline: Duration::from_secs(config.run_deadline_secs),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("run {run_id} failed: {reason}")]
    Failed { run_id: String, reason: String },
    #[error("run exceeded {0} tool-call rounds")]
    ActionRoundsExceeded(u32),
    #[error("run did not complete within {0:?}")]
    DeadlineExceeded(Duration),
    #[error("run was cancelled")]
    Cancelled,
}

pub struct RunDriver {
    engine: Arc<dyn ConversationEngine>,
    dispatcher: Dispatcher,
    policy: RunPolicy,
}

impl RunDriver {
    pub fn new(
        engine: Arc<dyn ConversationEngine>,
        dispatcher: Dispatcher,
        policy: RunPolicy,
    ) -> Self {
        Self { engine, dispatcher, policy }
    }

    pub fn policy(&self) -> RunPolicy {
        self.policy
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Posts `message` to `thread` and returns the assistant's answer once
    /// the resulting run completes.
    pub async fn exchange(
        &self,
        thread: &ThreadId,
        message: &str,
        language: &str,
        ctx: &ExecutionContext,
    ) -> Result<String, RunError> {
        let ctx = ctx.child(self.policy.deadline);

        self.engine.add_user_message(thread, &analysis_prompt(language, message)).await?;
        let mut run = self.engine.create_run(thread).await?;

        tracing::debug!(
            event_name = "agent.run.created",
            thread_id = %thread,
            run_id = run.id.as_str(),
            "run created"
        );

        let result = self.drive(thread, &mut run, &ctx).await;
        if let Err(
            RunError::ActionRoundsExceeded(_) | RunError::DeadlineExceeded(_) | RunError::Cancelled,
        ) = &result
        {
            self.abandon(thread, &run.id).await;
        }
        result
    }

    /// Polls `run` until it settles. `run` always holds the latest run the
    /// engine reported, so an interrupted run can still be cancelled.
    async fn drive(
        &self,
        thread: &ThreadId,
        run: &mut Run,
        ctx: &ExecutionContext,
    ) -> Result<String, RunError> {
        let mut rounds = 0_u32;

        loop {
            self.pause(ctx).await?;
            *run = self.engine.retrieve_run(thread, &run.id).await?;

            match run.status.clone() {
                RunStatus::Completed => {
                    let reply = self.engine.latest_reply(thread, &run.id).await?;
                    tracing::info!(
                        event_name = "agent.run.completed",
                        thread_id = %thread,
                        run_id = run.id.as_str(),
                        action_rounds = rounds,
                        "run completed"
                    );
                    return Ok(reply);
                }
                RunStatus::RequiresAction => {
                    rounds += 1;
                    if rounds > self.policy.max_action_rounds {
                        return Err(RunError::ActionRoundsExceeded(self.policy.max_action_rounds));
                    }
                    *run = self.answer_actions(thread, run, ctx).await?;
                }
                status if status.is_failure() => {
                    tracing::warn!(
                        event_name = "agent.run.failed",
                        thread_id = %thread,
                        run_id = run.id.as_str(),
                        status = status.as_str(),
                        "run ended without an answer"
                    );
                    return Err(RunError::Failed {
                        run_id: run.id.0.clone(),
                        reason: run.last_error.clone().unwrap_or_else(|| status.as_str().to_string()),
                    });
                }
                _ => {}
            }
        }
    }

    async fn answer_actions(
        &self,
        thread: &ThreadId,
        run: &Run,
        ctx: &ExecutionContext,
    ) -> Result<Run, RunError> {
        tracing::debug!(
            event_name = "agent.run.requires_action",
            thread_id = %thread,
            run_id = run.id.as_str(),
            tool_calls = run.required_action.len(),
            "dispatching tool calls"
        );
        let outputs = self.dispatcher.execute_all(ctx, &run.required_action).await;
        Ok(self.engine.submit_tool_outputs(thread, &run.id, &outputs).await?)
    }

    /// Best effort: a run left active blocks new messages on its thread.
    async fn abandon(&self, thread: &ThreadId, run: &RunId) {
        if let Err(error) = self.engine.cancel_run(thread, run).await {
            tracing::warn!(
                event_name = "agent.run.cancel_failed",
                thread_id = %thread,
                run_id = run.as_str(),
                error = %error,
                "could not cancel interrupted run"
            );
        }
    }

    /// Waits one poll interval, bounded by the remaining deadline.
    async fn pause(&self, ctx: &ExecutionContext) -> Result<(), RunError> {
        let interval = match ctx.remaining() {
            Some(remaining) if remaining.is_zero() => {
                return Err(RunError::DeadlineExceeded(self.policy.deadline));
            }
            Some(remaining) => self.policy.poll_interval.min(remaining),
            None => self.policy.poll_interval,
        };

        tokio::select! {
            _ = ctx.cancellation().cancelled() => Err(RunError::Cancelled),
            _ = tokio::time::sleep(interval) => Ok(()),
        }
    }
}
