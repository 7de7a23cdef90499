//! The thread/run protocol spoken by the external conversation engine.
//!
//! The backend is chosen once at startup by [`connect`]; everything above
//! this module only sees `Arc<dyn ConversationEngine>`.

mod assistants;
mod scripted;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use helmsman_core::config::EngineConfig;
use helmsman_core::domain::run::{Run, RunId, ToolOutput};
use helmsman_core::domain::thread::ThreadId;

use crate::capabilities::ToolDefinition;

pub use assistants::AssistantsEngine;
pub use scripted::{EngineCall, ScriptStep, ScriptedEngine};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine transport error: {0}")]
    Transport(String),
    #[error("engine returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode engine response: {0}")]
    Decode(String),
    #[error("engine produced no reply for run {0}")]
    EmptyReply(String),
    #[error("engine configuration error: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait ConversationEngine: Send + Sync {
    async fn create_thread(&self) -> Result<ThreadId, EngineError>;

    async fn add_user_message(&self, thread: &ThreadId, content: &str) -> Result<(), EngineError>;

    async fn create_run(&self, thread: &ThreadId) -> Result<Run, EngineError>;

    async fn retrieve_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run, EngineError>;

    /// Submits one output per outstanding tool call. The engine may answer with
    /// a different run id, which the caller must continue polling.
    async fn submit_tool_outputs(
        &self,
        thread: &ThreadId,
        run: &RunId,
        outputs: &[ToolOutput],
    ) -> Result<Run, EngineError>;

    /// Stops a run that is still queued, in progress or waiting for tool
    /// outputs, so the thread accepts new messages again.
    async fn cancel_run(&self, thread: &ThreadId, run: &RunId) -> Result<(), EngineError>;

    /// Text of the newest assistant message produced by `run`.
    async fn latest_reply(&self, thread: &ThreadId, run: &RunId) -> Result<String, EngineError>;
}

/// Builds the configured engine and makes sure its assistant advertises `tools`.
pub async fn connect(
    config: &EngineConfig,
    tools: Vec<ToolDefinition>,
) -> Result<Arc<dyn ConversationEngine>, EngineError> {
    let engine = AssistantsEngine::connect(config, tools).await?;
    Ok(Arc::new(engine))
}
