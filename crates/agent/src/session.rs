//! Conversation sessions: thread lifecycle around the run loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use helmsman_core::config::{AppConfig, DEFAULT_LANGUAGE};
use helmsman_core::domain::chat::ChatRecord;
use helmsman_core::domain::thread::{ThreadHandle, ThreadId};
use helmsman_core::errors::ApplicationError;
use helmsman_db::repositories::{ChatRepository, RepositoryError, ThreadRepository};

use crate::capabilities::{CapabilityRegistry, RegistryError};
use crate::cluster::{ClusterError, HttpClusterClient};
use crate::context::ExecutionContext;
use crate::dispatcher::Dispatcher;
use crate::engine::{self, ConversationEngine, EngineError};
use crate::run_loop::{RunDriver, RunError, RunPolicy};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
    #[error("thread `{0}` does not exist")]
    UnknownThread(String),
}

impl From<SessionError> for ApplicationError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::Engine(err) | SessionError::Run(RunError::Engine(err)) => {
                Self::Engine(err.to_string())
            }
            SessionError::Run(err) => Self::RunFailed(err.to_string()),
            SessionError::Persistence(err) => Self::Persistence(err.to_string()),
            SessionError::UnknownThread(id) => Self::NotFound(format!("thread `{id}`")),
        }
    }
}

/// Failures while assembling [`ConversationServices`] from configuration.
#[derive(Debug, Error)]
pub enum ServicesError {
    #[error("capability registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("cluster client: {0}")]
    Cluster(#[from] ClusterError),
    #[error("conversation engine: {0}")]
    Engine(#[from] EngineError),
    #[error("capability http client: {0}")]
    Http(String),
}

/// Process-wide collaborators shared by every session.
#[derive(Clone)]
pub struct ConversationServices {
    pub engine: Arc<dyn ConversationEngine>,
    pub driver: Arc<RunDriver>,
    pub threads: Arc<dyn ThreadRepository>,
    pub chats: Arc<dyn ChatRepository>,
    pub context: ExecutionContext,
}

impl ConversationServices {
    pub fn new(
        engine: Arc<dyn ConversationEngine>,
        dispatcher: Dispatcher,
        policy: RunPolicy,
        threads: Arc<dyn ThreadRepository>,
        chats: Arc<dyn ChatRepository>,
        context: ExecutionContext,
    ) -> Self {
        let driver = Arc::new(RunDriver::new(Arc::clone(&engine), dispatcher, policy));
        Self { engine, driver, threads, chats, context }
    }

    /// Builds the capability set allowed by `config`, registers it with the
    /// configured engine and wires the cluster client. `cancel` is inherited
    /// by every exchange run through these services.
    pub async fn connect(
        config: &AppConfig,
        threads: Arc<dyn ThreadRepository>,
        chats: Arc<dyn ChatRepository>,
        cancel: CancellationToken,
    ) -> Result<Self, ServicesError> {
        let registry = CapabilityRegistry::builtin()?;
        let active = registry.active(&config.capabilities.permissions());
        let engine = engine::connect(&config.engine, active.tool_definitions()).await?;

        let cluster = HttpClusterClient::from_config(&config.cluster).await?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.cluster.timeout_secs))
            .build()
            .map_err(|err| ServicesError::Http(err.to_string()))?;
        let context = ExecutionContext::new(Arc::new(cluster), http).with_cancellation(cancel);

        tracing::info!(
            event_name = "agent.services.ready",
            registered = registry.len(),
            active = active.len(),
            flavour = ?config.engine.flavour,
            "conversation services assembled"
        );

        Ok(Self::new(
            engine,
            Dispatcher::new(active),
            RunPolicy::from_config(&config.engine),
            threads,
            chats,
            context,
        ))
    }
}

/// One logical conversation: a language preference and a persistence flag
/// bound to the shared services. Not shared across concurrent turns.
pub struct ConversationSession {
    services: ConversationServices,
    language: String,
    persist: bool,
}

impl ConversationSession {
    pub fn new(services: ConversationServices, language: &str, persist: bool) -> Self {
        let language = match language.trim() {
            "" => DEFAULT_LANGUAGE.to_string(),
            language => language.to_string(),
        };
        Self { services, language, persist }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn persists(&self) -> bool {
        self.persist
    }

    /// Opens a new engine thread. Every call creates a distinct thread.
    pub async fn start(&self) -> Result<ThreadHandle, SessionError> {
        let external_id = self.services.engine.create_thread().await?;
        if !self.persist {
            return Ok(ThreadHandle::transient(external_id));
        }

        let handle = self.services.threads.create(&external_id).await?;
        tracing::info!(
            event_name = "agent.session.thread_started",
            thread_id = %handle.external_id,
            "conversation thread created"
        );
        Ok(handle)
    }

    /// Runs one exchange on `thread`. A chat record is appended when the
    /// session persists; failing to store it does not discard the answer.
    pub async fn advance(&self, message: &str, thread: &ThreadHandle) -> Result<String, SessionError> {
        let answer = self
            .services
            .driver
            .exchange(&thread.external_id, message, &self.language, &self.services.context)
            .await?;

        if self.persist {
            self.record(message, &answer, thread).await;
        }
        Ok(answer)
    }

    async fn record(&self, input: &str, response: &str, thread: &ThreadHandle) {
        let Some(thread_id) = thread.internal_id else {
            tracing::warn!(
                event_name = "agent.session.chat_not_persisted",
                thread_id = %thread.external_id,
                "thread has no stored row; skipping chat record"
            );
            return;
        };

        let record = ChatRecord {
            thread_id,
            input: input.to_string(),
            response: response.to_string(),
            created_at: Utc::now(),
        };
        if let Err(error) = self.services.chats.append(record).await {
            tracing::warn!(
                event_name = "agent.session.chat_not_persisted",
                thread_id = %thread.external_id,
                error = %error,
                "failed to store chat record"
            );
        }
    }

    pub async fn resume(&self, external_id: &ThreadId) -> Result<ThreadHandle, SessionError> {
        self.services
            .threads
            .find_by_external_id(external_id)
            .await?
            .ok_or_else(|| SessionError::UnknownThread(external_id.to_string()))
    }

    pub async fn history(&self, external_id: &ThreadId) -> Result<Vec<ChatRecord>, SessionError> {
        let thread = self.resume(external_id).await?;
        match thread.internal_id {
            Some(id) => Ok(self.services.chats.list_for_thread(id).await?),
            None => Ok(Vec::new()),
        }
    }
}
