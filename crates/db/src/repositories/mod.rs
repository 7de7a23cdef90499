use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use helmsman_core::domain::chat::ChatRecord;
use helmsman_core::domain::thread::{ThreadHandle, ThreadId};

pub mod chat;
pub mod event;
pub mod memory;
pub mod thread;

pub use chat::SqlChatRepository;
pub use event::SqlEventRepository;
pub use memory::{InMemoryChatRepository, InMemoryEventRepository, InMemoryThreadRepository};
pub use thread::SqlThreadRepository;

/// Upper bound applied to every SQL statement issued by the gateway.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum number of chat records returned for one thread.
pub const MAX_HISTORY_ROWS: i64 = 1000;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("database operation `{0}` timed out")]
    Timeout(&'static str),
}

pub(crate) async fn bounded<T, F>(operation: &'static str, future: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, future).await {
        Ok(result) => result.map_err(RepositoryError::from),
        Err(_) => {
            tracing::warn!(
                event_name = "db.query.timeout",
                operation,
                timeout_secs = QUERY_TIMEOUT.as_secs(),
                "database operation exceeded its time budget"
            );
            Err(RepositoryError::Timeout(operation))
        }
    }
}

#[async_trait]
pub trait ThreadRepository: Send + Sync {
    /// Writes a new thread row. Duplicate external ids are tolerated.
    async fn create(&self, external_id: &ThreadId) -> Result<ThreadHandle, RepositoryError>;

    /// Returns the oldest row for `external_id`.
    async fn find_by_external_id(
        &self,
        external_id: &ThreadId,
    ) -> Result<Option<ThreadHandle>, RepositoryError>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Associates a channel event marker with a persisted thread. The first
    /// association for an event id wins.
    async fn record(&self, event_id: &str, thread: &ThreadHandle) -> Result<(), RepositoryError>;

    async fn find(&self, event_id: &str) -> Result<Option<ThreadHandle>, RepositoryError>;
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn append(&self, record: ChatRecord) -> Result<(), RepositoryError>;

    /// Chat records of a thread in insertion order, capped at [`MAX_HISTORY_ROWS`].
    async fn list_for_thread(&self, thread_id: i64) -> Result<Vec<ChatRecord>, RepositoryError>;
}
