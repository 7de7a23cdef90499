use std::collections::HashMap;

use tokio::sync::RwLock;

use helmsman_core::domain::chat::ChatRecord;
use helmsman_core::domain::thread::{ThreadHandle, ThreadId};

use super::{
    ChatRepository, EventRepository, RepositoryError, ThreadRepository, MAX_HISTORY_ROWS,
};

#[derive(Default)]
pub struct InMemoryThreadRepository {
    rows: RwLock<Vec<ThreadHandle>>,
}

#[async_trait::async_trait]
impl ThreadRepository for InMemoryThreadRepository {
    async fn create(&self, external_id: &ThreadId) -> Result<ThreadHandle, RepositoryError> {
        let mut rows = self.rows.write().await;
        let handle = ThreadHandle::persisted(external_id.clone(), rows.len() as i64 + 1);
        rows.push(handle.clone());
        Ok(handle)
    }

    async fn find_by_external_id(
        &self,
        external_id: &ThreadId,
    ) -> Result<Option<ThreadHandle>, RepositoryError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|handle| &handle.external_id == external_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryEventRepository {
    events: RwLock<HashMap<String, ThreadHandle>>,
}

#[async_trait::async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn record(&self, event_id: &str, thread: &ThreadHandle) -> Result<(), RepositoryError> {
        if !thread.is_persisted() {
            return Err(RepositoryError::Decode(format!(
                "thread `{}` has not been persisted",
                thread.external_id
            )));
        }
        let mut events = self.events.write().await;
        events.entry(event_id.to_string()).or_insert_with(|| thread.clone());
        Ok(())
    }

    async fn find(&self, event_id: &str) -> Result<Option<ThreadHandle>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events.get(event_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryChatRepository {
    records: RwLock<Vec<ChatRecord>>,
}

#[async_trait::async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn append(&self, record: ChatRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.push(record);
        Ok(())
    }

    async fn list_for_thread(&self, thread_id: i64) -> Result<Vec<ChatRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|record| record.thread_id == thread_id)
            .take(MAX_HISTORY_ROWS as usize)
            .cloned()
            .collect())
    }
}
