use chrono::Utc;
use sqlx::Row;

use helmsman_core::domain::thread::{ThreadHandle, ThreadId};

use super::{bounded, EventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEventRepository {
    pool: DbPool,
}

impl SqlEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EventRepository for SqlEventRepository {
    async fn record(&self, event_id: &str, thread: &ThreadHandle) -> Result<(), RepositoryError> {
        let Some(thread_id) = thread.internal_id else {
            return Err(RepositoryError::Decode(format!(
                "thread `{}` has not been persisted",
                thread.external_id
            )));
        };

        bounded(
            "event.record",
            sqlx::query(
                "INSERT INTO event (id, thread_id, created_at) VALUES (?, ?, ?)
                 ON CONFLICT(id) DO NOTHING",
            )
            .bind(event_id)
            .bind(thread_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn find(&self, event_id: &str) -> Result<Option<ThreadHandle>, RepositoryError> {
        let row = bounded(
            "event.find",
            sqlx::query(
                "SELECT thread.id AS id, thread.external_thread_id AS external_thread_id
                 FROM event JOIN thread ON thread.id = event.thread_id
                 WHERE event.id = ?",
            )
            .bind(event_id)
            .fetch_optional(&self.pool),
        )
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let external: String = row
            .try_get("external_thread_id")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(Some(ThreadHandle::persisted(ThreadId(external), id)))
    }
}

#[cfg(test)]
mod tests {
    use helmsman_core::domain::thread::{ThreadHandle, ThreadId};

    use super::SqlEventRepository;
    use crate::repositories::{EventRepository, SqlThreadRepository, ThreadRepository};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn recorded_event_resolves_to_its_thread() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let threads = SqlThreadRepository::new(pool.clone());
        let events = SqlEventRepository::new(pool);

        let thread = threads.create(&ThreadId("thread_1".to_string())).await.expect("thread");
        events.record("1700000000.000100", &thread).await.expect("record");

        assert_eq!(events.find("1700000000.000100").await.expect("find"), Some(thread));
        assert_eq!(events.find("1700000000.999999").await.expect("find"), None);
    }

    #[tokio::test]
    async fn first_association_wins() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let threads = SqlThreadRepository::new(pool.clone());
        let events = SqlEventRepository::new(pool);

        let first = threads.create(&ThreadId("thread_a".to_string())).await.expect("thread a");
        let second = threads.create(&ThreadId("thread_b".to_string())).await.expect("thread b");
        events.record("evt-1", &first).await.expect("record first");
        events.record("evt-1", &second).await.expect("record second");

        assert_eq!(events.find("evt-1").await.expect("find"), Some(first));
    }

    #[tokio::test]
    async fn transient_thread_cannot_be_recorded() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let events = SqlEventRepository::new(pool);

        let transient = ThreadHandle::transient(ThreadId("thread_x".to_string()));
        assert!(events.record("evt-2", &transient).await.is_err());
    }
}
