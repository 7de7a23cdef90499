use chrono::Utc;
use sqlx::Row;

use helmsman_core::domain::thread::{ThreadHandle, ThreadId};

use super::{bounded, RepositoryError, ThreadRepository};
use crate::DbPool;

pub struct SqlThreadRepository {
    pool: DbPool,
}

impl SqlThreadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ThreadRepository for SqlThreadRepository {
    async fn create(&self, external_id: &ThreadId) -> Result<ThreadHandle, RepositoryError> {
        let result = bounded(
            "thread.create",
            sqlx::query("INSERT INTO thread (external_thread_id, created_at) VALUES (?, ?)")
                .bind(&external_id.0)
                .bind(Utc::now().to_rfc3339())
                .execute(&self.pool),
        )
        .await?;

        Ok(ThreadHandle::persisted(external_id.clone(), result.last_insert_rowid()))
    }

    async fn find_by_external_id(
        &self,
        external_id: &ThreadId,
    ) -> Result<Option<ThreadHandle>, RepositoryError> {
        let row = bounded(
            "thread.find_by_external_id",
            sqlx::query(
                "SELECT id FROM thread WHERE external_thread_id = ? ORDER BY id ASC LIMIT 1",
            )
            .bind(&external_id.0)
            .fetch_optional(&self.pool),
        )
        .await?;

        match row {
            Some(row) => {
                let id: i64 =
                    row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok(Some(ThreadHandle::persisted(external_id.clone(), id)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use helmsman_core::domain::thread::ThreadId;

    use super::SqlThreadRepository;
    use crate::repositories::ThreadRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlThreadRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlThreadRepository::new(pool)
    }

    #[tokio::test]
    async fn create_then_find_returns_persisted_handle() {
        let repo = setup().await;
        let external = ThreadId("thread_abc".to_string());

        let created = repo.create(&external).await.expect("create");
        let found = repo.find_by_external_id(&external).await.expect("find");

        assert!(created.is_persisted());
        assert_eq!(found, Some(created));
    }

    #[tokio::test]
    async fn unknown_external_id_is_absent() {
        let repo = setup().await;
        let found = repo
            .find_by_external_id(&ThreadId("thread_missing".to_string()))
            .await
            .expect("find");
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn duplicate_creates_resolve_to_oldest_row() {
        let repo = setup().await;
        let external = ThreadId("thread_dup".to_string());

        let first = repo.create(&external).await.expect("first create");
        let second = repo.create(&external).await.expect("second create");
        assert_ne!(first.internal_id, second.internal_id);

        let found = repo.find_by_external_id(&external).await.expect("find");
        assert_eq!(found, Some(first));
    }
}
