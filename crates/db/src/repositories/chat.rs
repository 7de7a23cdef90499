use chrono::{DateTime, Utc};
use sqlx::Row;

use helmsman_core::domain::chat::ChatRecord;

use super::{bounded, ChatRepository, RepositoryError, MAX_HISTORY_ROWS};
use crate::DbPool;

pub struct SqlChatRepository {
    pool: DbPool,
}

impl SqlChatRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_chat(row: &sqlx::sqlite::SqliteRow) -> Result<ChatRecord, RepositoryError> {
    let thread_id: i64 =
        row.try_get("thread_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let input: String = row.try_get("input").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let response: String =
        row.try_get("response").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ChatRecord { thread_id, input, response, created_at })
}

#[async_trait::async_trait]
impl ChatRepository for SqlChatRepository {
    async fn append(&self, record: ChatRecord) -> Result<(), RepositoryError> {
        bounded(
            "chat.append",
            sqlx::query(
                "INSERT INTO chat (thread_id, input, response, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(record.thread_id)
            .bind(&record.input)
            .bind(&record.response)
            .bind(record.created_at.to_rfc3339())
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn list_for_thread(&self, thread_id: i64) -> Result<Vec<ChatRecord>, RepositoryError> {
        let rows = bounded(
            "chat.list_for_thread",
            sqlx::query(
                "SELECT thread_id, input, response, created_at
                 FROM chat WHERE thread_id = ?
                 ORDER BY id ASC
                 LIMIT ?",
            )
            .bind(thread_id)
            .bind(MAX_HISTORY_ROWS)
            .fetch_all(&self.pool),
        )
        .await?;

        rows.iter().map(row_to_chat).collect::<Result<Vec<_>, _>>()
    }
}
