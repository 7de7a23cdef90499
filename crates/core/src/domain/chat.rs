use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed exchange, appended after a run reaches `completed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub thread_id: i64,
    pub input: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}
