use serde::{Deserialize, Serialize};

/// Opaque thread identifier issued by the conversation engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A conversation thread as seen by the orchestration layer.
///
/// `internal_id` is only present once the thread has been written through the
/// persistence gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadHandle {
    pub external_id: ThreadId,
    pub internal_id: Option<i64>,
}

impl ThreadHandle {
    pub fn transient(external_id: ThreadId) -> Self {
        Self { external_id, internal_id: None }
    }

    pub fn persisted(external_id: ThreadId, internal_id: i64) -> Self {
        Self { external_id, internal_id: Some(internal_id) }
    }

    pub fn is_persisted(&self) -> bool {
        self.internal_id.is_some()
    }
}
