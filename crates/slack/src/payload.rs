//! Wire shapes of the Slack Events API.

use serde::{Deserialize, Serialize};

/// Outer envelope posted to the events endpoint. Covers both
/// `url_verification` and `event_callback` deliveries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub challenge: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub event: MessageEvent,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub bot_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: String,
    #[serde(default)]
    pub event_ts: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
}

impl MessageEvent {
    pub fn is_bot(&self) -> bool {
        !self.bot_id.is_empty()
    }

    /// Timestamp replies should be threaded under.
    pub fn reply_ts(&self) -> &str {
        if self.thread_ts.is_empty() {
            &self.ts
        } else {
            &self.thread_ts
        }
    }
}
