use std::sync::{Arc, OnceLock};

use regex::Regex;

use helmsman_core::domain::channel::ChannelEvent;

use crate::client::SlackDirectory;
use crate::payload::{EventEnvelope, MessageEvent};

const BOT_MESSAGE_SUBTYPE: &str = "bot_message";

static LEADING_MENTION: OnceLock<Option<Regex>> = OnceLock::new();

fn leading_mention() -> Option<&'static Regex> {
    LEADING_MENTION.get_or_init(|| Regex::new(r"^<@([^>|]+)(?:\|[^>]*)?>\s*").ok()).as_ref()
}

/// User id of a leading `<@U123>` token, if the text starts with one.
pub fn mentioned_user(text: &str) -> Option<&str> {
    leading_mention()?.captures(text)?.get(1).map(|m| m.as_str())
}

/// Removes a leading `<@U123>` token and the whitespace after it.
pub fn strip_mention(text: &str) -> String {
    match leading_mention() {
        Some(re) => re.replace(text, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Turns raw Slack deliveries into [`ChannelEvent`]s, resolving bot and user
/// identities against the directory.
pub struct EventResolver {
    directory: Arc<dyn SlackDirectory>,
    mention_name: String,
}

impl EventResolver {
    pub fn new(directory: Arc<dyn SlackDirectory>, mention_name: &str) -> Self {
        Self { directory, mention_name: mention_name.to_lowercase() }
    }

    pub async fn resolve(&self, envelope: &EventEnvelope) -> ChannelEvent {
        let event = &envelope.event;
        let is_bot = event.is_bot();

        let is_from_self = is_bot && self.is_own_bot(&event.bot_id, &envelope.team_id).await;
        let addresses_assistant = !is_bot && self.mentions_assistant(&event.text).await;

        ChannelEvent {
            event_id: if event.event_ts.is_empty() { event.ts.clone() } else { event.event_ts.clone() },
            thread_reference: (!event.thread_ts.is_empty()).then(|| event.thread_ts.clone()),
            sender_id: if is_bot { event.bot_id.clone() } else { event.user.clone() },
            text: event_text(event),
            is_from_self,
            is_bot,
            addresses_assistant,
            attachment_title: event.attachments.first().map(|attachment| attachment.title.clone()),
        }
    }

    /// Unresolvable bots are treated as our own so they never trigger a reply.
    async fn is_own_bot(&self, bot_id: &str, team_id: &str) -> bool {
        match self.directory.bot_name(bot_id, team_id).await {
            Ok(name) => name.to_lowercase().contains(&self.mention_name),
            Err(error) => {
                tracing::warn!(
                    event_name = "slack.event.bot_lookup_failed",
                    bot_id,
                    error = %error,
                    "could not resolve bot identity; ignoring event"
                );
                true
            }
        }
    }

    async fn mentions_assistant(&self, text: &str) -> bool {
        let Some(user_id) = mentioned_user(text) else {
            return false;
        };
        match self.directory.user_name(user_id).await {
            Ok(name) => name.to_lowercase().contains(&self.mention_name),
            Err(error) => {
                tracing::warn!(
                    event_name = "slack.event.user_lookup_failed",
                    user_id,
                    error = %error,
                    "could not resolve mentioned user"
                );
                false
            }
        }
    }
}

fn event_text(event: &MessageEvent) -> String {
    if event.text.is_empty() && event.subtype == BOT_MESSAGE_SUBTYPE {
        if let Some(attachment) = event.attachments.first() {
            return attachment.text.clone();
        }
    }
    event.text.clone()
}
