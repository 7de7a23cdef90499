//! Decides what an inbound channel event means for the conversation layer.
//!
//! Checks run in a fixed order: self-originated events, resolved
//! notifications, missing text, continuation of a stored thread, then fresh
//! mentions (or alerts posted by other bots). Anything else is ignored.

use std::sync::Arc;

use thiserror::Error;

use helmsman_core::domain::channel::ChannelEvent;
use helmsman_core::domain::thread::ThreadHandle;
use helmsman_db::repositories::{EventRepository, RepositoryError};

use crate::format::with_slack_directive;
use crate::resolver::strip_mention;

/// Attachment titles containing this marker announce that an alert cleared.
pub const RESOLVED_MARKER: &str = "RESOLVED";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    SelfOriginated,
    ResolvedNotification,
    NoText,
    NotAddressed,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfOriginated => "self_originated",
            Self::ResolvedNotification => "resolved_notification",
            Self::NoText => "no_text",
            Self::NotAddressed => "not_addressed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Correlation {
    Ignore(IgnoreReason),
    /// Start a new thread with `text`.
    FreshMention { text: String },
    /// Forward `text` to an existing thread.
    Continuation { text: String, thread: ThreadHandle },
}

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("thread lookup failed: {0}")]
    Persistence(#[from] RepositoryError),
}

pub struct EventCorrelator {
    events: Arc<dyn EventRepository>,
}

impl EventCorrelator {
    pub fn new(events: Arc<dyn EventRepository>) -> Self {
        Self { events }
    }

    pub async fn correlate(&self, event: &ChannelEvent) -> Result<Correlation, CorrelationError> {
        let correlation = self.classify(event).await?;
        match &correlation {
            Correlation::Ignore(reason) => tracing::debug!(
                event_name = "slack.event.ignored",
                event_id = %event.event_id,
                reason = reason.as_str(),
                "ignoring channel event"
            ),
            Correlation::FreshMention { .. } => tracing::info!(
                event_name = "slack.event.fresh_mention",
                event_id = %event.event_id,
                "channel event starts a new conversation"
            ),
            Correlation::Continuation { thread, .. } => tracing::info!(
                event_name = "slack.event.continuation",
                event_id = %event.event_id,
                thread_id = %thread.external_id,
                "channel event continues a conversation"
            ),
        }
        Ok(correlation)
    }

    async fn classify(&self, event: &ChannelEvent) -> Result<Correlation, CorrelationError> {
        if event.is_from_self {
            return Ok(Correlation::Ignore(IgnoreReason::SelfOriginated));
        }

        if event.attachment_title.as_deref().is_some_and(|title| title.contains(RESOLVED_MARKER)) {
            return Ok(Correlation::Ignore(IgnoreReason::ResolvedNotification));
        }

        let text = strip_mention(&event.text);
        if text.is_empty() {
            return Ok(Correlation::Ignore(IgnoreReason::NoText));
        }

        if let Some(reference) = event.thread_reference.as_deref() {
            if let Some(thread) = self.events.find(reference).await? {
                return Ok(Correlation::Continuation { text: with_slack_directive(&text), thread });
            }
        }

        if event.addresses_assistant || event.is_bot {
            return Ok(Correlation::FreshMention { text: with_slack_directive(&text) });
        }

        Ok(Correlation::Ignore(IgnoreReason::NotAddressed))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use helmsman_core::domain::channel::ChannelEvent;
    use helmsman_core::domain::thread::{ThreadHandle, ThreadId};
    use helmsman_db::repositories::{EventRepository, InMemoryEventRepository, RepositoryError};

    use super::{Correlation, CorrelationError, EventCorrelator, IgnoreReason};

    struct UnreachableEvents;

    #[async_trait]
    impl EventRepository for UnreachableEvents {
        async fn record(&self, _event_id: &str, _thread: &ThreadHandle) -> Result<(), RepositoryError> {
            Err(RepositoryError::Timeout("event.record"))
        }

        async fn find(&self, _event_id: &str) -> Result<Option<ThreadHandle>, RepositoryError> {
            Err(RepositoryError::Timeout("event.find"))
        }
    }

    async fn correlator_with_thread(event_id: &str) -> (EventCorrelator, ThreadHandle) {
        let events = Arc::new(InMemoryEventRepository::default());
        let thread = ThreadHandle::persisted(ThreadId("thread_1".to_string()), 1);
        events.record(event_id, &thread).await.expect("record");
        (EventCorrelator::new(events), thread)
    }

    fn mention(text: &str) -> ChannelEvent {
        ChannelEvent {
            event_id: "2.0".to_string(),
            sender_id: "U_ALICE".to_string(),
            text: text.to_string(),
            addresses_assistant: true,
            ..ChannelEvent::default()
        }
    }

    #[tokio::test]
    async fn self_originated_events_are_always_ignored() {
        let (correlator, _) = correlator_with_thread("1.0").await;
        let event = ChannelEvent {
            is_from_self: true,
            is_bot: true,
            thread_reference: Some("1.0".to_string()),
            ..mention("<@U_BOT> answer this")
        };

        let correlation = correlator.correlate(&event).await.expect("correlate");
        assert_eq!(correlation, Correlation::Ignore(IgnoreReason::SelfOriginated));
    }

    #[tokio::test]
    async fn resolved_notifications_are_ignored() {
        let (correlator, _) = correlator_with_thread("1.0").await;
        let event = ChannelEvent {
            is_bot: true,
            addresses_assistant: false,
            attachment_title: Some("[RESOLVED] KubePodCrashLooping".to_string()),
            ..mention("pod api-0 recovered")
        };

        let correlation = correlator.correlate(&event).await.expect("correlate");
        assert_eq!(correlation, Correlation::Ignore(IgnoreReason::ResolvedNotification));
    }

    #[tokio::test]
    async fn bare_mentions_carry_no_text() {
        let (correlator, _) = correlator_with_thread("1.0").await;
        let correlation = correlator.correlate(&mention("<@U_BOT>  ")).await.expect("correlate");
        assert_eq!(correlation, Correlation::Ignore(IgnoreReason::NoText));
    }

    #[tokio::test]
    async fn stored_thread_reference_continues_without_a_mention() {
        let (correlator, thread) = correlator_with_thread("1.0").await;
        let event = ChannelEvent {
            addresses_assistant: false,
            thread_reference: Some("1.0".to_string()),
            ..mention("and what about the database?")
        };

        let Correlation::Continuation { text, thread: resolved } =
            correlator.correlate(&event).await.expect("correlate")
        else {
            panic!("expected a continuation");
        };
        assert_eq!(resolved, thread);
        assert!(text.starts_with("and what about the database?."));
    }

    #[tokio::test]
    async fn fresh_mention_strips_the_mention_token() {
        let (correlator, _) = correlator_with_thread("1.0").await;
        let event = ChannelEvent {
            thread_reference: Some("9.9".to_string()),
            ..mention("<@U_BOT> why is checkout slow?")
        };

        let Correlation::FreshMention { text } =
            correlator.correlate(&event).await.expect("correlate")
        else {
            panic!("expected a fresh mention");
        };
        assert!(text.starts_with("why is checkout slow?."));
        assert!(!text.contains("<@U_BOT>"));
    }

    #[tokio::test]
    async fn third_party_alerts_start_conversations() {
        let (correlator, _) = correlator_with_thread("1.0").await;
        let event = ChannelEvent {
            is_bot: true,
            addresses_assistant: false,
            attachment_title: Some("[FIRING:1] KubePodCrashLooping".to_string()),
            ..mention("pod api-0 restarting")
        };

        let correlation = correlator.correlate(&event).await.expect("correlate");
        assert!(matches!(correlation, Correlation::FreshMention { .. }));
    }

    #[tokio::test]
    async fn unaddressed_human_chatter_is_ignored() {
        let (correlator, _) = correlator_with_thread("1.0").await;
        let event = ChannelEvent { addresses_assistant: false, ..mention("lunch?") };
        let correlation = correlator.correlate(&event).await.expect("correlate");
        assert_eq!(correlation, Correlation::Ignore(IgnoreReason::NotAddressed));
    }

    #[tokio::test]
    async fn lookup_failures_are_errors_not_ignores() {
        let correlator = EventCorrelator::new(Arc::new(UnreachableEvents));
        let event = ChannelEvent { thread_reference: Some("1.0".to_string()), ..mention("hi") };
        let err = correlator.correlate(&event).await.expect_err("lookup failure");
        assert!(matches!(err, CorrelationError::Persistence(RepositoryError::Timeout(_))));
    }
}
