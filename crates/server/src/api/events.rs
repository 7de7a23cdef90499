//! Slack Events API callback.
//!
//! The handler only checks the validation token and echoes the challenge;
//! correlation and the exchange itself run in a spawned task so Slack gets
//! its answer within the delivery timeout.

use std::sync::Arc;

use axum::{extract::State, Json};
use helmsman_agent::session::ConversationSession;
use helmsman_core::domain::thread::ThreadHandle;
use helmsman_core::errors::ApplicationError;
use helmsman_db::repositories::EventRepository;
use helmsman_slack::format::{ACKNOWLEDGEMENT, TECHNICAL_ERROR_MESSAGE};
use helmsman_slack::{Correlation, EventCorrelator, EventEnvelope, EventResolver, IgnoreReason, SlackApi};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::error::ApiError;
use super::ApiState;

const URL_VERIFICATION: &str = "url_verification";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChallengeResponse {
    pub challenge: String,
}

/// What happened to one delivery once processing finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackOutcome {
    Ignored(IgnoreReason),
    Answered(ThreadHandle),
    Failed,
}

pub struct SlackPipeline {
    validation_token: SecretString,
    resolver: EventResolver,
    correlator: EventCorrelator,
    slack: Arc<dyn SlackApi>,
    events: Arc<dyn EventRepository>,
}

impl SlackPipeline {
    pub fn new(
        validation_token: SecretString,
        resolver: EventResolver,
        correlator: EventCorrelator,
        slack: Arc<dyn SlackApi>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self { validation_token, resolver, correlator, slack, events }
    }

    /// An unset validation token rejects every delivery.
    pub fn accepts(&self, token: &str) -> bool {
        let expected = self.validation_token.expose_secret();
        !expected.is_empty() && expected == token
    }

    pub async fn process(&self, envelope: &EventEnvelope, session: ConversationSession) -> SlackOutcome {
        let event = self.resolver.resolve(envelope).await;
        let correlation = match self.correlator.correlate(&event).await {
            Ok(correlation) => correlation,
            Err(error) => {
                tracing::error!(
                    event_name = "api.slack.correlation_failed",
                    event_id = %event.event_id,
                    error = %error,
                    "could not correlate slack event"
                );
                return SlackOutcome::Failed;
            }
        };

        let (text, existing) = match correlation {
            Correlation::Ignore(reason) => return SlackOutcome::Ignored(reason),
            Correlation::FreshMention { text } => (text, None),
            Correlation::Continuation { text, thread } => (text, Some(thread)),
        };

        let channel = envelope.event.channel.as_str();
        let reply_ts = envelope.event.reply_ts();
        self.post(channel, ACKNOWLEDGEMENT, reply_ts).await;

        // Follow-ups carry the root `thread_ts`, so a mention inside a Slack
        // thread is linked under that root rather than its own timestamp.
        let link = event.thread_reference.as_deref().unwrap_or(&event.event_id);
        let thread = match existing {
            Some(thread) => thread,
            None => match session.start().await {
                Ok(thread) => {
                    if let Err(error) = self.events.record(link, &thread).await {
                        tracing::warn!(
                            event_name = "api.slack.event_not_persisted",
                            event_id = %event.event_id,
                            link,
                            thread_id = %thread.external_id,
                            error = %error,
                            "could not link slack event to thread; replies will start a new one"
                        );
                    }
                    thread
                }
                Err(error) => {
                    tracing::error!(
                        event_name = "api.slack.thread_start_failed",
                        event_id = %event.event_id,
                        error = %error,
                        "could not open conversation thread"
                    );
                    self.post(channel, TECHNICAL_ERROR_MESSAGE, reply_ts).await;
                    return SlackOutcome::Failed;
                }
            },
        };

        match session.advance(&text, &thread).await {
            Ok(answer) => {
                self.post(channel, &answer, reply_ts).await;
                SlackOutcome::Answered(thread)
            }
            Err(error) => {
                tracing::error!(
                    event_name = "api.slack.exchange_failed",
                    event_id = %event.event_id,
                    thread_id = %thread.external_id,
                    error = %error,
                    "exchange for slack event failed"
                );
                self.post(channel, TECHNICAL_ERROR_MESSAGE, reply_ts).await;
                SlackOutcome::Failed
            }
        }
    }

    async fn post(&self, channel: &str, text: &str, thread_ts: &str) {
        if let Err(error) = self.slack.post_message(channel, text, thread_ts).await {
            tracing::warn!(
                event_name = "api.slack.post_failed",
                channel,
                error = %error,
                "could not post slack message"
            );
        }
    }
}

pub async fn slack_event(
    State(state): State<ApiState>,
    Json(envelope): Json<EventEnvelope>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let Some(pipeline) = state.slack.clone() else {
        return Err(ApplicationError::NotFound("slack events are disabled".to_string()).into());
    };

    if !pipeline.accepts(&envelope.token) {
        tracing::warn!(event_name = "api.slack.invalid_token", team_id = %envelope.team_id, "invalid slack token");
        return Err(ApiError::bad_request("Invalid token"));
    }

    let challenge = ChallengeResponse { challenge: envelope.challenge.clone() };
    if envelope.kind != URL_VERIFICATION {
        let session = state.session(None);
        tokio::spawn(async move {
            let outcome = pipeline.process(&envelope, session).await;
            tracing::debug!(
                event_name = "api.slack.processed",
                event_id = %envelope.event_id,
                outcome = ?outcome,
                "slack event processed"
            );
        });
    }

    Ok(Json(challenge))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::http::StatusCode;
    use helmsman_agent::engine::{EngineCall, ScriptStep, ScriptedEngine};
    use helmsman_agent::session::{ConversationServices, ConversationSession};
    use helmsman_core::config::ApiConfig;
    use helmsman_core::domain::thread::ThreadId;
    use helmsman_db::repositories::{EventRepository, InMemoryEventRepository};
    use helmsman_slack::format::{ACKNOWLEDGEMENT, TECHNICAL_ERROR_MESSAGE};
    use helmsman_slack::{
        EventCorrelator, EventEnvelope, EventResolver, IgnoreReason, SlackApi, SlackApiError,
        SlackDirectory,
    };
    use secrecy::SecretString;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::{SlackOutcome, SlackPipeline};
    use crate::api::testing::{send, services, state};
    use crate::api::{router, ApiState};

    struct RecordingSlack {
        users: HashMap<String, String>,
        posts: Mutex<Vec<(String, String, String)>>,
    }

    impl RecordingSlack {
        fn new() -> Self {
            Self {
                users: HashMap::from([("U_HELM".to_string(), "helmsman".to_string())]),
                posts: Mutex::new(Vec::new()),
            }
        }

        async fn posts(&self) -> Vec<(String, String, String)> {
            self.posts.lock().await.clone()
        }
    }

    #[async_trait]
    impl SlackDirectory for RecordingSlack {
        async fn bot_name(&self, _bot_id: &str, _team_id: &str) -> Result<String, SlackApiError> {
            Ok("alertmanager".to_string())
        }

        async fn user_name(&self, user_id: &str) -> Result<String, SlackApiError> {
            self.users.get(user_id).cloned().ok_or_else(|| SlackApiError::Api {
                method: "users.info",
                error: "user_not_found".to_string(),
            })
        }
    }

    #[async_trait]
    impl SlackApi for RecordingSlack {
        async fn post_message(&self, channel: &str, text: &str, thread_ts: &str) -> Result<(), SlackApiError> {
            self.posts.lock().await.push((channel.to_string(), text.to_string(), thread_ts.to_string()));
            Ok(())
        }
    }

    fn pipeline(slack: Arc<RecordingSlack>, events: Arc<InMemoryEventRepository>) -> SlackPipeline {
        SlackPipeline::new(
            SecretString::from("verification-token".to_string()),
            EventResolver::new(slack.clone(), "helmsman"),
            EventCorrelator::new(events.clone()),
            slack,
            events,
        )
    }

    fn envelope(text: &str, ts: &str, thread_ts: &str) -> EventEnvelope {
        serde_json::from_value(json!({
            "token": "verification-token",
            "team_id": "T1",
            "type": "event_callback",
            "event_id": "Ev1",
            "event": {
                "type": "message",
                "user": "U_OPS",
                "text": text,
                "channel": "C1",
                "ts": ts,
                "event_ts": ts,
                "thread_ts": thread_ts
            }
        }))
        .expect("envelope")
    }

    fn session(services: &ConversationServices) -> ConversationSession {
        ConversationSession::new(services.clone(), "en", true)
    }

    #[tokio::test]
    async fn fresh_mention_acknowledges_and_replies_in_thread() {
        let slack = Arc::new(RecordingSlack::new());
        let events = Arc::new(InMemoryEventRepository::default());
        let pipeline = pipeline(slack.clone(), events.clone());
        let services = services(Arc::new(ScriptedEngine::default().with_reply("api restarted")));

        let outcome =
            pipeline.process(&envelope("<@U_HELM> why is api down?", "100.1", ""), session(&services)).await;

        let SlackOutcome::Answered(thread) = outcome else {
            panic!("expected an answer, got {outcome:?}");
        };
        assert_eq!(
            slack.posts().await,
            vec![
                ("C1".to_string(), ACKNOWLEDGEMENT.to_string(), "100.1".to_string()),
                ("C1".to_string(), "api restarted".to_string(), "100.1".to_string()),
            ]
        );
        assert_eq!(events.find("100.1").await.expect("lookup"), Some(thread));
    }

    #[tokio::test]
    async fn thread_reply_continues_the_linked_conversation() {
        let slack = Arc::new(RecordingSlack::new());
        let events = Arc::new(InMemoryEventRepository::default());
        let pipeline = pipeline(slack.clone(), events.clone());
        let engine = Arc::new(ScriptedEngine::default());
        let services = services(engine.clone());

        let first =
            pipeline.process(&envelope("<@U_HELM> why is api down?", "100.1", ""), session(&services)).await;
        let second = pipeline.process(&envelope("and the db?", "100.2", "100.1"), session(&services)).await;

        assert_eq!(first, second);
        let messages: Vec<ThreadId> = engine
            .calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::AddMessage { thread, .. } => Some(thread),
                _ => None,
            })
            .collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], messages[1]);
        assert_eq!(slack.posts().await.last().map(|post| post.2.clone()), Some("100.1".to_string()));
    }

    #[tokio::test]
    async fn mention_inside_an_unknown_slack_thread_links_the_thread_root() {
        let slack = Arc::new(RecordingSlack::new());
        let events = Arc::new(InMemoryEventRepository::default());
        let pipeline = pipeline(slack.clone(), events.clone());
        let services = services(Arc::new(ScriptedEngine::default()));

        let first = pipeline
            .process(&envelope("<@U_HELM> is this alert real?", "100.1", "50.0"), session(&services))
            .await;
        let SlackOutcome::Answered(thread) = first.clone() else {
            panic!("expected an answer, got {first:?}");
        };
        assert_eq!(events.find("50.0").await.expect("lookup"), Some(thread));
        assert_eq!(events.find("100.1").await.expect("lookup"), None);

        let follow_up =
            pipeline.process(&envelope("and the db?", "100.2", "50.0"), session(&services)).await;
        assert_eq!(follow_up, first);
        assert!(slack.posts().await.iter().all(|post| post.2 == "50.0"));
    }

    #[tokio::test]
    async fn failed_run_posts_technical_notice() {
        let slack = Arc::new(RecordingSlack::new());
        let pipeline = pipeline(slack.clone(), Arc::new(InMemoryEventRepository::default()));
        let services =
            services(Arc::new(ScriptedEngine::new(vec![ScriptStep::Fail("rate limited".to_string())])));

        let outcome = pipeline.process(&envelope("<@U_HELM> check pods", "200.1", ""), session(&services)).await;

        assert_eq!(outcome, SlackOutcome::Failed);
        assert_eq!(
            slack.posts().await.last().map(|post| post.1.clone()),
            Some(TECHNICAL_ERROR_MESSAGE.to_string())
        );
    }

    #[tokio::test]
    async fn unaddressed_message_is_ignored_silently() {
        let slack = Arc::new(RecordingSlack::new());
        let pipeline = pipeline(slack.clone(), Arc::new(InMemoryEventRepository::default()));
        let engine = Arc::new(ScriptedEngine::default());
        let services = services(engine.clone());

        let outcome = pipeline.process(&envelope("lunch anyone?", "300.1", ""), session(&services)).await;

        assert_eq!(outcome, SlackOutcome::Ignored(IgnoreReason::NotAddressed));
        assert!(slack.posts().await.is_empty());
        assert!(engine.calls().await.is_empty());
    }

    fn events_router(slack: Arc<RecordingSlack>) -> axum::Router {
        let state = ApiState {
            slack: Some(Arc::new(pipeline(slack, Arc::new(InMemoryEventRepository::default())))),
            ..state(services(Arc::new(ScriptedEngine::default())))
        };
        router(state, &ApiConfig { chat_enabled: false, events_enabled: true })
    }

    #[tokio::test]
    async fn invalid_token_is_rejected() {
        let (status, body) = send(
            events_router(Arc::new(RecordingSlack::new())),
            "POST",
            "/event/slack",
            Some(json!({"token": "forged", "type": "url_verification", "challenge": "abc"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
        assert_eq!(body["message"], "Invalid token");
    }

    #[tokio::test]
    async fn url_verification_echoes_challenge() {
        let slack = Arc::new(RecordingSlack::new());

        let (status, body) = send(
            events_router(slack.clone()),
            "POST",
            "/event/slack",
            Some(json!({"token": "verification-token", "type": "url_verification", "challenge": "abc"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"challenge": "abc"}));
        assert!(slack.posts().await.is_empty());
    }
}
