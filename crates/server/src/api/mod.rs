//! Public HTTP routes.
//!
//! - `POST /chat`              - start a persisted conversation
//! - `GET  /chat/{id}`         - conversation history
//! - `POST /chat/{id}`         - continue a conversation
//! - `POST /chat/webhook`      - one conversation per distinct firing alert
//! - `POST /event/slack`       - Slack Events API callback
//!
//! Every accepted exchange runs in its own task; responses only point at the
//! thread that will hold the answer.

pub mod chat;
pub mod error;
pub mod events;
pub mod webhook;

use std::sync::Arc;

use axum::{routing::post, Router};
use helmsman_agent::session::{ConversationServices, ConversationSession};
use helmsman_core::config::ApiConfig;
use helmsman_core::domain::thread::ThreadHandle;
use serde::Serialize;

use self::events::SlackPipeline;

#[derive(Clone)]
pub struct ApiState {
    pub services: ConversationServices,
    pub slack: Option<Arc<SlackPipeline>>,
    /// Used when a request does not name a language.
    pub language: String,
}

impl ApiState {
    pub fn session(&self, language: Option<&str>) -> ConversationSession {
        let language = language.filter(|value| !value.trim().is_empty()).unwrap_or(&self.language);
        ConversationSession::new(self.services.clone(), language, true)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

pub fn router(state: ApiState, api: &ApiConfig) -> Router {
    let mut router = Router::new();

    if api.chat_enabled {
        router = router
            .route("/chat", post(chat::create_chat))
            .route("/chat/webhook", post(webhook::alertmanager_webhook))
            .route("/chat/{id}", post(chat::respond_chat).get(chat::fetch_chat));
    }

    if api.events_enabled && state.slack.is_some() {
        router = router.route("/event/slack", post(events::slack_event));
    }

    router.with_state(state)
}

/// Runs one exchange in the background. The outcome is only logged; callers
/// read the answer back through the thread history.
pub fn spawn_exchange(session: ConversationSession, message: String, thread: ThreadHandle, origin: &'static str) {
    tokio::spawn(async move {
        match session.advance(&message, &thread).await {
            Ok(_) => tracing::info!(
                event_name = "api.exchange.completed",
                origin,
                thread_id = %thread.external_id,
                "exchange completed"
            ),
            Err(error) => tracing::error!(
                event_name = "api.exchange.failed",
                origin,
                thread_id = %thread.external_id,
                error = %error,
                "exchange failed"
            ),
        }
    });
}
