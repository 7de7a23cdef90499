use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use helmsman_core::domain::thread::ThreadId;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::{spawn_exchange, ApiState, MessageResponse};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatEntry {
    pub input: String,
    pub response: String,
}

pub async fn create_chat(
    State(state): State<ApiState>,
    Json(body): Json<ChatRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let message = required_message(&body)?;
    let session = state.session(body.language.as_deref());
    let thread = session.start().await?;
    let location = thread_location(&thread.external_id);

    spawn_exchange(session, message, thread, "chat");
    Ok((StatusCode::CREATED, Json(MessageResponse::new(location))))
}

pub async fn respond_chat(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<ChatRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let message = required_message(&body)?;
    let session = state.session(body.language.as_deref());
    let thread = session.resume(&ThreadId(id)).await?;
    let location = thread_location(&thread.external_id);

    spawn_exchange(session, message, thread, "chat");
    Ok((StatusCode::CREATED, Json(MessageResponse::new(location))))
}

pub async fn fetch_chat(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<Vec<ChatEntry>>, ApiError> {
    let records = state.session(None).history(&ThreadId(id)).await?;
    Ok(Json(
        records
            .into_iter()
            .map(|record| ChatEntry { input: record.input, response: record.response })
            .collect(),
    ))
}

fn required_message(body: &ChatRequest) -> Result<String, ApiError> {
    match body.message.trim() {
        "" => Err(ApiError::bad_request("message must not be empty")),
        message => Ok(message.to_string()),
    }
}

fn thread_location(thread: &ThreadId) -> String {
    format!("/chat/{thread}")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use helmsman_agent::engine::{EngineCall, ScriptedEngine};
    use helmsman_agent::session::ConversationSession;
    use serde_json::json;

    use crate::api::testing::{chat_router, send, services, state};

    #[tokio::test]
    async fn create_chat_returns_thread_location() {
        let engine = Arc::new(ScriptedEngine::default());
        let router = chat_router(state(services(engine.clone())));

        let (status, body) =
            send(router, "POST", "/chat", Some(json!({"message": "why is api slow?"}))).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "/chat/thread_1");
        assert!(engine.calls().await.contains(&EngineCall::CreateThread(
            helmsman_core::domain::thread::ThreadId("thread_1".to_string())
        )));
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let router = chat_router(state(services(Arc::new(ScriptedEngine::default()))));

        let (status, body) = send(router, "POST", "/chat", Some(json!({"message": "  "}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
    }

    #[tokio::test]
    async fn history_lists_completed_exchanges() {
        let services = services(Arc::new(ScriptedEngine::default().with_reply("restart the pod")));
        let session = ConversationSession::new(services.clone(), "en", true);
        let thread = session.start().await.expect("start");
        session.advance("pod x is crashlooping", &thread).await.expect("advance");

        let (status, body) = send(
            chat_router(state(services)),
            "GET",
            &format!("/chat/{}", thread.external_id),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"input": "pod x is crashlooping", "response": "restart the pod"}]));
    }

    #[tokio::test]
    async fn unknown_thread_returns_not_found() {
        let services = services(Arc::new(ScriptedEngine::default()));

        let (status, _) = send(chat_router(state(services.clone())), "GET", "/chat/thread_missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            chat_router(state(services)),
            "POST",
            "/chat/thread_missing",
            Some(json!({"message": "still broken?"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);
    }

    #[tokio::test]
    async fn respond_chat_accepts_known_thread() {
        let services = services(Arc::new(ScriptedEngine::default()));
        let thread = ConversationSession::new(services.clone(), "en", true).start().await.expect("start");

        let (status, body) = send(
            chat_router(state(services)),
            "POST",
            &format!("/chat/{}", thread.external_id),
            Some(json!({"message": "and now?", "language": "fr"})),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], format!("/chat/{}", thread.external_id));
    }
}
