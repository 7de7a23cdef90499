use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use helmsman_agent::session::SessionError;
use helmsman_core::errors::{ApplicationError, InterfaceError};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
    pub correlation_id: String,
}

/// Interface error rendered as `{code, message}`. Server-side failures carry
/// the generic user message; details only go to the log.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(ApplicationError::InvalidInput(message.into()).into_interface(correlation_id()))
    }
}

impl From<ApplicationError> for ApiError {
    fn from(value: ApplicationError) -> Self {
        Self(value.into_interface(correlation_id()))
    }
}

impl From<SessionError> for ApiError {
    fn from(value: SessionError) -> Self {
        ApplicationError::from(value).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let interface = self.0;
        let code = interface.status_code();
        let message = match &interface {
            InterfaceError::BadRequest { message, .. } | InterfaceError::NotFound { message, .. } => {
                message.clone()
            }
            InterfaceError::ServiceUnavailable { message, .. } | InterfaceError::Internal { message, .. } => {
                tracing::error!(
                    event_name = "api.request.failed",
                    correlation_id = %interface.correlation_id(),
                    status = code,
                    error = %message,
                    "request failed"
                );
                interface.user_message().to_string()
            }
        };

        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { code, message, correlation_id: interface.correlation_id().to_string() };
        (status, Json(body)).into_response()
    }
}

fn correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};
    use helmsman_agent::session::SessionError;

    use super::ApiError;

    #[tokio::test]
    async fn unknown_thread_renders_not_found_with_detail() {
        let response = ApiError::from(SessionError::UnknownThread("thread_x".to_string())).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["code"], 404);
        assert!(body["message"].as_str().expect("message").contains("thread_x"));
    }

    #[tokio::test]
    async fn engine_failures_hide_details() {
        let error = helmsman_agent::EngineError::Transport("connection reset by 10.0.0.7".to_string());
        let response = ApiError::from(SessionError::Engine(error)).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["message"], "The service is temporarily unavailable. Please retry shortly.");
    }
}
