//! Alertmanager webhook receiver.

use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use super::error::ApiError;
use super::{spawn_exchange, ApiState, MessageResponse};

const FIRING: &str = "firing";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerPayload {
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub group_key: String,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl Alert {
    pub fn is_firing(&self) -> bool {
        self.status == FIRING
    }

    pub fn problem(&self) -> String {
        format!("Summary: {}\nDescription: {}", self.annotation("summary"), self.annotation("description"))
    }

    fn annotation(&self, key: &str) -> &str {
        self.annotations.get(key).map(String::as_str).unwrap_or_default()
    }
}

/// Problem statements of the firing alerts, first occurrence wins.
pub fn distinct_problems(payload: &AlertmanagerPayload) -> Vec<String> {
    let mut problems: Vec<String> = Vec::new();
    for alert in payload.alerts.iter().filter(|alert| alert.is_firing()) {
        let problem = alert.problem();
        if problems.contains(&problem) {
            tracing::debug!(event_name = "api.webhook.duplicate_alert", "alert already queued in this delivery");
            continue;
        }
        problems.push(problem);
    }
    problems
}

pub async fn alertmanager_webhook(
    State(state): State<ApiState>,
    Json(payload): Json<AlertmanagerPayload>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let problems = distinct_problems(&payload);
    if problems.is_empty() {
        tracing::info!(
            event_name = "api.webhook.no_alerts",
            group_key = %payload.group_key,
            received = payload.alerts.len(),
            "no firing alerts to process"
        );
        return Ok((StatusCode::CREATED, Json(MessageResponse::new("no alerts to process"))));
    }

    tracing::info!(
        event_name = "api.webhook.received",
        group_key = %payload.group_key,
        receiver = %payload.receiver,
        received = payload.alerts.len(),
        distinct = problems.len(),
        "processing firing alerts"
    );

    for problem in problems {
        let session = state.session(None);
        let thread = session.start().await?;
        spawn_exchange(session, problem, thread, "webhook");
    }

    Ok((StatusCode::CREATED, Json(MessageResponse::new("alerts processed"))))
}
