//! Slack Web API access.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;

use helmsman_core::config::SlackConfig;

use crate::format::reformat_reply;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SlackApiError {
    #[error("slack transport error: {0}")]
    Transport(String),
    #[error("slack method `{method}` failed: {error}")]
    Api { method: &'static str, error: String },
    #[error("could not decode slack response: {0}")]
    Decode(String),
}

/// Identity lookups used while resolving inbound events.
#[async_trait]
pub trait SlackDirectory: Send + Sync {
    async fn bot_name(&self, bot_id: &str, team_id: &str) -> Result<String, SlackApiError>;
    async fn user_name(&self, user_id: &str) -> Result<String, SlackApiError>;
}

#[async_trait]
pub trait SlackApi: SlackDirectory {
    /// Posts `text` as a threaded reply under `thread_ts`.
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: &str,
    ) -> Result<(), SlackApiError>;
}

pub struct HttpSlackClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
}

impl HttpSlackClient {
    pub fn new(config: &SlackConfig) -> Result<Self, SlackApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| SlackApiError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        })
    }

    async fn call(
        &self,
        method: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, SlackApiError> {
        let response = request
            .bearer_auth(self.bot_token.expose_secret())
            .send()
            .await
            .map_err(|err| SlackApiError::Transport(err.to_string()))?;
        let body: Value =
            response.json().await.map_err(|err| SlackApiError::Decode(err.to_string()))?;
        check_ok(method, body)
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }
}

/// Slack reports failures with `{"ok": false, "error": "..."}` and HTTP 200.
fn check_ok(method: &'static str, body: Value) -> Result<Value, SlackApiError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body);
    }
    let error = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error").to_string();
    Err(SlackApiError::Api { method, error })
}

fn name_at(body: &Value, pointer: &str) -> Result<String, SlackApiError> {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SlackApiError::Decode(format!("missing `{pointer}`")))
}

#[async_trait]
impl SlackDirectory for HttpSlackClient {
    async fn bot_name(&self, bot_id: &str, team_id: &str) -> Result<String, SlackApiError> {
        let mut query = vec![("bot", bot_id)];
        if !team_id.is_empty() {
            query.push(("team_id", team_id));
        }
        let body = self.call("bots.info", self.http.get(self.url("bots.info")).query(&query)).await?;
        name_at(&body, "/bot/name")
    }

    async fn user_name(&self, user_id: &str) -> Result<String, SlackApiError> {
        let body = self
            .call("users.info", self.http.get(self.url("users.info")).query(&[("user", user_id)]))
            .await?;
        name_at(&body, "/user/name")
    }
}

#[async_trait]
impl SlackApi for HttpSlackClient {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: &str,
    ) -> Result<(), SlackApiError> {
        let payload = json!({
            "channel": channel,
            "text": reformat_reply(text),
            "thread_ts": thread_ts,
            "mrkdwn": true,
        });
        self.call("chat.postMessage", self.http.post(self.url("chat.postMessage")).json(&payload))
            .await?;
        tracing::debug!(
            event_name = "slack.message.posted",
            channel,
            thread_ts,
            "posted slack reply"
        );
        Ok(())
    }
}
