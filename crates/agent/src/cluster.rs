//! Minimal Kubernetes API client used by the infrastructure capabilities.
//!
//! Requests are issued against raw API paths (`/api/v1/...`, `/apis/apps/v1/...`)
//! with a bearer token, which keeps the capability table free of typed
//! resource models.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;

use helmsman_core::config::ClusterConfig;

#[derive(Clone, Debug, Error)]
pub enum ClusterError {
    #[error("cluster request failed: {0}")]
    Transport(String),
    #[error("cluster returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("could not decode cluster response: {0}")]
    Decode(String),
    #[error("cluster client configuration error: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_json(&self, path: &str) -> Result<Value, ClusterError>;
    async fn get_text(&self, path: &str) -> Result<String, ClusterError>;
    async fn delete(&self, path: &str) -> Result<Value, ClusterError>;
    async fn merge_patch(&self, path: &str, body: &Value) -> Result<Value, ClusterError>;
}

pub struct HttpClusterClient {
    http: reqwest::Client,
    api_server: String,
    token: Option<SecretString>,
}

impl HttpClusterClient {
    pub async fn from_config(config: &ClusterConfig) -> Result<Self, ClusterError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs);

        if let Some(ca_file) = config.ca_file.as_deref().filter(|path| path.exists()) {
            let pem = tokio::fs::read(ca_file)
                .await
                .map_err(|err| ClusterError::Configuration(format!("{}: {err}", ca_file.display())))?;
            let certificate = reqwest::Certificate::from_pem(&pem)
                .map_err(|err| ClusterError::Configuration(err.to_string()))?;
            builder = builder.add_root_certificate(certificate);
        }

        let http = builder.build().map_err(|err| ClusterError::Configuration(err.to_string()))?;
        let token = match &config.token {
            Some(token) => Some(token.clone()),
            None => read_token_file(config.token_file.as_deref()).await?,
        };

        if token.is_none() {
            tracing::warn!(
                event_name = "agent.cluster.unauthenticated",
                api_server = %config.api_server,
                "no cluster token configured; requests will be anonymous"
            );
        }

        Ok(Self { http, api_server: config.api_server.trim_end_matches('/').to_string(), token })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self.http.request(method, format!("{}{}", self.api_server, path));
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, ClusterError> {
        let response =
            request.send().await.map_err(|err| ClusterError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|err| ClusterError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Err(ClusterError::Api { status: status.as_u16(), message: api_message(&body) });
        }
        Ok(body)
    }
}

async fn read_token_file(path: Option<&Path>) -> Result<Option<SecretString>, ClusterError> {
    let Some(path) = path.filter(|path| path.exists()) else {
        return Ok(None);
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| ClusterError::Configuration(format!("{}: {err}", path.display())))?;
    Ok(Some(raw.trim().to_string().into()))
}

/// Extracts `message` from a Kubernetes `Status` body, falling back to the raw text.
fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn decode(body: &str) -> Result<Value, ClusterError> {
    serde_json::from_str(body).map_err(|err| ClusterError::Decode(err.to_string()))
}

#[async_trait]
impl ClusterClient for HttpClusterClient {
    async fn get_json(&self, path: &str) -> Result<Value, ClusterError> {
        let body = self.send(self.request(reqwest::Method::GET, path)).await?;
        decode(&body)
    }

    async fn get_text(&self, path: &str) -> Result<String, ClusterError> {
        self.send(self.request(reqwest::Method::GET, path)).await
    }

    async fn delete(&self, path: &str) -> Result<Value, ClusterError> {
        let body = self.send(self.request(reqwest::Method::DELETE, path)).await?;
        decode(&body)
    }

    async fn merge_patch(&self, path: &str, body: &Value) -> Result<Value, ClusterError> {
        let request = self
            .request(reqwest::Method::PATCH, path)
            .header(reqwest::header::CONTENT_TYPE, "application/merge-patch+json")
            .body(body.to_string());
        let body = self.send(request).await?;
        decode(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::api_message;

    #[test]
    fn api_message_prefers_status_message() {
        let body = r#"{"kind":"Status","status":"Failure","message":"pods \"api-0\" not found","code":404}"#;
        assert_eq!(api_message(body), "pods \"api-0\" not found");
    }

    #[test]
    fn api_message_falls_back_to_raw_body() {
        assert_eq!(api_message("  upstream connect error \n"), "upstream connect error");
    }
}
