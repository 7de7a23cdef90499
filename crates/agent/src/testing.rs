use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::cluster::{ClusterClient, ClusterError};
use crate::context::ExecutionContext;

#[derive(Clone, Debug, PartialEq)]
pub enum ClusterCall {
    Get(String),
    Delete(String),
    Patch(String, Value),
}

/// Cluster fake answering every request with one canned response.
pub struct RecordingCluster {
    response: Result<Value, ClusterError>,
    text: Option<String>,
    calls: Mutex<Vec<ClusterCall>>,
}

impl RecordingCluster {
    pub fn with_json(value: Value) -> Self {
        Self { response: Ok(value), text: None, calls: Mutex::new(Vec::new()) }
    }

    pub fn with_text(text: &str) -> Self {
        Self { response: Ok(Value::Null), text: Some(text.to_string()), calls: Mutex::new(Vec::new()) }
    }

    pub fn failing(error: ClusterError) -> Self {
        Self { response: Err(error), text: None, calls: Mutex::new(Vec::new()) }
    }

    pub async fn calls(&self) -> Vec<ClusterCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ClusterClient for RecordingCluster {
    async fn get_json(&self, path: &str) -> Result<Value, ClusterError> {
        self.calls.lock().await.push(ClusterCall::Get(path.to_string()));
        self.response.clone()
    }

    async fn get_text(&self, path: &str) -> Result<String, ClusterError> {
        self.calls.lock().await.push(ClusterCall::Get(path.to_string()));
        self.response.clone()?;
        Ok(self.text.clone().unwrap_or_default())
    }

    async fn delete(&self, path: &str) -> Result<Value, ClusterError> {
        self.calls.lock().await.push(ClusterCall::Delete(path.to_string()));
        self.response.clone()
    }

    async fn merge_patch(&self, path: &str, body: &Value) -> Result<Value, ClusterError> {
        self.calls.lock().await.push(ClusterCall::Patch(path.to_string(), body.clone()));
        self.response.clone()
    }
}

pub fn test_context(cluster: Arc<dyn ClusterClient>) -> ExecutionContext {
    ExecutionContext::new(cluster, reqwest::Client::new())
}

pub fn idle_context() -> ExecutionContext {
    test_context(Arc::new(RecordingCluster::with_json(Value::Null)))
}
