use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::capabilities::CapabilityError;
use crate::cluster::ClusterClient;

/// Per-exchange handles lent to capabilities: the cluster client, a shared
/// HTTP client, a cancellation token and an optional deadline.
#[derive(Clone)]
pub struct ExecutionContext {
    cluster: Arc<dyn ClusterClient>,
    http: reqwest::Client,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ExecutionContext {
    pub fn new(cluster: Arc<dyn ClusterClient>, http: reqwest::Client) -> Self {
        Self { cluster, http, cancel: CancellationToken::new(), deadline: None }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Context for one exchange: cancelled together with `self`, bounded by `budget`.
    pub fn child(&self, budget: Duration) -> Self {
        let deadline = Instant::now() + budget;
        Self {
            cluster: Arc::clone(&self.cluster),
            http: self.http.clone(),
            cancel: self.cancel.child_token(),
            deadline: Some(self.deadline.map_or(deadline, |parent| parent.min(deadline))),
        }
    }

    pub fn cluster(&self) -> &dyn ClusterClient {
        self.cluster.as_ref()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Sleeps for `duration` unless the context is cancelled first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), CapabilityError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CapabilityError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Runs `future` under the context's cancellation token and deadline.
    pub async fn guard<T, F>(&self, future: F) -> Result<T, CapabilityError>
    where
        F: Future<Output = Result<T, CapabilityError>>,
    {
        let bounded = async {
            match self.remaining() {
                Some(remaining) => tokio::time::timeout(remaining, future)
                    .await
                    .unwrap_or(Err(CapabilityError::DeadlineExceeded)),
                None => future.await,
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(CapabilityError::Cancelled),
            result = bounded => result,
        }
    }
}
