use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use helmsman_db::DbPool;
use serde::Serialize;

/// Liveness and readiness flags plus the database handle probed by `/health`.
/// Clones share the same flags.
#[derive(Clone)]
pub struct HealthState {
    healthy: Arc<AtomicBool>,
    ready: Arc<AtomicBool>,
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProbeResponse {
    pub status: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub checked_at: String,
}

impl HealthState {
    /// Starts live but not ready.
    pub fn new(db_pool: DbPool) -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(true)),
            ready: Arc::new(AtomicBool::new(false)),
            db_pool,
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn mark_shutting_down(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.healthy.store(false, Ordering::SeqCst);
        tracing::info!(event_name = "system.health.unhealthy", "health probes now report KO");
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/live", get(live))
            .route("/readyz", get(readyz))
            .route("/health", get(health))
            .with_state(self.clone())
    }
}

fn probe(ok: bool) -> (StatusCode, Json<ProbeResponse>) {
    if ok {
        (StatusCode::OK, Json(ProbeResponse { status: "OK" }))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(ProbeResponse { status: "KO" }))
    }
}

pub async fn live(State(state): State<HealthState>) -> (StatusCode, Json<ProbeResponse>) {
    probe(state.is_healthy())
}

pub async fn readyz(State(state): State<HealthState>) -> (StatusCode, Json<ProbeResponse>) {
    probe(state.is_ready())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready" && state.is_ready();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: if state.is_ready() {
            HealthCheck { status: "ready", detail: "helmsman-server accepting requests".to_string() }
        } else {
            HealthCheck { status: "degraded", detail: "helmsman-server is not ready".to_string() }
        },
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}
