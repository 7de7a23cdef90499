use std::sync::Arc;

use axum::Router;
use helmsman_agent::session::{ConversationServices, ServicesError};
use helmsman_core::config::{AppConfig, ConfigError};
use helmsman_db::repositories::{SqlChatRepository, SqlEventRepository, SqlThreadRepository};
use helmsman_db::{connect_with_settings, migrations, DbPool};
use helmsman_slack::{EventCorrelator, EventResolver, HttpSlackClient, SlackApiError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{self, events::SlackPipeline, ApiState};
use crate::health::HealthState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub services: ConversationServices,
    pub slack: Option<Arc<SlackPipeline>>,
    pub health: HealthState,
    /// Cancelled once the listener has drained; every exchange context inherits it.
    pub shutdown: CancellationToken,
}

impl Application {
    pub fn router(&self) -> Router {
        let state = ApiState {
            services: self.services.clone(),
            slack: self.slack.clone(),
            language: self.config.engine.language.clone(),
        };
        api::router(state, &self.config.api).merge(self.health.router())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("conversation services failed to start: {0}")]
    Services(#[from] ServicesError),
    #[error("slack client failed to start: {0}")]
    Slack(#[from] SlackApiError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let shutdown = CancellationToken::new();
    let services = ConversationServices::connect(
        &config,
        Arc::new(SqlThreadRepository::new(db_pool.clone())),
        Arc::new(SqlChatRepository::new(db_pool.clone())),
        shutdown.clone(),
    )
    .await?;
    info!(
        event_name = "system.bootstrap.engine_connected",
        correlation_id = "bootstrap",
        "conversation engine ready"
    );

    let slack = if config.api.events_enabled {
        let client = Arc::new(HttpSlackClient::new(&config.slack)?);
        let events = Arc::new(SqlEventRepository::new(db_pool.clone()));
        info!(
            event_name = "system.bootstrap.slack_ready",
            correlation_id = "bootstrap",
            mention_name = %config.slack.mention_name,
            "slack event pipeline ready"
        );
        Some(Arc::new(SlackPipeline::new(
            config.slack.validation_token.clone(),
            EventResolver::new(client.clone(), &config.slack.mention_name),
            EventCorrelator::new(events.clone()),
            client,
            events,
        )))
    } else {
        None
    };

    let health = HealthState::new(db_pool.clone());
    health.mark_ready();

    Ok(Application { config, db_pool, services, slack, health, shutdown })
}
