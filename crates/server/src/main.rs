mod api;
mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use helmsman_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use helmsman_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let router = app.router();

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        chat_enabled = app.config.api.chat_enabled,
        events_enabled = app.config.api.events_enabled,
        "helmsman-server listening"
    );

    let health = app.health.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(error) = wait_for_shutdown().await {
                tracing::error!(
                    event_name = "system.server.signal_error",
                    error = %error,
                    "could not listen for shutdown signal"
                );
            }
            health.mark_shutting_down();
            tracing::info!(
                event_name = "system.server.stopping",
                correlation_id = "shutdown",
                "helmsman-server stopping"
            );
        })
        .await?;

    // In-flight exchanges get the grace period before their contexts are cancelled.
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    tokio::time::sleep(grace).await;
    app.shutdown.cancel();
    app.db_pool.close().await;

    tracing::info!(event_name = "system.server.stopped", correlation_id = "shutdown", "helmsman-server stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
