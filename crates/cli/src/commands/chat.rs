use std::sync::Arc;

use helmsman_agent::run_loop::RunError;
use helmsman_agent::session::{ConversationServices, ConversationSession, SessionError};
use helmsman_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use helmsman_core::domain::thread::{ThreadHandle, ThreadId};
use helmsman_db::repositories::{InMemoryChatRepository, InMemoryThreadRepository};
use tokio_util::sync::CancellationToken;

use crate::commands::CommandResult;

#[derive(Debug, Clone, Default)]
pub struct ChatArgs {
    pub message: String,
    pub language: Option<String>,
    pub thread: Option<String>,
    pub enable_capabilities: bool,
}

/// One exchange against the configured engine. CLI conversations are never
/// persisted; `thread` is the engine's own thread id.
pub fn run(args: ChatArgs) -> CommandResult {
    let message = args.message.trim().to_string();
    if message.is_empty() {
        return CommandResult::failure("chat", "invalid_input", "message must not be empty", 2);
    }

    let options = LoadOptions {
        overrides: ConfigOverrides {
            language: args.language.clone(),
            capabilities_enabled: Some(args.enable_capabilities),
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });

        let services = ConversationServices::connect(
            &config,
            Arc::new(InMemoryThreadRepository::default()),
            Arc::new(InMemoryChatRepository::default()),
            cancel,
        )
        .await
        .map_err(|error| ("engine", error.to_string(), 6u8))?;

        let session = ConversationSession::new(services, &config.engine.language, false);
        let thread = match args.thread.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => ThreadHandle::transient(ThreadId(id.to_string())),
            None => session.start().await.map_err(classify)?,
        };

        let answer = session.advance(&message, &thread).await.map_err(classify)?;
        Ok::<(String, ThreadHandle), (&'static str, String, u8)>((answer, thread))
    });

    match result {
        Ok((answer, thread)) => CommandResult::answered("chat", answer, thread.external_id.as_str()),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("chat", error_class, message, exit_code)
        }
    }
}

fn classify(error: SessionError) -> (&'static str, String, u8) {
    match error {
        SessionError::Engine(_) | SessionError::Run(RunError::Engine(_)) => {
            ("engine", error.to_string(), 6)
        }
        SessionError::Persistence(_) => ("db_connectivity", error.to_string(), 4),
        SessionError::Run(_) | SessionError::UnknownThread(_) => ("run_failed", error.to_string(), 3),
    }
}
