use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use helmsman_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let engine_api_key = if config.engine.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let cluster_token = if config.cluster.token.is_some() { "<redacted>" } else { "<unset>" };
    let validation_token = if config.slack.validation_token.expose_secret().trim().is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    };

    let entries: Vec<(&str, String, &str)> = vec![
        ("database.url", config.database.url.clone(), "HELMSMAN_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "HELMSMAN_DATABASE_MAX_CONNECTIONS",
        ),
        ("database.timeout_secs", config.database.timeout_secs.to_string(), "HELMSMAN_DATABASE_TIMEOUT_SECS"),
        ("engine.flavour", format!("{:?}", config.engine.flavour), "HELMSMAN_ENGINE_FLAVOUR"),
        ("engine.api_key", engine_api_key.to_string(), "HELMSMAN_ENGINE_API_KEY"),
        (
            "engine.base_url",
            config.engine.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            "HELMSMAN_ENGINE_BASE_URL",
        ),
        ("engine.model", config.engine.model.clone(), "HELMSMAN_ENGINE_MODEL"),
        ("engine.assistant_name", config.engine.assistant_name.clone(), "HELMSMAN_ENGINE_ASSISTANT_NAME"),
        ("engine.language", config.engine.language.clone(), "HELMSMAN_ENGINE_LANGUAGE"),
        ("engine.poll_interval_ms", config.engine.poll_interval_ms.to_string(), "HELMSMAN_ENGINE_POLL_INTERVAL_MS"),
        (
            "engine.max_action_rounds",
            config.engine.max_action_rounds.to_string(),
            "HELMSMAN_ENGINE_MAX_ACTION_ROUNDS",
        ),
        (
            "engine.run_deadline_secs",
            config.engine.run_deadline_secs.to_string(),
            "HELMSMAN_ENGINE_RUN_DEADLINE_SECS",
        ),
        ("slack.validation_token", validation_token.to_string(), "HELMSMAN_SLACK_VALIDATION_TOKEN"),
        ("slack.bot_token", redact_token(config.slack.bot_token.expose_secret()), "HELMSMAN_SLACK_BOT_TOKEN"),
        ("slack.mention_name", config.slack.mention_name.clone(), "HELMSMAN_SLACK_MENTION_NAME"),
        ("cluster.api_server", config.cluster.api_server.clone(), "HELMSMAN_CLUSTER_API_SERVER"),
        ("cluster.token", cluster_token.to_string(), "HELMSMAN_CLUSTER_TOKEN"),
        ("capabilities.enabled", config.capabilities.enabled.to_string(), "HELMSMAN_CAPABILITIES_ENABLED"),
        (
            "capabilities.infra_read",
            config.capabilities.infra_read.to_string(),
            "HELMSMAN_CAPABILITIES_INFRA_READ",
        ),
        (
            "capabilities.infra_write",
            config.capabilities.infra_write.to_string(),
            "HELMSMAN_CAPABILITIES_INFRA_WRITE",
        ),
        (
            "capabilities.network_probe",
            config.capabilities.network_probe.to_string(),
            "HELMSMAN_CAPABILITIES_NETWORK_PROBE",
        ),
        ("capabilities.utility", config.capabilities.utility.to_string(), "HELMSMAN_CAPABILITIES_UTILITY"),
        ("server.bind_address", config.server.bind_address.clone(), "HELMSMAN_SERVER_BIND_ADDRESS"),
        ("server.port", config.server.port.to_string(), "HELMSMAN_SERVER_PORT"),
        ("api.chat_enabled", config.api.chat_enabled.to_string(), "HELMSMAN_API_CHAT_ENABLED"),
        ("api.events_enabled", config.api.events_enabled.to_string(), "HELMSMAN_API_EVENTS_ENABLED"),
        ("logging.level", config.logging.level.clone(), "HELMSMAN_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "HELMSMAN_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in entries {
        let source =
            field_source(key, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("helmsman.toml"), PathBuf::from("config/helmsman.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the Slack token type prefix (`xoxb`) and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
