use helmsman_agent::CapabilityRegistry;
use helmsman_core::config::{AppConfig, EngineFlavour, LoadOptions};
use helmsman_db::connect_with_settings;
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const CHECK_NAMES: [&str; 4] =
    ["engine_credentials", "capability_registry", "slack_readiness", "database_connectivity"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_engine_credentials(&config));
            checks.push(check_capability_registry(&config));
            checks.push(check_slack_readiness(&config));
            checks.push(check_database_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(CHECK_NAMES.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
        }
    }

    let all_pass = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_engine_credentials(config: &AppConfig) -> DoctorCheck {
    let key_present = config
        .engine
        .api_key
        .as_ref()
        .is_some_and(|key| !key.expose_secret().trim().is_empty());
    if !key_present {
        return DoctorCheck {
            name: "engine_credentials",
            status: CheckStatus::Fail,
            details: "engine.api_key is not set".to_string(),
        };
    }

    let endpoint = match config.engine.flavour {
        EngineFlavour::OpenAi => {
            config.engine.base_url.clone().unwrap_or_else(|| "https://api.openai.com/v1".to_string())
        }
        EngineFlavour::AzureOpenAi => format!(
            "{} (api-version {})",
            config.engine.base_url.as_deref().unwrap_or("<unset>"),
            config.engine.api_version.as_deref().unwrap_or("<unset>")
        ),
    };

    DoctorCheck {
        name: "engine_credentials",
        status: CheckStatus::Pass,
        details: format!(
            "{:?} key present; assistant `{}` on `{}` using model `{}`",
            config.engine.flavour, config.engine.assistant_name, endpoint, config.engine.model
        ),
    }
}

fn check_capability_registry(config: &AppConfig) -> DoctorCheck {
    match CapabilityRegistry::builtin() {
        Ok(registry) => {
            let active = registry.active(&config.capabilities.permissions());
            DoctorCheck {
                name: "capability_registry",
                status: CheckStatus::Pass,
                details: format!(
                    "{} of {} capabilities active under the configured permissions",
                    active.len(),
                    registry.len()
                ),
            }
        }
        Err(error) => DoctorCheck {
            name: "capability_registry",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_slack_readiness(config: &AppConfig) -> DoctorCheck {
    if !config.api.events_enabled {
        return DoctorCheck {
            name: "slack_readiness",
            status: CheckStatus::Skipped,
            details: "api.events_enabled is false".to_string(),
        };
    }

    DoctorCheck {
        name: "slack_readiness",
        status: CheckStatus::Pass,
        details: format!(
            "tokens validated by config contract; replying as `{}`",
            config.slack.mention_name
        ),
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
