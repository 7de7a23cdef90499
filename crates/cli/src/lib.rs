pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "helmsman",
    version,
    about = "Helmsman operator CLI",
    long_about = "Ask the SRE assistant about the cluster, apply migrations, and inspect runtime readiness.",
    after_help = "Examples:\n  helmsman chat --message \"why is checkout-api restarting?\"\n  helmsman chat --message \"and now?\" --thread thread_abc\n  helmsman doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run one exchange with the assistant and print the answer")]
    Chat {
        #[arg(short, long, help = "Message to send")]
        message: String,
        #[arg(short = 'g', long, help = "Language the assistant answers in (defaults to engine.language)")]
        language: Option<String>,
        #[arg(long, help = "Engine thread id to continue a previous conversation")]
        thread: Option<String>,
        #[arg(long, help = "Let the assistant invoke infrastructure capabilities")]
        enable_capabilities: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, engine credentials, Slack readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Chat { message, language, thread, enable_capabilities } => {
            commands::chat::run(commands::chat::ChatArgs {
                message,
                language,
                thread,
                enable_capabilities,
            })
        }
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Diagnostics go to stderr so stdout stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
