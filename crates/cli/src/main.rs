use std::process::ExitCode;

fn main() -> ExitCode {
    helmsman_cli::run()
}
