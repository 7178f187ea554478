use clap::Parser;
use schemaward::cli::{self, args::Cli};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(args.quiet);

    match cli::run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => ExitCode::from(cli::report_failure(&err)),
    }
}
