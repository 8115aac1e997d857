//! heaptap CLI: incremental extractor for Heap Parquet exports.

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use heaptap::{CliArgs, Config, init_tracing, run_command, shutdown_token};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    info!(path = %args.config.display(), "Loading config");
    let config = match Config::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = shutdown_token();

    match run_command(&args.command, &config, &shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("heaptap failed: {e}");
            ExitCode::FAILURE
        }
    }
}
