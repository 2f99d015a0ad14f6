use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};

use magic_formula_digest::logging::init_logging;
use magic_formula_digest::models::Config;
use magic_formula_digest::runner;

/// Daily Magic Formula stock digest
#[derive(Debug, Parser)]
#[command(name = "magic-formula-digest", version, about)]
struct Cli {
    /// Render the digest from fixture data and write it to disk instead of mailing
    #[arg(long)]
    test: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env();

    if let Err(e) = init_logging(&config) {
        eprintln!("❌ Failed to initialize logging: {}", e);
    }

    let success = if cli.test {
        runner::run_test_mode(&config).await
    } else {
        runner::run_production(&config).await
    };

    if success {
        info!("Run completed successfully");
        ExitCode::SUCCESS
    } else {
        error!("Run failed");
        ExitCode::FAILURE
    }
}
