use anyhow::Result;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::models::Config;

const DEFAULT_FILTER: &str = "magic_formula_digest=info";

/// Install the process-wide subscriber: stderr plus an appended log file
/// under the data directory. Call once, before any component runs.
pub fn init_logging(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(log_file)))
        .try_init()?;

    Ok(())
}
