//! Logging Setup

use crate::settings::{LogFormat, LoggingSettings};
use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the global tracing subscriber
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let level: Level = settings
        .level
        .parse()
        .map_err(|_| anyhow!("Unknown log level '{}'", settings.level))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    let result = match settings.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish()),
    };
    result.map_err(|e| anyhow!("Failed to set tracing subscriber: {}", e))
}
