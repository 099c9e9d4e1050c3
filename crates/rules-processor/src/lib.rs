//! Rules Processor
//!
//! Replays a recorded sample feed through the rule actors and writes the
//! resulting occurrences as JSON lines.

mod logging;
mod replay;
mod settings;

pub use logging::init_logging;
pub use replay::{replay, ReplaySummary, SampleRecord};
pub use settings::{LogFormat, LoggingSettings, Settings};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use rule_actor::RuleDefinition;
use tokio::fs::File;
use tokio::io::{self, AsyncWrite, BufReader, BufWriter};
use tracing::info;

/// Load rules and samples from the configured paths and replay them
pub async fn run(settings: &Settings) -> Result<ReplaySummary> {
    let metrics = match &settings.metrics_path {
        Some(_) => Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("Failed to install metrics recorder")?,
        ),
        None => None,
    };

    let rules = tokio::fs::read_to_string(&settings.rules_path)
        .await
        .with_context(|| format!("Failed to read rules from {}", settings.rules_path.display()))?;
    let definitions: Vec<RuleDefinition> =
        serde_json::from_str(&rules).context("Rules file is not a JSON array of rule definitions")?;

    let samples = File::open(&settings.samples_path)
        .await
        .with_context(|| format!("Failed to open samples {}", settings.samples_path.display()))?;

    let output: Box<dyn AsyncWrite + Unpin + Send> = match &settings.output_path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout()),
    };

    let summary = replay(
        definitions,
        BufReader::new(samples),
        output,
        settings.pool.clone(),
        settings.flush_at_end,
    )
    .await?;

    if let (Some(path), Some(handle)) = (&settings.metrics_path, metrics) {
        tokio::fs::write(path, handle.render())
            .await
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        info!("Metrics written to {}", path.display());
    }

    Ok(summary)
}
