//! Processor Settings

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use rule_actor::PoolConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// One of trace, debug, info, warn, error (default: info)
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Everything the processor reads from `rules-processor.toml` and `RULES__*`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// JSON array of rule definitions
    pub rules_path: PathBuf,
    /// JSON lines, one sample per line
    pub samples_path: PathBuf,
    /// Where occurrences are written as JSON lines; stdout when unset
    pub output_path: Option<PathBuf>,
    /// Close open occurrences at the last sample time once the feed ends
    pub flush_at_end: bool,
    /// Prometheus text dump of the run's counters
    pub metrics_path: Option<PathBuf>,
    pub pool: PoolConfig,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rules_path: PathBuf::from("rules.json"),
            samples_path: PathBuf::from("samples.jsonl"),
            output_path: None,
            flush_at_end: true,
            metrics_path: None,
            pool: PoolConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Settings {
    /// Layer the optional config file under `RULES__` environment overrides
    pub fn load(file: Option<&str>) -> Result<Self> {
        let file = file.unwrap_or("rules-processor");
        Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix("RULES").separator("__"))
            .build()
            .with_context(|| format!("Failed to read settings from '{}'", file))?
            .try_deserialize()
            .context("Invalid settings")
    }
}
