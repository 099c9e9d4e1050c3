//! Rules Processor - Main Entry Point
//!
//! Usage: `rules-processor [settings-file]`

use anyhow::Result;
use rules_processor::{init_logging, run, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let file = std::env::args().nth(1);
    let settings = Settings::load(file.as_deref())?;
    init_logging(&settings.logging)?;

    info!("=== Rules Processor v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Settings: {:?}", settings);

    let summary = run(&settings).await?;
    eprintln!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
