//! Sample Replay

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rule_actor::{ActorPool, ActorReport, PoolConfig, RuleDefinition};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One line of the sample feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub equipment_id: String,
    pub signal: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Totals for one replay run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub run_id: Uuid,
    pub actors: usize,
    pub lines: usize,
    /// Lines that failed to parse
    pub malformed: usize,
    /// Samples no actor consumes
    pub unrouted: usize,
    /// Samples dropped inside actors
    pub rejected: u64,
    pub occurrences: usize,
    pub faulted: usize,
}

/// Run `samples` through one actor per definition and write every occurrence
/// to `output` as a JSON line.
pub async fn replay<R, W>(
    definitions: Vec<RuleDefinition>,
    samples: R,
    mut output: W,
    pool_config: PoolConfig,
    flush_at_end: bool,
) -> Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = ReplaySummary {
        run_id: Uuid::new_v4(),
        ..Default::default()
    };
    info!("Replay {} starting with {} rules", summary.run_id, definitions.len());

    let mut pool = ActorPool::new(pool_config);
    for definition in definitions {
        let rule_id = definition.rule_id.clone();
        pool.spawn(definition)
            .with_context(|| format!("Rule '{}' is invalid", rule_id))?;
    }
    summary.actors = pool.len();

    let mut latest: Option<DateTime<Utc>> = None;
    let mut lines = samples.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read sample feed")? {
        summary.lines += 1;
        if line.trim().is_empty() {
            continue;
        }

        let sample: SampleRecord = match serde_json::from_str(&line) {
            Ok(sample) => sample,
            Err(e) => {
                summary.malformed += 1;
                warn!("Skipping malformed sample on line {}: {}", summary.lines, e);
                continue;
            }
        };

        let routed = pool
            .dispatch(&sample.equipment_id, &sample.signal, sample.timestamp, sample.value)
            .await?;
        if routed == 0 {
            summary.unrouted += 1;
        }
        latest = Some(latest.map_or(sample.timestamp, |t| t.max(sample.timestamp)));
    }

    if flush_at_end {
        if let Some(as_of) = latest {
            debug!("Flushing open occurrences at {}", as_of);
            pool.flush_all(as_of).await?;
        }
    }

    let reports = pool.finish().await?;
    write_reports(&reports, &mut output, &mut summary).await?;

    info!(
        "Replay {} finished: {} lines, {} occurrences ({} faulted), {} rejected",
        summary.run_id, summary.lines, summary.occurrences, summary.faulted, summary.rejected
    );
    Ok(summary)
}

async fn write_reports<W: AsyncWrite + Unpin>(
    reports: &[ActorReport],
    output: &mut W,
    summary: &mut ReplaySummary,
) -> Result<()> {
    for report in reports {
        summary.rejected += report.rejected;
        for occurrence in &report.occurrences {
            let mut line = serde_json::to_vec(occurrence)?;
            line.push(b'\n');
            output.write_all(&line).await?;
            summary.occurrences += 1;
            if occurrence.is_faulted() {
                summary.faulted += 1;
            }
        }
    }
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight::Occurrence;

    const RULES: &str = r#"[
        {
            "rule_id": "high-water-flow",
            "equipment_id": "WaterMeter",
            "template": "any_fault",
            "signals": ["flow"],
            "parameters": ["result = [flow] > 10"],
            "description": "Flow {flow} for {duration}s"
        }
    ]"#;

    fn feed() -> String {
        let lines = [
            r#"{"equipment_id":"WaterMeter","signal":"flow","timestamp":"2024-03-01T00:00:00Z","value":2.0}"#,
            r#"{"equipment_id":"WaterMeter","signal":"flow","timestamp":"2024-03-01T00:01:00Z","value":12.0}"#,
            "not json",
            r#"{"equipment_id":"Boiler","signal":"flow","timestamp":"2024-03-01T00:02:00Z","value":1.0}"#,
            r#"{"equipment_id":"WaterMeter","signal":"flow","timestamp":"2024-03-01T00:00:30Z","value":1.0}"#,
            r#"{"equipment_id":"WaterMeter","signal":"flow","timestamp":"2024-03-01T00:03:00Z","value":3.0}"#,
        ];
        lines.join("\n")
    }

    #[tokio::test]
    async fn test_replay_writes_occurrences() {
        let definitions: Vec<RuleDefinition> = serde_json::from_str(RULES).unwrap();
        let feed = feed();
        let mut output = Vec::new();

        let summary = replay(definitions, feed.as_bytes(), &mut output, PoolConfig::default(), true)
            .await
            .unwrap();

        assert_eq!(summary.actors, 1);
        assert_eq!(summary.lines, 6);
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.unrouted, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.occurrences, 3);
        assert_eq!(summary.faulted, 1);

        let occurrences: Vec<Occurrence> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(occurrences[1].text, "Flow 12.00 for 120s");
        assert!(occurrences.iter().all(|o| o.ended.is_some()));
    }

    #[tokio::test]
    async fn test_invalid_rule_aborts() {
        let definitions: Vec<RuleDefinition> = serde_json::from_str(
            r#"[{"rule_id":"bad","equipment_id":"AHU","template":"any_fault","signals":[],"parameters":[]}]"#,
        )
        .unwrap();
        let result = replay(definitions, &b""[..], Vec::new(), PoolConfig::default(), true).await;
        assert!(result.is_err());
    }
}
