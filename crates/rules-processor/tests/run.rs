//! File-based replay

use rules_processor::{run, Settings};
use std::path::PathBuf;

fn scratch(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rules-processor-{}-{}", uuid::Uuid::new_v4(), name))
}

#[tokio::test]
async fn test_run_reads_and_writes_files() {
    let rules = scratch("rules.json");
    let samples = scratch("samples.jsonl");
    let output = scratch("occurrences.jsonl");

    std::fs::write(
        &rules,
        r#"[{
            "rule_id": "stuck-zone-temp",
            "equipment_id": "Zone-4",
            "template": "unchanging",
            "signals": ["zone_temp"],
            "parameters": [{"name": "result", "expression": "[zone_temp]"}],
            "fields": {"over_how_many_hours": 1},
            "description": "Zone temperature stuck at {zone_temp}"
        }]"#,
    )
    .unwrap();

    let feed: Vec<String> = (0..=8)
        .map(|i| {
            format!(
                r#"{{"equipment_id":"Zone-4","signal":"zone_temp","timestamp":"2024-03-01T{:02}:{:02}:00Z","value":21.5}}"#,
                i * 15 / 60,
                i * 15 % 60
            )
        })
        .collect();
    std::fs::write(&samples, feed.join("\n")).unwrap();

    let settings = Settings {
        rules_path: rules.clone(),
        samples_path: samples.clone(),
        output_path: Some(output.clone()),
        ..Settings::default()
    };
    let summary = run(&settings).await.unwrap();

    let written = std::fs::read_to_string(&output).unwrap();
    for path in [&rules, &samples, &output] {
        std::fs::remove_file(path).unwrap();
    }

    assert_eq!(summary.lines, 9);
    assert_eq!(summary.faulted, 1);
    assert_eq!(written.lines().count(), 1);
    assert!(written.contains("Zone temperature stuck at 21.50"));
    assert!(written.contains("\"ended\":\"2024-03-01T02:00:00Z\""));
}
