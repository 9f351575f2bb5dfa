//! Capture directories through labeling and CSV export.

mod common;

use common::{RENO_CAPTURE, init_test_logging};
use lossprobe_telemetry::{
    BatchPipeline, CongestionControl, FeatureValue, Field, ProbeConfig, congestion_algorithm,
    cwnd_values, load_run_directories, write_dataset_csv,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn run_dir(root: &Path, name: &str, files: &[&str]) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    for file in files {
        std::fs::write(dir.join(file), RENO_CAPTURE).unwrap();
    }
    dir
}

fn pipeline(root: &Path) -> BatchPipeline {
    let path = root.join("config.toml");
    std::fs::write(&path, "[batch]\nrtt_warmup_ms = 250.0\n").unwrap();
    let config = ProbeConfig::load(Some(path.as_path())).unwrap();
    assert_eq!(config.batch.tick_ms, 20);
    BatchPipeline::new(config.batch)
}

#[test]
fn test_capture_file_is_labeled_end_to_end() {
    init_test_logging();
    tracing::info!("TEST START: test_capture_file_is_labeled_end_to_end");

    let tmp = TempDir::new().unwrap();
    let dir = run_dir(tmp.path(), "reno_10mbit", &["run_1.txt"]);
    let runs = load_run_directories(&[dir]).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, "run_1.txt");
    assert_eq!(runs[0].snapshots.len(), 12);
    assert_eq!(congestion_algorithm(&runs[0].snapshots), Some(CongestionControl::Reno));
    assert_eq!(cwnd_values(&runs[0].snapshots).len(), 12);

    let output = pipeline(tmp.path()).process_run(&runs[0].run_id, &runs[0].snapshots);
    assert_eq!(output.stats.warmup_ticks, 3);
    assert_eq!(output.stats.active_ticks, 9);
    assert_eq!(output.stats.dropped, 1);
    assert_eq!(output.stats.labeled, 6);

    let timestamps: Vec<_> = output
        .records
        .iter()
        .map(|r| r.record.get(Field::Timestamp))
        .collect();
    let expected: Vec<_> = [20, 40, 60, 100, 120, 140]
        .into_iter()
        .map(|t| Some(FeatureValue::Int(t)))
        .collect();
    assert_eq!(timestamps, expected);

    let lost: Vec<bool> = output.records.iter().map(|r| r.lost).collect();
    assert_eq!(lost, [true, false, false, false, true, false]);

    let first = &output.records[0].record;
    assert_eq!(first.get(Field::CwndDiff), Some(FeatureValue::Int(40)));
    assert_eq!(first.get(Field::DataSegmentsSent), Some(FeatureValue::Int(800)));
    assert_eq!(first.get(Field::MinRtt), Some(FeatureValue::Float(98.5)));
    assert_eq!(first.get(Field::MaxRtt), Some(FeatureValue::Float(102.0)));
    assert_eq!(first.get(Field::MinCwnd), Some(FeatureValue::Int(80)));
    assert_eq!(first.get(Field::MaxCwnd), Some(FeatureValue::Int(120)));

    // The tick after the dropped snapshot diffs against it.
    let after_drop = &output.records[3].record;
    assert_eq!(after_drop.get(Field::CwndDiff), Some(FeatureValue::Int(1)));
    assert_eq!(after_drop.get(Field::DataSegmentsSent), Some(FeatureValue::Int(70)));

    let last = &output.records[5].record;
    assert_eq!(last.get(Field::CwndDiff), Some(FeatureValue::Int(-32)));
    assert_eq!(last.get(Field::MinCwnd), Some(FeatureValue::Int(31)));
    assert_eq!(last.get(Field::MaxCwnd), Some(FeatureValue::Int(120)));

    tracing::info!("TEST PASS: test_capture_file_is_labeled_end_to_end");
}

#[test]
fn test_directories_export_to_csv() {
    init_test_logging();
    tracing::info!("TEST START: test_directories_export_to_csv");

    let tmp = TempDir::new().unwrap();
    let dirs = vec![
        run_dir(tmp.path(), "reno_a", &["run_2.txt", "run_1.txt"]),
        run_dir(tmp.path(), "reno_b", &["run_1.txt"]),
    ];

    let records = pipeline(tmp.path()).process_directories(&dirs).unwrap();
    assert_eq!(records.len(), 18);
    assert_eq!(records[0].run_id, "run_1.txt");
    assert_eq!(records[6].run_id, "run_2.txt");
    assert_eq!(records.iter().filter(|r| r.lost).count(), 6);

    let csv_path = tmp.path().join("dataset.csv");
    assert_eq!(write_dataset_csv(&csv_path, &records).unwrap(), 18);

    let text = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 19);

    let mut header: Vec<&str> = Field::ALL.iter().map(|f| f.name()).collect();
    header.push("lost");
    assert_eq!(lines[0], header.join(","));
    assert!(lines[1].ends_with(",True"));
    assert!(lines[2].ends_with(",False"));

    tracing::info!("TEST PASS: test_directories_export_to_csv");
}

#[test]
fn test_nested_directory_rejects_load() {
    init_test_logging();

    let tmp = TempDir::new().unwrap();
    let dir = run_dir(tmp.path(), "reno", &["run_1.txt"]);
    std::fs::create_dir(dir.join("nested")).unwrap();

    assert!(pipeline(tmp.path()).process_directories(&[dir]).is_err());
}
