//! Integration tests for the glyco binary.
//!
//! These tests verify end-to-end behavior including:
//! - Recording readings and treatments
//! - IOB, COB and trend output
//! - CSV import and reports
//! - Config overrides and the watch loop

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const T0: &str = "2024-03-01T12:00:00Z";

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// CLI isolated from the user's config and data directories
fn cli(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("glyco"));
    cmd.env("XDG_CONFIG_HOME", dir.join("config"))
        .arg("--data-dir")
        .arg(dir.join("data"));
    cmd
}

fn record_reading(dir: &Path, value: &str, at: &str) {
    cli(dir)
        .args(["reading", "--value", value, "--at", at])
        .assert()
        .success();
}

#[test]
fn test_cli_help() {
    Command::new(assert_cmd::cargo::cargo_bin!("glyco"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Glucose monitoring"));
}

#[test]
fn test_reading_is_appended_to_journal() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    record_reading(dir, "123", T0);

    let journal = fs::read_to_string(dir.join("data/readings.jsonl")).unwrap();
    let record: serde_json::Value = serde_json::from_str(journal.trim()).unwrap();
    assert_eq!(record["value"], 123.0);
}

#[test]
fn test_reading_rejects_non_positive_value() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args(["reading", "--value", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be positive"));
}

#[test]
fn test_bolus_shows_up_in_iob() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    cli(dir)
        .args(["log", "meal-bolus", "--insulin", "10", "--at", T0])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged meal_bolus"));

    cli(dir)
        .args(["iob", "--at", T0])
        .assert()
        .success()
        .stdout(predicate::str::contains("IOB: 10.00 U"));

    cli(dir)
        .args(["iob", "--at", "2024-03-01T15:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("IOB: 0.00 U"));
}

#[test]
fn test_carbs_show_up_in_cob() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    cli(dir)
        .args(["log", "carbs", "--carbs", "60", "--at", T0])
        .assert()
        .success();

    cli(dir)
        .args(["cob", "--at", "2024-03-01T13:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("COB: 30.0 g"));
}

#[test]
fn test_log_rejects_unknown_event_type() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args(["log", "pizza", "--insulin", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown event type"));
}

#[test]
fn test_log_temp_basal_requires_duration() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    cli(dir)
        .args(["log", "temp-basal", "--rate", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires --rate and --duration"));

    assert!(!dir.join("data/treatments.jsonl").exists());
}

#[test]
fn test_relative_temp_basal_is_stored_with_mode() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    cli(dir)
        .args([
            "log", "temp-basal", "--rate", "50", "--relative", "--duration", "60", "--at", T0,
        ])
        .assert()
        .success();

    let journal = fs::read_to_string(dir.join("data/treatments.jsonl")).unwrap();
    let record: serde_json::Value = serde_json::from_str(journal.trim()).unwrap();
    assert_eq!(record["rate_mode"], "relative");
    assert_eq!(record["duration_minutes"], 60.0);
    assert!(record["id"].is_string());
}

#[test]
fn test_import_csv() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();
    let csv_path = dir.join("export.csv");
    fs::write(
        &csv_path,
        "timestamp,value\n\
         2024-03-01T11:50:00Z,100\n\
         2024-03-01T11:55:00Z,110\n\
         not-a-date,120\n\
         2024-03-01T12:00:00Z,120\n",
    )
    .unwrap();

    cli(dir)
        .arg("import")
        .arg(&csv_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 3 readings"))
        .stdout(predicate::str::contains("Skipped 1 malformed rows"));

    let journal = fs::read_to_string(dir.join("data/readings.jsonl")).unwrap();
    assert_eq!(journal.lines().count(), 3);
}

#[test]
fn test_trend_shows_delta_and_prediction() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    record_reading(dir, "100", "2024-03-01T11:50:00Z");
    record_reading(dir, "110", "2024-03-01T11:55:00Z");
    record_reading(dir, "120", T0);

    cli(dir)
        .args(["trend", "--at", T0])
        .assert()
        .success()
        .stdout(predicate::str::contains("Latest: 120 mg/dL"))
        .stdout(predicate::str::contains("Delta: +10.0 mg/dL ↗"))
        .stdout(predicate::str::contains("heuristic"));
}

#[test]
fn test_trend_without_readings() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .arg("trend")
        .assert()
        .success()
        .stdout(predicate::str::contains("No readings"));
}

#[test]
fn test_report_json() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    record_reading(dir, "100", "2024-03-01T11:50:00Z");
    record_reading(dir, "110", "2024-03-01T11:55:00Z");
    record_reading(dir, "120", T0);
    record_reading(dir, "300", "2024-02-01T12:00:00Z");

    let output = cli(dir)
        .args(["report", "--days", "1", "--json", "--at", T0])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["summary"]["count"], 3);
    assert_eq!(report["summary"]["mean"], 110.0);
    assert_eq!(report["time_in_range"]["percentages"]["in_range"], 100.0);
    assert_eq!(report["hourly"].as_array().unwrap().len(), 24);
}

#[test]
fn test_report_text_without_readings() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args(["report", "--days", "7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No readings in this window."));
}

#[test]
fn test_config_override_is_validated() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();
    let config_path = dir.join("bad.toml");
    fs::write(&config_path, "[thresholds]\nlow = 200.0\n").unwrap();

    cli(dir)
        .arg("--config")
        .arg(&config_path)
        .arg("iob")
        .assert()
        .failure()
        .stderr(predicate::str::contains("thresholds must satisfy"));
}

#[test]
fn test_config_override_changes_model() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();
    let config_path = dir.join("slow.toml");
    fs::write(&config_path, "[model]\ndia_hours = 5.0\n").unwrap();

    cli(dir)
        .args(["log", "correction", "--insulin", "2", "--at", T0])
        .assert()
        .success();

    // Gone after 3 hours with the default DIA, still active with 5 hours
    cli(dir)
        .args(["iob", "--at", "2024-03-01T15:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("IOB: 0.00 U"));

    cli(dir)
        .arg("--config")
        .arg(&config_path)
        .args(["iob", "--at", "2024-03-01T15:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("IOB: 0.00 U").not());
}

#[test]
fn test_watch_runs_requested_iterations() {
    let temp_dir = setup_test_dir();

    let output = cli(temp_dir.path())
        .args(["watch", "--iterations", "2", "--interval-secs", "0"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.matches("IOB").count(), 2);
    assert!(stdout.contains("no recent readings"));
}

#[test]
fn test_watch_survives_unreadable_treatments() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    // Opening succeeds but every read fails with an I/O error
    fs::create_dir_all(dir.join("data/treatments.jsonl")).unwrap();

    let output = cli(dir)
        .env_remove("RUST_LOG")
        .args(["watch", "--iterations", "2", "--interval-secs", "0"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.matches("IOB --").count(), 2);
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Treatment fetch failed"));
}
