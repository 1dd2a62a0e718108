use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn config_in(dir: &std::path::Path) -> std::path::PathBuf {
    config_with_logging(dir, false)
}

fn config_with_logging(dir: &std::path::Path, structured: bool) -> std::path::PathBuf {
    let path = dir.join("coin.yaml");
    let yaml = format!(
        r#"
run_id: "cli"
outputs:
  trace_jsonl: "{out}/trace.jsonl"
  summary_md: "{out}/summary.md"
  plots_dir: "{out}/plots"
logging:
  enable_structured: {structured}
"#,
        out = dir.join("out").display()
    );
    fs::write(&path, yaml).expect("write config");
    path
}

#[test]
fn runs_default_sample() {
    let dir = tempdir().expect("temp dir");
    let config = config_in(dir.path());
    Command::cargo_bin("bayes-coin")
        .expect("binary built")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("bundled sample"))
        .stdout(predicate::str::contains("72 heads, 28 tails"))
        .stdout(predicate::str::contains("MAP estimate for 'cli'"));
    assert!(dir.path().join("out/trace.jsonl").exists());
    assert!(dir.path().join("out/summary.md").exists());
}

#[test]
fn validate_only_skips_computation() {
    let dir = tempdir().expect("temp dir");
    let config = config_in(dir.path());
    Command::cargo_bin("bayes-coin")
        .expect("binary built")
        .args(["--simulate", "0.25", "--seed", "5", "--validate-only", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("simulated coin (bias 0.25, seed 5)"))
        .stdout(predicate::str::contains("Validation-only mode"));
    assert!(!dir.path().join("out/trace.jsonl").exists());
}

#[test]
fn validate_only_writes_nothing() {
    let dir = tempdir().expect("temp dir");
    let config = config_with_logging(dir.path(), true);
    Command::cargo_bin("bayes-coin")
        .expect("binary built")
        .args(["--validate-only", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Validation-only mode"))
        .stdout(predicate::str::contains("Telemetry log").not());
    assert!(!dir.path().join("out").exists());
}

#[test]
fn structured_run_writes_telemetry() {
    let dir = tempdir().expect("temp dir");
    let config = config_with_logging(dir.path(), true);
    Command::cargo_bin("bayes-coin")
        .expect("binary built")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Telemetry log"));
    let telemetry = fs::read_to_string(dir.path().join("out/telemetry.jsonl")).expect("telemetry");
    assert!(telemetry.contains("posterior trace computed"));
}

#[test]
fn rejects_short_input() {
    let dir = tempdir().expect("temp dir");
    let config = config_in(dir.path());
    Command::cargo_bin("bayes-coin")
        .expect("binary built")
        .args(["--input", "1,0,1,"])
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("got 3 values, exactly 100 are required"));
}

#[test]
fn rejects_non_binary_value() {
    let dir = tempdir().expect("temp dir");
    let config = config_in(dir.path());
    let mut values = vec!["1"; 100];
    values[10] = "2";
    Command::cargo_bin("bayes-coin")
        .expect("binary built")
        .args(["--input", &values.join(",")])
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("value 2 at position 10"));
}

#[test]
fn rejects_degenerate_grid() {
    Command::cargo_bin("bayes-coin")
        .expect("binary built")
        .args(["--grid-points", "1", "--validate-only"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("grid.points"));
}
