//! Smoke tests of the `omiclearn` binary: argument parsing, the default
//! config dump and a complete run on a small generated file.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fmt::Write as _;

fn cmd() -> Command {
    Command::cargo_bin("omiclearn").unwrap()
}

/// 40 samples, a separating feature, a noise feature, a categorical
/// metadata column and two sites.
fn write_dataset(dir: &std::path::Path) -> std::path::PathBuf {
    let mut content = String::from("_status,_site,_sex,P1,P2\n");
    for i in 0..40 {
        let status = if i % 2 == 0 { "AD" } else { "ctrl" };
        let p1 = if i % 2 == 0 { 5.0 } else { -5.0 } + (i % 5) as f64 * 0.1;
        let site = if (i / 2) % 2 == 0 { "A" } else { "B" };
        let sex = if i % 3 == 0 { "F" } else { "M" };
        writeln!(content, "{},{},{},{},{}", status, site, sex, p1, (i * 7) % 11).unwrap();
    }
    let path = dir.join("data.csv");
    std::fs::write(&path, content).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Top-level
// ---------------------------------------------------------------------------

#[test]
fn no_args_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_lists_subcommands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("default-config"));
}

#[test]
fn default_config_prints_json() {
    cmd()
        .arg("default-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"cross_validation\""))
        .stdout(predicate::str::contains("\"RepeatedStratifiedKFold\""));
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[test]
fn run_without_data_fails() {
    cmd().args(["run"]).assert().failure();
}

#[test]
fn run_with_nonexistent_config_fails() {
    cmd()
        .args(["run", "/nonexistent/config.json"])
        .assert()
        .failure();
}

#[test]
fn run_rejects_unknown_classifier() {
    cmd()
        .args(["run", "--classifier", "Perceptron"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Perceptron"));
}

#[test]
fn run_writes_all_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path());
    let out = dir.path().join("out");

    let config_path = dir.path().join("config.json");
    std::fs::write(
        &config_path,
        r#"{"run": {"cross_validation": {"scheme": "StratifiedKFold", "n_splits": 4},
                    "pipeline": {"classifier": {"kind": "LogisticRegression"},
                                 "feature_selection": {"method": "None"}}}}"#,
    )
    .unwrap();

    cmd()
        .env("OMICLEARN_LOG", "error")
        .arg("run")
        .arg(&config_path)
        .args(["--data", data.to_str().unwrap()])
        .args(["--target", "_status", "--class0", "AD", "--class1", "ctrl"])
        .args(["--additional", "_sex", "--cohort", "_site"])
        .args(["--output", out.to_str().unwrap()])
        .assert()
        .success();

    for file in ["results.json", "summary.txt", "report.html", "session_history.csv"] {
        assert!(out.join(file).exists(), "{} missing", file);
    }
    let summary = std::fs::read_to_string(out.join("summary.txt")).unwrap();
    assert!(summary.contains("to classify AD vs. ctrl"));
    assert!(summary.contains("when training on A and predicting on B"));
}

#[test]
fn run_no_report_skips_html() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path());
    let out = dir.path().join("out");

    cmd()
        .env("OMICLEARN_LOG", "error")
        .args(["run", "--data", data.to_str().unwrap()])
        .args(["--target", "_status", "--class0", "AD", "--class1", "ctrl"])
        .args(["--classifier", "DecisionTree", "--cv-method", "StratifiedKFold"])
        .args(["--feature-selection", "None", "--no-report"])
        .args(["--output", out.to_str().unwrap()])
        .assert()
        .success();

    assert!(out.join("results.json").exists());
    assert!(!out.join("report.html").exists());
}

#[test]
fn run_applies_feature_list_and_exclusion_file() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path());
    let exclude = dir.path().join("exclude.csv");
    std::fs::write(&exclude, "feature\nP2\n").unwrap();
    let out = dir.path().join("out");

    cmd()
        .env("OMICLEARN_LOG", "error")
        .args(["run", "--data", data.to_str().unwrap()])
        .args(["--target", "_status", "--class0", "AD", "--class1", "ctrl"])
        .args(["--classifier", "LogisticRegression", "--cv-method", "StratifiedKFold"])
        .args(["--feature-selection", "None", "--no-report"])
        .args(["--features", "P1,P2", "--exclude-file", exclude.to_str().unwrap()])
        .args(["--output", out.to_str().unwrap()])
        .assert()
        .success();

    let results: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("results.json")).unwrap()).unwrap();
    assert_eq!(results["config"]["data"]["include_features"], serde_json::json!(["P1", "P2"]));
    let cv = &results["result"]["cross_validation"];
    assert_eq!(cv["statistics"]["num_feat_mean"], serde_json::json!(1.0));
    let importance = cv["feature_importance"].to_string();
    assert!(importance.contains("\"P1\"") && !importance.contains("\"P2\""), "{}", importance);
}
