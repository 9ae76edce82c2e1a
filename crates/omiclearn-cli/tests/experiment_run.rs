//! Integration tests for data loading, the experiment runner and the
//! session history.

use std::fmt::Write as _;

use omiclearn_cli::experiment::input::{DataConfig, Delimiter, ExperimentConfig};
use omiclearn_cli::experiment::load_data::load_experiment_data;
use omiclearn_cli::experiment::runner;
use omiclearn_cli::experiment::session::{CsvSessionStore, InMemorySessionStore, SessionStore};
use omiclearn_core::config::{ClassifierConfig, ClassifierKind, CvScheme, SelectionMethod};

fn data_config(path: &std::path::Path) -> DataConfig {
    DataConfig {
        data_file: path.to_string_lossy().to_string(),
        target_column: "_status".to_string(),
        class_0: vec!["AD".to_string()],
        class_1: vec!["ctrl".to_string()],
        ..DataConfig::default()
    }
}

fn write(dir: &std::path::Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[test]
fn underscore_columns_are_not_features() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "data.csv",
        "_status,_age,P1,P2\nAD,61,1.0,2.0\nctrl,70,3.0,4.0\nother,55,5.0,6.0\n",
    );
    let loaded = load_experiment_data(&data_config(&path)).unwrap();
    assert_eq!(loaded.dataset.feature_names(), &["P1".to_string(), "P2".to_string()]);
    assert_eq!(loaded.dataset.n_samples(), 2);
    assert_eq!(loaded.dataset.labels().to_vec(), vec![true, false]);
    assert!(loaded.cohorts.is_none());
}

#[test]
fn subset_exclude_and_additional_features() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "data.csv",
        "_status,_sex,_batch,P1,P2,P3\n\
         AD,M,b1,1,2,3\n\
         ctrl,F,b1,4,5,6\n\
         AD,F,b2,7,8,9\n\
         ctrl,M,b1,10,11,12\n",
    );
    let mut config = data_config(&path);
    config.subset_column = Some("_batch".to_string());
    config.subset_values = vec!["b1".to_string()];
    config.exclude_features = vec!["P2".to_string(), "P9".to_string()];
    config.additional_features = vec!["_sex".to_string()];

    let loaded = load_experiment_data(&config).unwrap();
    let names: Vec<&str> = loaded.dataset.feature_names().iter().map(|s| s.as_str()).collect();
    assert_eq!(names, vec!["P1", "P3", "_sex"]);
    assert_eq!(loaded.dataset.n_samples(), 3);
    // F -> 0, M -> 1
    let sex: Vec<f64> = loaded.dataset.x().column(2).to_vec();
    assert_eq!(sex, vec![1.0, 0.0, 1.0]);
    assert!(loaded.warnings.iter().any(|w| w.contains("P9")));
}

#[test]
fn manual_feature_list_is_applied_before_exclusions() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "data.csv",
        "_status,P1,P2,P3,P4\nAD,1,2,3,4\nctrl,5,6,7,8\n",
    );
    let mut config = data_config(&path);
    config.include_features = vec!["P4".to_string(), "P2".to_string(), "P1".to_string(), "Q1".to_string()];
    config.exclude_features = vec!["P1".to_string()];

    let loaded = load_experiment_data(&config).unwrap();
    // File order, not list order.
    assert_eq!(loaded.dataset.feature_names(), &["P2".to_string(), "P4".to_string()]);
    assert!(loaded.warnings.iter().any(|w| w.contains("'Q1'")));

    config.include_features = vec!["P1".to_string()];
    let err = load_experiment_data(&config).unwrap_err();
    assert!(err.to_string().contains("No feature columns left"));
}

#[test]
fn exclusion_file_adds_to_excluded_features() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "data.csv",
        "_status,P1,P2,P3\nAD,1,2,3\nctrl,4,5,6\n",
    );
    let exclude = write(dir.path(), "exclude.csv", "feature\nP3\nP8\n");
    let mut config = data_config(&path);
    config.exclude_features = vec!["P1".to_string()];
    config.exclude_file = Some(exclude.to_string_lossy().to_string());

    let loaded = load_experiment_data(&config).unwrap();
    assert_eq!(loaded.dataset.feature_names(), &["P2".to_string()]);
    assert!(loaded.warnings.iter().any(|w| w.contains("'P8'")));
}

#[test]
fn non_numeric_cells_become_missing_with_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "data.txt",
        "_status;P1;P2\nAD;1,5;x\nctrl;NA;2\nAD;3;4\n",
    );
    let mut config = data_config(&path);
    config.delimiter = Some(Delimiter::Semicolon);
    let loaded = load_experiment_data(&config).unwrap();
    assert!(loaded.dataset.has_missing_values());
    assert!(loaded.warnings.iter().any(|w| w.contains("'P2' has 1 non-numeric")));
    assert!(loaded.warnings.iter().any(|w| w.contains("missing values")));
}

#[test]
fn duplicate_headers_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "data.csv", "_status,P1,P1\nAD,1,2\n");
    let err = load_experiment_data(&data_config(&path)).unwrap_err();
    assert!(err.to_string().contains("Duplicate column 'P1'"));
}

#[test]
fn unknown_target_column_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "data.csv", "_label,P1\nAD,1\n");
    let err = load_experiment_data(&data_config(&path)).unwrap_err();
    assert!(err.to_string().contains("'_status' not found"));
}

#[test]
fn tsv_files_are_read_with_tabs() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "data.tsv", "_status\t_site\tP1\nAD\tA\t1\nctrl\tB\t2\n");
    let mut config = data_config(&path);
    config.cohort_column = Some("_site".to_string());
    let loaded = load_experiment_data(&config).unwrap();
    assert_eq!(loaded.dataset.n_features(), 1);
    assert_eq!(loaded.cohorts.unwrap().unique(), vec!["A".to_string(), "B".to_string()]);
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

fn separable_file(dir: &std::path::Path) -> std::path::PathBuf {
    let mut content = String::from("_status,P1,P2,P3\n");
    for i in 0..30 {
        let status = if i % 2 == 0 { "AD" } else { "ctrl" };
        let p1 = if i % 2 == 0 { 3.0 } else { -3.0 } + (i % 4) as f64 * 0.2;
        writeln!(content, "{},{},{},{}", status, p1, (i * 5) % 7, (i * 3) % 4).unwrap();
    }
    write(dir, "data.csv", &content)
}

fn experiment(dir: &std::path::Path) -> ExperimentConfig {
    let mut config = ExperimentConfig::default();
    config.data = data_config(&separable_file(dir));
    config.output_dir = dir.join("results").to_string_lossy().to_string();
    config.run.cross_validation.scheme = CvScheme::StratifiedKFold;
    config.run.cross_validation.n_splits = 3;
    config.run.pipeline.classifier = ClassifierConfig::new(ClassifierKind::RandomForest);
    config.run.pipeline.classifier.params.n_estimators = Some(10);
    config.run.pipeline.feature_selection.method = SelectionMethod::KBestFClassif;
    config.run.pipeline.feature_selection.max_features = 2;
    config
}

#[test]
fn runner_writes_results_and_records_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = experiment(dir.path());
    let mut sessions = InMemorySessionStore::new();

    let outputs = runner::run(&config, &mut sessions).unwrap();
    assert!(outputs.results_json.exists());
    assert!(outputs.summary_txt.exists());
    let report = std::fs::read_to_string(outputs.report_html.unwrap()).unwrap();
    assert!(report.contains("Sum of all splits"));
    assert!(report.contains("Feature importance"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&outputs.results_json).unwrap()).unwrap();
    assert_eq!(json["result"]["cross_validation"]["folds"].as_array().unwrap().len(), 3);
    assert_eq!(json["config"]["data"]["target_column"], "_status");

    let summary = std::fs::read_to_string(&outputs.summary_txt).unwrap();
    assert!(summary.contains("Features were selected using a k-best (f_classif) strategy"));
    assert!(summary.contains("RandomForest-Classifier (n_estimators = 10)"));

    let records = sessions.records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("Classifier"), Some("RandomForest"));
    assert_eq!(records[0].get("num_feat_mean"), Some("2.0000"));
    assert!(records[0].get("Date").unwrap().ends_with("(UTC)"));
}

#[test]
fn csv_session_history_grows_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = experiment(dir.path());
    config.report = false;
    let mut sessions = CsvSessionStore::new(dir.path().join("history.csv"));

    runner::run(&config, &mut sessions).unwrap();
    config.run.pipeline.classifier = ClassifierConfig::new(ClassifierKind::LogisticRegression);
    runner::run(&config, &mut sessions).unwrap();

    let records = sessions.records().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].get("Classifier"), Some("LogisticRegression"));
}

#[test]
fn core_errors_surface_with_context() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = experiment(dir.path());
    config.run.cross_validation.n_splits = 10;
    let path = write(
        dir.path(),
        "small.csv",
        "_status,P1\nAD,1\nAD,2\nctrl,3\nctrl,4\nAD,5\nctrl,6\n",
    );
    config.data.data_file = path.to_string_lossy().to_string();
    let err = runner::run(&config, &mut InMemorySessionStore::new()).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("Cross-validation run failed"));
    assert!(message.contains("samples"), "{}", message);
}
