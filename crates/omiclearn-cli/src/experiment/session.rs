use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use omiclearn_core::metrics::SCALAR_METRICS;
use omiclearn_core::ExperimentResult;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::experiment::input::ExperimentConfig;
use crate::experiment::summary::format_classifier_params;

/// One row of the session history: the run settings followed by every
/// `<metric>_mean` / `<metric>_std` statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub fields: Vec<(String, String)>,
}

impl SessionRecord {
    pub fn from_run(config: &ExperimentConfig, result: &ExperimentResult, date: DateTime<Utc>) -> Self {
        let data = &config.data;
        let pipeline = &config.run.pipeline;
        let cv = &config.run.cross_validation;
        let mut fields: Vec<(String, String)> = vec![
            ("Date".into(), format!("{} (UTC)", date.format("%d/%m/%Y %H:%M:%S"))),
            ("Data file".into(), data.data_file.clone()),
            ("Target column".into(), data.target_column.clone()),
            ("Class 0".into(), data.class_0.join(";")),
            ("Class 1".into(), data.class_1.join(";")),
            ("Cohort column".into(), data.cohort_column.clone().unwrap_or_default()),
            ("Normalization".into(), pipeline.normalization.to_string()),
            ("Missing value imputation".into(), pipeline.missing_values.to_string()),
            ("Feature selection".into(), pipeline.feature_selection.method.to_string()),
            ("Maximum features".into(), pipeline.feature_selection.max_features.to_string()),
            ("Classifier".into(), pipeline.classifier.kind.to_string()),
            ("Classifier parameters".into(), format_classifier_params(&pipeline.classifier.params)),
            ("Cross-validation".into(), cv.scheme.to_string()),
            ("Splits".into(), cv.n_splits.to_string()),
            ("Repeats".into(), cv.n_repeats.to_string()),
            ("Random state".into(), pipeline.random_state.to_string()),
        ];
        let statistics = &result.cross_validation.statistics;
        for metric in SCALAR_METRICS {
            for suffix in ["mean", "std"] {
                let key = format!("{}_{}", metric, suffix);
                let value = statistics.get(&key).map(|v| format!("{:.4}", v)).unwrap_or_default();
                fields.push((key, value));
            }
        }
        SessionRecord { fields }
    }

    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_str())
    }
}

/// Where finished runs are recorded. The CLI appends one record per run.
pub trait SessionStore {
    fn append(&mut self, record: &SessionRecord) -> Result<()>;
    fn records(&self) -> Result<Vec<SessionRecord>>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    records: Vec<SessionRecord>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn append(&mut self, record: &SessionRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn records(&self) -> Result<Vec<SessionRecord>> {
        Ok(self.records.clone())
    }
}

/// Session history kept as a CSV file; the header is written with the first
/// record and later records must have the same columns.
#[derive(Debug, Clone)]
pub struct CsvSessionStore {
    path: PathBuf,
}

impl CsvSessionStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        CsvSessionStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn existing_header(&self) -> Result<Option<Vec<String>>> {
        let is_empty = std::fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        if is_empty {
            return Ok(None);
        }
        let mut rdr = ReaderBuilder::new()
            .from_path(&self.path)
            .with_context(|| format!("Failed to open session history: {:?}", self.path))?;
        let header = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        Ok(Some(header))
    }
}

impl SessionStore for CsvSessionStore {
    fn append(&mut self, record: &SessionRecord) -> Result<()> {
        let header = self.existing_header()?;
        if let Some(header) = &header {
            if header.iter().map(String::as_str).ne(record.columns()) {
                anyhow::bail!(
                    "Session history {:?} has different columns; use a new history file",
                    self.path
                );
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open session history: {:?}", self.path))?;
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
        if header.is_none() {
            wtr.write_record(record.columns())?;
        }
        wtr.write_record(record.fields.iter().map(|(_, v)| v.as_str()))?;
        wtr.flush()?;
        Ok(())
    }

    fn records(&self) -> Result<Vec<SessionRecord>> {
        if self.existing_header()?.is_none() {
            return Ok(Vec::new());
        }
        let mut rdr = ReaderBuilder::new()
            .from_path(&self.path)
            .with_context(|| format!("Failed to open session history: {:?}", self.path))?;
        let header: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        let mut records = Vec::new();
        for row in rdr.records() {
            let row = row?;
            let fields = header
                .iter()
                .cloned()
                .zip(row.iter().map(|v| v.to_string()))
                .collect();
            records.push(SessionRecord { fields });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, auc: &str) -> SessionRecord {
        SessionRecord {
            fields: vec![
                ("Date".to_string(), date.to_string()),
                ("roc_auc_mean".to_string(), auc.to_string()),
            ],
        }
    }

    #[test]
    fn csv_store_writes_the_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvSessionStore::new(dir.path().join("session_history.csv"));
        store.append(&record("01/01/2026 10:00:00 (UTC)", "0.9100")).unwrap();
        store.append(&record("02/01/2026 10:00:00 (UTC)", "0.8800")).unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.matches("roc_auc_mean").count(), 1);
        let records = store.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("roc_auc_mean"), Some("0.8800"));
    }

    #[test]
    fn csv_store_rejects_other_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvSessionStore::new(dir.path().join("history.csv"));
        store.append(&record("d", "1")).unwrap();
        let other = SessionRecord {
            fields: vec![("Date".to_string(), "d".to_string())],
        };
        assert!(store.append(&other).is_err());
    }

    #[test]
    fn in_memory_store_keeps_order() {
        let mut store = InMemorySessionStore::new();
        store.append(&record("a", "1")).unwrap();
        store.append(&record("b", "2")).unwrap();
        let dates: Vec<String> = store
            .records()
            .unwrap()
            .iter()
            .filter_map(|r| r.get("Date").map(str::to_string))
            .collect();
        assert_eq!(dates, vec!["a", "b"]);
    }
}
