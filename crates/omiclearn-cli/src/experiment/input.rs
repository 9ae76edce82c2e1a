use anyhow::{Context, Result};
use clap::ArgMatches;
use omiclearn_core::config::{ClassifierConfig, ClassifierKind, CvScheme, MissingValueStrategy, RunConfig, SelectionMethod};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::util::{split_list, validate_delimited_file};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    Comma,
    Semicolon,
    Tab,
}

impl Delimiter {
    /// Tab for `.tsv` files, comma otherwise.
    pub fn from_path(path: &Path) -> Self {
        let is_tsv = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("tsv"))
            .unwrap_or(false);
        if is_tsv {
            Delimiter::Tab
        } else {
            Delimiter::Comma
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Semicolon => b';',
            Delimiter::Tab => b'\t',
        }
    }
}

impl FromStr for Delimiter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "comma" | "," => Ok(Delimiter::Comma),
            "semicolon" | ";" => Ok(Delimiter::Semicolon),
            "tab" | "\\t" => Ok(Delimiter::Tab),
            _ => Err(format!("Unknown delimiter: {}. Valid options are: comma, semicolon, tab", s)),
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Delimiter::Comma => "comma",
            Delimiter::Semicolon => "semicolon",
            Delimiter::Tab => "tab",
        };
        write!(f, "{}", name)
    }
}

/// Which file to read and how its columns map onto features, labels and
/// cohorts. Columns with a leading `_` are metadata; every other column is a
/// feature unless excluded.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    pub data_file: String,
    /// Inferred from the file extension when unset.
    pub delimiter: Option<Delimiter>,
    pub target_column: String,
    pub class_0: Vec<String>,
    pub class_1: Vec<String>,
    pub cohort_column: Option<String>,
    /// Metadata columns used as extra features; non-numeric ones are
    /// label-encoded.
    pub additional_features: Vec<String>,
    /// Manually selected features. When non-empty, only these feature
    /// columns are considered; exclusions still apply on top.
    pub include_features: Vec<String>,
    pub exclude_features: Vec<String>,
    /// Comma separated file whose first column lists further features to
    /// exclude (the first row is a header).
    pub exclude_file: Option<String>,
    pub subset_column: Option<String>,
    pub subset_values: Vec<String>,
}

impl DataConfig {
    pub fn validate(&self) -> Result<()> {
        validate_delimited_file(&self.data_file)?;
        if self.target_column.is_empty() {
            anyhow::bail!("No target column given. Select a classification target with --target.");
        }
        if self.class_0.is_empty() || self.class_1.is_empty() {
            anyhow::bail!("Both classes must be defined. Use --class0 and --class1.");
        }
        if let Some(value) = self.class_0.iter().find(|v| self.class_1.contains(v)) {
            anyhow::bail!("Value '{}' is assigned to both Class 0 and Class 1", value);
        }
        if let Some(file) = &self.exclude_file {
            validate_delimited_file(file).context("Invalid exclusion file")?;
        }
        if self.subset_column.is_none() && !self.subset_values.is_empty() {
            anyhow::bail!("Subset values given without a subset column");
        }
        if self.cohort_column.as_deref() == Some(self.target_column.as_str()) {
            anyhow::bail!("The cohort column cannot be the target column");
        }
        Ok(())
    }
}

/// Everything one `omiclearn run` needs: data selection, the core run
/// configuration and where the outputs go.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ExperimentConfig {
    pub version: String,
    pub data: DataConfig,
    pub run: RunConfig,
    pub output_dir: String,
    pub report: bool,
    /// Session history CSV; defaults to `session_history.csv` in `output_dir`.
    pub session_history: Option<String>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            version: clap::crate_version!().to_string(),
            data: DataConfig::default(),
            run: RunConfig::default(),
            output_dir: String::from("omiclearn_results"),
            report: true,
            session_history: None,
        }
    }
}

pub fn load_experiment_config<P: AsRef<Path>>(path: P) -> Result<ExperimentConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
    let config: ExperimentConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
    Ok(config)
}

impl ExperimentConfig {
    /// Load the optional JSON config and apply command-line overrides.
    pub fn from_arguments(config_path: Option<&PathBuf>, matches: &ArgMatches) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => load_experiment_config(path)?,
            None => ExperimentConfig::default(),
        };
        config.version = clap::crate_version!().to_string();

        let data = &mut config.data;
        if let Some(file) = matches.get_one::<String>("data") {
            data.data_file = file.clone();
        }
        if let Some(target) = matches.get_one::<String>("target") {
            data.target_column = target.clone();
        }
        if let Some(values) = matches.get_one::<String>("class0") {
            data.class_0 = split_list(values);
        }
        if let Some(values) = matches.get_one::<String>("class1") {
            data.class_1 = split_list(values);
        }
        if let Some(cohort) = matches.get_one::<String>("cohort") {
            data.cohort_column = Some(cohort.clone());
        }
        if let Some(columns) = matches.get_one::<String>("additional") {
            data.additional_features = split_list(columns);
        }
        if let Some(columns) = matches.get_one::<String>("features") {
            data.include_features = split_list(columns);
        }
        if let Some(columns) = matches.get_one::<String>("exclude") {
            data.exclude_features = split_list(columns);
        }
        if let Some(file) = matches.get_one::<String>("exclude_file") {
            data.exclude_file = Some(file.clone());
        }
        if let Some(column) = matches.get_one::<String>("subset_column") {
            data.subset_column = Some(column.clone());
        }
        if let Some(values) = matches.get_one::<String>("subset_values") {
            data.subset_values = split_list(values);
        }
        if let Some(delimiter) = matches.get_one::<String>("delimiter") {
            data.delimiter = Some(Delimiter::from_str(delimiter).map_err(anyhow::Error::msg)?);
        }

        if let Some(output) = matches.get_one::<String>("output") {
            config.output_dir = output.clone();
        }
        if matches.get_flag("no_report") {
            config.report = false;
        }

        let run = &mut config.run;
        if let Some(classifier) = matches.get_one::<String>("classifier") {
            let kind = ClassifierKind::from_str(classifier).map_err(anyhow::Error::msg)?;
            if kind != run.pipeline.classifier.kind {
                run.pipeline.classifier = ClassifierConfig::new(kind);
            }
        }
        if let Some(method) = matches.get_one::<String>("feature_selection") {
            run.pipeline.feature_selection.method = SelectionMethod::from_str(method).map_err(anyhow::Error::msg)?;
        }
        if let Some(strategy) = matches.get_one::<String>("missing_values") {
            run.pipeline.missing_values = MissingValueStrategy::from_str(strategy).map_err(anyhow::Error::msg)?;
        }
        if let Some(scheme) = matches.get_one::<String>("cv_method") {
            run.cross_validation.scheme = CvScheme::from_str(scheme).map_err(anyhow::Error::msg)?;
        }
        if let Some(seed) = matches.get_one::<u64>("random_state") {
            run.pipeline.random_state = *seed;
        }
        if let Some(workers) = matches.get_one::<usize>("workers") {
            run.cross_validation.workers = *workers;
        }

        config.data.validate()?;
        config.run.validate().context("Invalid run configuration")?;
        Ok(config)
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        Path::new(&self.output_dir).join(file_name)
    }

    pub fn session_history_path(&self) -> PathBuf {
        match &self.session_history {
            Some(path) => PathBuf::from(path),
            None => self.output_path("session_history.csv"),
        }
    }
}
