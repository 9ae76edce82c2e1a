use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use ndarray::Array2;
use omiclearn_core::data_handling::{CohortVector, Dataset};
use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::experiment::input::{DataConfig, Delimiter};

/// Cells read as missing values.
const MISSING_TOKENS: [&str; 6] = ["", "na", "nan", "n/a", "null", "none"];

#[derive(Debug)]
pub struct LoadedData {
    pub dataset: Dataset,
    pub cohorts: Option<CohortVector>,
    /// Recoverable problems found while reading, e.g. non-numeric cells.
    pub warnings: Vec<String>,
}

fn is_missing(cell: &str) -> bool {
    MISSING_TOKENS.contains(&cell.to_lowercase().as_str())
}

fn cell(row: &StringRecord, idx: usize) -> &str {
    row.get(idx).unwrap_or("")
}

fn column_index(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .with_context(|| format!("Column '{}' not found in the data file", name))
}

/// Parse a feature column. Missing tokens and non-numeric cells become NaN;
/// the count of the latter is returned.
fn parse_numeric(cells: &[&str]) -> (Vec<f64>, usize) {
    let mut invalid = 0;
    let values = cells
        .iter()
        .map(|cell| {
            if is_missing(cell) {
                f64::NAN
            } else {
                cell.parse::<f64>().unwrap_or_else(|_| {
                    invalid += 1;
                    f64::NAN
                })
            }
        })
        .collect();
    (values, invalid)
}

/// Numeric columns are kept as is; anything else is label-encoded by the
/// sorted unique values (e.g. F/M becomes 0/1). Missing cells stay NaN.
pub fn encode_additional_feature(cells: &[&str]) -> (Vec<f64>, bool) {
    let (values, invalid) = parse_numeric(cells);
    if invalid == 0 {
        return (values, false);
    }
    let categories: Vec<&str> = cells
        .iter()
        .copied()
        .filter(|c| !is_missing(c))
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .collect();
    let encoded = cells
        .iter()
        .map(|cell| match categories.binary_search(cell) {
            Ok(code) if !is_missing(cell) => code as f64,
            _ => f64::NAN,
        })
        .collect();
    (encoded, true)
}

/// Feature names listed in the first column of a comma separated exclusion
/// file, below its header row. Blank entries are skipped.
pub fn read_exclusion_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open exclusion file: {:?}", path))?;
    let mut names: Vec<String> = Vec::new();
    for result in rdr.records() {
        let record = result.with_context(|| format!("Failed to read exclusion file: {:?}", path))?;
        let name = cell(&record, 0);
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Read the data file and build the dataset for the configured classes.
///
/// Only rows whose target value belongs to Class 0 or Class 1 (and, when a
/// subset column is set, whose subset value is kept) are used. Class 0 rows
/// get the label `true`.
pub fn load_experiment_data(config: &DataConfig) -> Result<LoadedData> {
    let path = Path::new(&config.data_file);
    let file = File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;
    let delimiter = config.delimiter.unwrap_or_else(|| Delimiter::from_path(path));

    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter.as_byte())
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(BufReader::new(file));

    let headers = rdr.headers()?.clone();
    let mut seen = HashSet::new();
    for header in headers.iter() {
        if !seen.insert(header) {
            anyhow::bail!("Duplicate column '{}' in the data file", header);
        }
    }

    let mut warnings = Vec::new();
    let target_idx = column_index(&headers, &config.target_column)?;
    let cohort_idx = config
        .cohort_column
        .as_deref()
        .map(|c| column_index(&headers, c))
        .transpose()?;
    let subset_idx = config
        .subset_column
        .as_deref()
        .map(|c| column_index(&headers, c))
        .transpose()?;

    let mut excluded = config.exclude_features.clone();
    if let Some(file) = &config.exclude_file {
        let listed = read_exclusion_file(file)?;
        log::info!("Excluding {} features listed in {}", listed.len(), file);
        excluded.extend(listed.into_iter().filter(|n| !config.exclude_features.contains(n)));
    }
    for name in &excluded {
        if !seen.contains(name.as_str()) {
            warnings.push(format!("Excluded feature '{}' is not a column of the data file", name));
        }
    }
    for name in &config.include_features {
        if !seen.contains(name.as_str()) {
            warnings.push(format!("Selected feature '{}' is not a column of the data file", name));
        }
    }

    let reserved: Vec<usize> = [Some(target_idx), cohort_idx, subset_idx].into_iter().flatten().collect();
    let mut feature_idx: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| !h.starts_with('_') && !reserved.contains(i))
        .filter(|(_, h)| config.include_features.is_empty() || config.include_features.iter().any(|f| f == h))
        .filter(|(_, h)| !excluded.iter().any(|e| e == h))
        .map(|(i, _)| i)
        .collect();

    let mut additional_idx = Vec::with_capacity(config.additional_features.len());
    for name in &config.additional_features {
        let idx = column_index(&headers, name)?;
        if idx == target_idx || Some(idx) == cohort_idx {
            anyhow::bail!("Column '{}' cannot be used as an additional feature", name);
        }
        if !feature_idx.contains(&idx) && !additional_idx.contains(&idx) {
            additional_idx.push(idx);
        }
    }

    let mut rows: Vec<StringRecord> = Vec::new();
    let mut labels = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {} of {:?}", line + 2, path))?;
        if let Some(idx) = subset_idx {
            let value = cell(&record, idx);
            if !config.subset_values.iter().any(|v| v == value) {
                continue;
            }
        }
        let target = cell(&record, target_idx);
        let label = if config.class_0.iter().any(|c| c == target) {
            true
        } else if config.class_1.iter().any(|c| c == target) {
            false
        } else {
            continue;
        };
        labels.push(label);
        rows.push(record);
    }
    if rows.is_empty() {
        anyhow::bail!(
            "No rows of '{}' match Class 0 {:?} or Class 1 {:?}",
            config.target_column,
            config.class_0,
            config.class_1
        );
    }

    let mut names = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();
    feature_idx.retain(|&idx| {
        let cells: Vec<&str> = rows.iter().map(|r| cell(r, idx)).collect();
        let (values, invalid) = parse_numeric(&cells);
        if values.iter().all(|v| v.is_nan()) {
            warnings.push(format!("Feature '{}' has no numeric values and was dropped", &headers[idx]));
            return false;
        }
        if invalid > 0 {
            warnings.push(format!(
                "Feature '{}' has {} non-numeric values, treated as missing",
                &headers[idx], invalid
            ));
        }
        names.push(headers[idx].to_string());
        columns.push(values);
        true
    });
    for &idx in &additional_idx {
        let cells: Vec<&str> = rows.iter().map(|r| cell(r, idx)).collect();
        let (values, encoded) = encode_additional_feature(&cells);
        if encoded {
            log::info!("Additional feature '{}' is non-numeric and was label-encoded", &headers[idx]);
        }
        names.push(headers[idx].to_string());
        columns.push(values);
    }
    if names.is_empty() {
        anyhow::bail!("No feature columns left after exclusions");
    }

    let n_rows = rows.len();
    let n_cols = columns.len();
    let x = Array2::from_shape_fn((n_rows, n_cols), |(i, j)| columns[j][i]);

    let n_missing = x.iter().filter(|v| v.is_nan()).count();
    if n_missing > 0 {
        warnings.push(format!(
            "Found {} missing values. Use missing value imputation or the XGBoost classifier.",
            n_missing
        ));
    }

    let cohorts = match cohort_idx {
        Some(idx) => {
            let values: Vec<String> = rows.iter().map(|r| cell(r, idx).to_string()).collect();
            if let Some(row) = values.iter().position(|v| is_missing(v)) {
                anyhow::bail!(
                    "Sample {} has no value in cohort column '{}'",
                    row + 1,
                    &headers[idx]
                );
            }
            Some(CohortVector::new(values))
        }
        None => None,
    };

    let dataset = Dataset::new(x, labels, names)?;
    log::info!(
        "Loaded {} samples and {} features from {:?}",
        dataset.n_samples(),
        dataset.n_features(),
        path
    );

    Ok(LoadedData {
        dataset,
        cohorts,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorical_values_are_encoded_in_sorted_order() {
        let (values, encoded) = encode_additional_feature(&["M", "F", "", "M"]);
        assert!(encoded);
        assert_eq!(values[0], 1.0);
        assert_eq!(values[1], 0.0);
        assert!(values[2].is_nan());
        assert_eq!(values[3], 1.0);
    }

    #[test]
    fn numeric_additional_features_are_kept() {
        let (values, encoded) = encode_additional_feature(&["61", "NA", "70.5"]);
        assert!(!encoded);
        assert_eq!(values[0], 61.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 70.5);
    }

    #[test]
    fn exclusion_file_lists_first_column_below_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exclude.csv");
        std::fs::write(&path, "feature,reason\nP1,contaminant\n\nP7\nP1,again\n").unwrap();
        assert_eq!(read_exclusion_file(&path).unwrap(), vec!["P1".to_string(), "P7".to_string()]);
    }

    #[test]
    fn missing_tokens_are_case_insensitive() {
        let (values, invalid) = parse_numeric(&["NaN", "null", "1e3", "abc"]);
        assert!(values[0].is_nan() && values[1].is_nan());
        assert_eq!(values[2], 1000.0);
        assert_eq!(invalid, 1);
    }
}
