//! Data structures for the feature matrix, labels and cohorts, and the
//! fold-restricted partitions handed to the pipeline stages.
//!
//! Labels are booleans: `true` marks Class 0 (the positive class whose
//! probability every classifier reports), `false` marks Class 1.
use std::collections::HashSet;

use ndarray::{Array1, Array2, Axis};

use crate::error::{OmicLearnError, Result};
use crate::splitter::FoldSplit;

#[derive(Debug, Clone)]
pub struct Dataset {
    x: Array2<f64>,
    y: Array1<bool>,
    feature_names: Vec<String>,
}

impl Dataset {
    pub fn new(x: Array2<f64>, y: Vec<bool>, feature_names: Vec<String>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(OmicLearnError::InvalidInput(format!(
                "label vector has {} entries but the feature matrix has {} rows",
                y.len(),
                x.nrows()
            )));
        }
        if x.ncols() != feature_names.len() {
            return Err(OmicLearnError::InvalidInput(format!(
                "{} feature names given for {} columns",
                feature_names.len(),
                x.ncols()
            )));
        }
        let mut seen = HashSet::new();
        for name in &feature_names {
            if !seen.insert(name.as_str()) {
                return Err(OmicLearnError::InvalidInput(format!(
                    "duplicate feature name '{}'",
                    name
                )));
            }
        }

        Ok(Dataset {
            x,
            y: Array1::from_vec(y),
            feature_names,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn labels(&self) -> &Array1<bool> {
        &self.y
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn has_missing_values(&self) -> bool {
        self.x.iter().any(|v| v.is_nan())
    }

    /// Returns `(n_class_0, n_class_1)`.
    pub fn class_counts(&self) -> (usize, usize) {
        class_counts(&self.y)
    }

    pub fn log_input_data_summary(&self) {
        let (n0, n1) = self.class_counts();
        let missing = self.x.iter().filter(|v| v.is_nan()).count();
        log::info!(
            "{} samples ({} Class 0, {} Class 1), {} features, {} missing values",
            self.n_samples(),
            n0,
            n1,
            self.n_features(),
            missing
        );
    }

    /// Restrict the dataset to the train and test indices of one fold.
    pub fn partition(&self, split: &FoldSplit) -> (TrainingPartition, HoldoutPartition) {
        (
            TrainingPartition::new(self.select(split.train())),
            HoldoutPartition::new(self.select(split.test())),
        )
    }

    /// Train on every sample of `train_cohort`, hold out every sample of
    /// `test_cohort`. Both sides must contain both classes.
    pub fn cohort_partitions(
        &self,
        cohorts: &CohortVector,
        train_cohort: &str,
        test_cohort: &str,
    ) -> Result<(TrainingPartition, HoldoutPartition)> {
        if cohorts.len() != self.n_samples() {
            return Err(OmicLearnError::InvalidInput(format!(
                "cohort vector has {} entries but the dataset has {} samples",
                cohorts.len(),
                self.n_samples()
            )));
        }
        let train = self.select(&cohorts.indices_of(train_cohort));
        let test = self.select(&cohorts.indices_of(test_cohort));

        for (role, cohort, part) in [("train", train_cohort, &train), ("test", test_cohort, &test)] {
            let (n0, n1) = class_counts(&part.y);
            if n0 == 0 || n1 == 0 {
                let missing = if n0 == 0 { "Class 0" } else { "Class 1" };
                return Err(OmicLearnError::EmptyClass {
                    context: format!("cohort {}", cohort),
                    detail: format!("{} partition has no {} samples", role, missing),
                });
            }
        }

        Ok((TrainingPartition::new(train), HoldoutPartition::new(test)))
    }

    fn select(&self, indices: &[usize]) -> Partition {
        Partition {
            x: self.x.select(Axis(0), indices),
            y: indices.iter().map(|&i| self.y[i]).collect(),
        }
    }
}

pub(crate) fn class_counts(y: &Array1<bool>) -> (usize, usize) {
    let n0 = y.iter().filter(|&&v| v).count();
    (n0, y.len() - n0)
}

#[derive(Debug, Clone)]
pub(crate) struct Partition {
    x: Array2<f64>,
    y: Array1<bool>,
}

/// Rows of the dataset a pipeline may learn from.
///
/// Only produced from a [`FoldSplit`] or a cohort pair, so stage fitting can
/// never see the full dataset or a test fold.
#[derive(Debug, Clone)]
pub struct TrainingPartition(Partition);

impl TrainingPartition {
    pub(crate) fn new(part: Partition) -> Self {
        TrainingPartition(part)
    }

    #[cfg(test)]
    pub(crate) fn from_arrays(x: Array2<f64>, y: Vec<bool>) -> Self {
        TrainingPartition(Partition {
            x,
            y: Array1::from_vec(y),
        })
    }

    /// Same samples and labels with transformed features, as passed from one
    /// pipeline stage to the next.
    pub(crate) fn with_features(&self, x: Array2<f64>) -> Self {
        TrainingPartition(Partition {
            x,
            y: self.0.y.clone(),
        })
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.0.x
    }

    pub fn labels(&self) -> &Array1<bool> {
        &self.0.y
    }

    pub fn n_samples(&self) -> usize {
        self.0.x.nrows()
    }

    pub fn class_counts(&self) -> (usize, usize) {
        class_counts(&self.0.y)
    }
}

/// Rows of the dataset held out for scoring.
#[derive(Debug, Clone)]
pub struct HoldoutPartition(Partition);

impl HoldoutPartition {
    pub(crate) fn new(part: Partition) -> Self {
        HoldoutPartition(part)
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.0.x
    }

    pub fn labels(&self) -> &Array1<bool> {
        &self.0.y
    }

    pub fn n_samples(&self) -> usize {
        self.0.x.nrows()
    }

    pub fn class_counts(&self) -> (usize, usize) {
        class_counts(&self.0.y)
    }
}

/// One cohort identifier per sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortVector {
    values: Vec<String>,
}

impl CohortVector {
    pub fn new(values: Vec<String>) -> Self {
        CohortVector { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Distinct cohort values in order of first appearance.
    pub fn unique(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.values
            .iter()
            .filter(|v| seen.insert(v.as_str()))
            .cloned()
            .collect()
    }

    pub fn indices_of(&self, cohort: &str) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| if v == cohort { Some(i) } else { None })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy() -> Dataset {
        Dataset::new(
            array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0], [7.0, f64::NAN]],
            vec![true, false, true, false],
            vec!["a".into(), "b".into()],
        )
        .unwrap()
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let err = Dataset::new(array![[1.0], [2.0]], vec![true], vec!["a".into()]);
        assert!(matches!(err, Err(OmicLearnError::InvalidInput(_))));
    }

    #[test]
    fn rejects_duplicate_feature_names() {
        let err = Dataset::new(
            array![[1.0, 2.0]],
            vec![true],
            vec!["a".into(), "a".into()],
        );
        assert!(err.is_err());
    }

    #[test]
    fn partition_follows_split_indices() {
        let data = toy();
        assert!(data.has_missing_values());
        let split = FoldSplit::new(0, 0, vec![0, 1], vec![2, 3]);
        let (train, test) = data.partition(&split);
        assert_eq!(train.x().row(1).to_vec(), vec![3.0, 4.0]);
        assert_eq!(test.labels().to_vec(), vec![true, false]);
        assert_eq!(train.class_counts(), (1, 1));
    }

    #[test]
    fn cohort_order_is_first_appearance() {
        let cohorts = CohortVector::new(vec!["B".into(), "A".into(), "B".into(), "C".into()]);
        assert_eq!(cohorts.unique(), vec!["B", "A", "C"]);
        assert_eq!(cohorts.indices_of("B"), vec![0, 2]);
    }

    #[test]
    fn cohort_partition_without_a_class_is_rejected() {
        let data = toy();
        let cohorts = CohortVector::new(vec!["A".into(), "A".into(), "B".into(), "C".into()]);
        let err = data.cohort_partitions(&cohorts, "A", "B").unwrap_err();
        match err {
            OmicLearnError::EmptyClass { context, .. } => assert_eq!(context, "cohort B"),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
