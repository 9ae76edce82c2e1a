//! Cross-validation orchestration.
//!
//! Every fold (or cohort combo) gets a fresh pipeline fitted on its training
//! partition only. Folds run on a dedicated rayon pool and are collected in
//! fold order, so the outcome does not depend on the worker count.
use rayon::prelude::*;
use serde::Serialize;

use crate::aggregate::RunSummary;
use crate::config::{PipelineConfig, RunConfig};
use crate::data_handling::{CohortVector, Dataset, HoldoutPartition, TrainingPartition};
use crate::error::{OmicLearnError, Result};
use crate::pipeline::Pipeline;
use crate::splitter::{FoldSplit, StratifiedSplitter};

pub const SUM_OF_SPLITS: &str = "Sum of all splits";
pub const SUM_OF_COHORTS: &str = "Sum of cohort comparisons";

/// Raw outputs of one fitted and scored fold.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FoldResult {
    pub label: String,
    pub y_true: Vec<bool>,
    /// Predicted probability of Class 0.
    pub y_score: Vec<f64>,
    /// `y_score >= 0.5`.
    pub y_pred: Vec<bool>,
    pub selected_features: Vec<String>,
    /// `None` when the classifier exposes no importances.
    pub feature_importances: Option<Vec<(String, f64)>>,
    /// Class sizes of the held-out partition.
    pub n_class_0: usize,
    pub n_class_1: usize,
    pub n_train: usize,
    /// Class 0 fraction of the training partition.
    pub train_class_ratio: f64,
}

/// Fit a fresh pipeline on `train` and score `test`.
pub fn evaluate_partition(
    label: &str,
    dataset: &Dataset,
    config: &PipelineConfig,
    train: &TrainingPartition,
    test: &HoldoutPartition,
) -> Result<FoldResult> {
    let mut pipeline = Pipeline::new(config, dataset.has_missing_values())?;
    pipeline.fit(train)?;
    let y_score = pipeline.predict_proba(test.x())?.to_vec();
    let y_pred = y_score.iter().map(|&p| p >= 0.5).collect();

    let (train0, _) = train.class_counts();
    let (n_class_0, n_class_1) = test.class_counts();
    log::debug!(
        "{}: trained {} on {} samples, scored {} ({} Class 0 / {} Class 1)",
        label,
        pipeline.classifier_name(),
        train.n_samples(),
        test.n_samples(),
        n_class_0,
        n_class_1
    );

    Ok(FoldResult {
        label: label.to_string(),
        y_true: test.labels().to_vec(),
        y_score,
        y_pred,
        selected_features: pipeline.selected_features(dataset.feature_names())?,
        feature_importances: pipeline.feature_importances(dataset.feature_names())?,
        n_class_0,
        n_class_1,
        n_train: train.n_samples(),
        train_class_ratio: train0 as f64 / train.n_samples() as f64,
    })
}

fn fold_label(split: &FoldSplit, n_splits: usize) -> String {
    format!("CV_split {}", split.repeat() * n_splits + split.fold() + 1)
}

fn build_pool(workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| OmicLearnError::Configuration(format!("could not start {} workers: {}", workers, e)))
}

/// Run the configured cross-validation scheme and collect one result per
/// fold, in fold order.
pub fn cross_validate(dataset: &Dataset, config: &RunConfig) -> Result<Vec<FoldResult>> {
    let splits: Vec<FoldSplit> = StratifiedSplitter::new(
        dataset.labels(),
        &config.cross_validation,
        config.pipeline.random_state,
    )?
    .collect();
    log::info!(
        "{}: {} folds with {} classifier",
        config.cross_validation.scheme,
        splits.len(),
        config.pipeline.classifier.kind
    );

    let pool = build_pool(config.cross_validation.workers)?;
    pool.install(|| {
        splits
            .par_iter()
            .map(|split| {
                let label = fold_label(split, config.cross_validation.n_splits);
                let (train, test) = dataset.partition(split);
                evaluate_partition(&label, dataset, &config.pipeline, &train, &test)
                    .map_err(|e| e.in_context(&label))
            })
            .collect()
    })
}

/// One ordered (train cohort, test cohort) evaluation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CohortComboResult {
    pub train_cohort: String,
    pub test_cohort: String,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CohortComparison {
    /// Ordered pairs of distinct cohorts, in evaluation order.
    pub combos: Vec<(String, String)>,
    pub results: Vec<CohortComboResult>,
    /// Summary over every combo's single fold.
    pub overall: RunSummary,
}

/// Every ordered pair of distinct cohorts, by first appearance.
pub fn cohort_combos(cohorts: &CohortVector) -> Vec<(String, String)> {
    let unique = cohorts.unique();
    let mut combos = Vec::new();
    for a in &unique {
        for b in &unique {
            if a != b {
                combos.push((a.clone(), b.clone()));
            }
        }
    }
    combos
}

/// Train on all of cohort A, test on all of cohort B, for every ordered
/// pair. No k-fold inside a combo.
pub fn compare_cohorts(dataset: &Dataset, cohorts: &CohortVector, config: &RunConfig) -> Result<CohortComparison> {
    let combos = cohort_combos(cohorts);
    if combos.is_empty() {
        return Err(OmicLearnError::Configuration(format!(
            "cohort comparison needs at least two cohorts, found {}",
            cohorts.unique().len()
        )));
    }
    log::info!("Cohort comparison over {} combinations", combos.len());

    let pool = build_pool(config.cross_validation.workers)?;
    let folds: Vec<FoldResult> = pool.install(|| {
        combos
            .par_iter()
            .map(|(a, b)| {
                let label = format!("Train on {}, Test on {}", a, b);
                let result = dataset
                    .cohort_partitions(cohorts, a, b)
                    .and_then(|(train, test)| evaluate_partition(&label, dataset, &config.pipeline, &train, &test));
                result.map_err(|e| e.in_context(&label))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let results = combos
        .iter()
        .zip(&folds)
        .map(|((a, b), fold)| {
            Ok(CohortComboResult {
                train_cohort: a.clone(),
                test_cohort: b.clone(),
                summary: RunSummary::from_folds(std::slice::from_ref(fold), &fold.label)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let overall = RunSummary::from_folds(&folds, SUM_OF_COHORTS)?;

    Ok(CohortComparison {
        combos,
        results,
        overall,
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExperimentResult {
    pub cross_validation: RunSummary,
    pub cohort_comparison: Option<CohortComparison>,
}

/// Validate the inputs, run cross-validation and, when cohorts are given, the
/// cohort comparison.
pub fn run_experiment(dataset: &Dataset, cohorts: Option<&CohortVector>, config: &RunConfig) -> Result<ExperimentResult> {
    config.validate()?;
    let (n0, n1) = dataset.class_counts();
    if n0 == 0 || n1 == 0 {
        return Err(OmicLearnError::EmptyClass {
            context: "dataset".to_string(),
            detail: format!("Class 0 has {} samples and Class 1 has {}", n0, n1),
        });
    }
    if let Some(cohorts) = cohorts {
        if cohorts.len() != dataset.n_samples() {
            return Err(OmicLearnError::InvalidInput(format!(
                "cohort vector has {} entries but the dataset has {} samples",
                cohorts.len(),
                dataset.n_samples()
            )));
        }
    }
    dataset.log_input_data_summary();
    // Rejects an unsupported missing-value setup before any fold starts.
    Pipeline::new(&config.pipeline, dataset.has_missing_values())?;

    let folds = cross_validate(dataset, config)?;
    let cross_validation = RunSummary::from_folds(&folds, SUM_OF_SPLITS)?;
    log::info!(
        "ROC-AUC {:.3} ± {:.3}, PR-AUC {:.3} ± {:.3}",
        cross_validation.statistic("roc_auc_mean").unwrap_or(f64::NAN),
        cross_validation.statistic("roc_auc_std").unwrap_or(f64::NAN),
        cross_validation.statistic("pr_auc_mean").unwrap_or(f64::NAN),
        cross_validation.statistic("pr_auc_std").unwrap_or(f64::NAN)
    );

    let cohort_comparison = cohorts
        .map(|cohorts| compare_cohorts(dataset, cohorts, config))
        .transpose()?;

    Ok(ExperimentResult {
        cross_validation,
        cohort_comparison,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassifierConfig, ClassifierKind, CvScheme, FeatureSelectionConfig, SelectionMethod};
    use ndarray::Array2;

    fn dataset(n: usize) -> Dataset {
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..n {
            let class0 = i % 2 == 0;
            rows.push(if class0 { 2.0 } else { -2.0 } + (i % 7) as f64 * 0.05);
            rows.push(((i * 5) % 11) as f64);
            y.push(class0);
        }
        Dataset::new(
            Array2::from_shape_vec((n, 2), rows).unwrap(),
            y,
            vec!["sep".to_string(), "noise".to_string()],
        )
        .unwrap()
    }

    fn config() -> RunConfig {
        let mut config = RunConfig::default();
        config.pipeline.classifier = ClassifierConfig::new(ClassifierKind::LogisticRegression);
        config.pipeline.feature_selection = FeatureSelectionConfig {
            method: SelectionMethod::None,
            ..FeatureSelectionConfig::default()
        };
        config.cross_validation.scheme = CvScheme::StratifiedKFold;
        config.cross_validation.n_splits = 4;
        config
    }

    #[test]
    fn folds_come_back_in_order() {
        let results = cross_validate(&dataset(40), &config()).unwrap();
        let labels: Vec<&str> = results.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["CV_split 1", "CV_split 2", "CV_split 3", "CV_split 4"]
        );
        assert_eq!(results.iter().map(|r| r.y_true.len()).sum::<usize>(), 40);
    }

    #[test]
    fn cohort_combos_are_ordered_pairs() {
        let cohorts = CohortVector::new(["b", "a", "c", "a"].iter().map(|s| s.to_string()).collect());
        let combos = cohort_combos(&cohorts);
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0], ("b".to_string(), "a".to_string()));
        assert_eq!(combos[1], ("b".to_string(), "c".to_string()));
    }

    #[test]
    fn single_cohort_is_a_configuration_error() {
        let data = dataset(20);
        let cohorts = CohortVector::new(vec!["x".to_string(); 20]);
        assert!(matches!(
            compare_cohorts(&data, &cohorts, &config()),
            Err(OmicLearnError::Configuration(_))
        ));
    }

    #[test]
    fn fit_errors_carry_the_fold() {
        let mut data_rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            data_rows.push(-(i as f64) - 1.0);
            y.push(i % 2 == 0);
        }
        let data = Dataset::new(Array2::from_shape_vec((20, 1), data_rows).unwrap(), y, vec!["neg".to_string()]).unwrap();
        let mut cfg = config();
        cfg.pipeline.normalization = crate::config::Normalization::None;
        cfg.pipeline.feature_selection.method = SelectionMethod::KBestChi2;
        match cross_validate(&data, &cfg) {
            Err(OmicLearnError::Fit { stage, context, .. }) => {
                assert_eq!(stage, "feature selection");
                assert!(context.starts_with("CV_split "), "{}", context);
            }
            other => panic!("expected a fit error, got {:?}", other.map(|r| r.len())),
        }
    }
}
