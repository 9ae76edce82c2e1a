//! Summaries across folds: pooled and mean curves, confusion matrices,
//! feature-importance ranking and the `<metric>_mean` / `<metric>_std` table.
use std::collections::BTreeMap;

use itertools_num::linspace;
use serde::Serialize;

use crate::cross_validation::FoldResult;
use crate::error::{OmicLearnError, Result};
use crate::metrics::{pr_curve, roc_curve, ConfusionMatrix, FoldMetrics, PrCurve, RocCurve, SCALAR_METRICS};
use crate::stats::{interp, mean, sample_std};

/// Points of the common grid mean curves are interpolated on.
pub const CURVE_GRID_POINTS: usize = 101;

/// Fold curves interpolated on a common grid, averaged, with a one standard
/// deviation band clipped to [0, 1].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MeanCurve {
    pub grid: Vec<f64>,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

impl MeanCurve {
    fn from_interpolated(grid: Vec<f64>, curves: &[Vec<f64>]) -> Self {
        let columns: Vec<Vec<f64>> = (0..grid.len())
            .map(|i| curves.iter().map(|c| c[i]).collect())
            .collect();
        let mean: Vec<f64> = columns.iter().map(|c| mean(c)).collect();
        let std: Vec<f64> = columns.iter().map(|c| sample_std(c)).collect();
        let upper = mean.iter().zip(&std).map(|(m, s)| (m + s).min(1.0)).collect();
        let lower = mean.iter().zip(&std).map(|(m, s)| (m - s).max(0.0)).collect();
        MeanCurve {
            grid,
            mean,
            std,
            upper,
            lower,
        }
    }

    /// Mean true positive rate over a false positive rate grid. The curve is
    /// pinned to (0, 0) and (1, 1).
    pub fn roc(curves: &[&RocCurve]) -> Self {
        let grid: Vec<f64> = linspace(0.0, 1.0, CURVE_GRID_POINTS).collect();
        let interpolated: Vec<Vec<f64>> = curves
            .iter()
            .map(|c| {
                let mut tpr: Vec<f64> = grid.iter().map(|&x| interp(x, &c.fpr, &c.tpr)).collect();
                tpr[0] = 0.0;
                tpr
            })
            .collect();
        let mut curve = MeanCurve::from_interpolated(grid, &interpolated);
        if let Some(last) = curve.mean.last_mut() {
            *last = 1.0;
        }
        curve
    }

    /// Mean precision over a recall grid.
    pub fn pr(curves: &[&PrCurve]) -> Self {
        let grid: Vec<f64> = linspace(0.0, 1.0, CURVE_GRID_POINTS).collect();
        let interpolated: Vec<Vec<f64>> = curves
            .iter()
            .map(|c| grid.iter().map(|&x| interp(x, &c.recall, &c.precision)).collect())
            .collect();
        MeanCurve::from_interpolated(grid, &interpolated)
    }

    /// Trapezoidal area under the mean curve.
    pub fn auc(&self) -> f64 {
        self.grid
            .windows(2)
            .zip(self.mean.windows(2))
            .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LabeledConfusionMatrix {
    pub label: String,
    pub matrix: ConfusionMatrix,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The classifier does not expose importances.
    NotExposed,
    /// Every fold reported only zeros.
    AllZero,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedFeature {
    pub name: String,
    pub mean: f64,
    pub std: f64,
    /// Folds in which the feature was selected.
    pub n_folds_selected: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum FeatureImportance {
    NotAvailable(UnavailableReason),
    /// Sorted by descending mean importance, ties by name.
    Ranked(Vec<RankedFeature>),
}

impl FeatureImportance {
    /// Average each feature's importance over all folds, counting a fold in
    /// which the feature was not selected as zero.
    pub fn aggregate(folds: &[FoldResult]) -> Self {
        if folds.iter().all(|f| f.feature_importances.is_none()) {
            return FeatureImportance::NotAvailable(UnavailableReason::NotExposed);
        }
        let all_zero = folds
            .iter()
            .filter_map(|f| f.feature_importances.as_ref())
            .flatten()
            .all(|(_, v)| *v == 0.0);
        if all_zero {
            return FeatureImportance::NotAvailable(UnavailableReason::AllZero);
        }

        let mut per_feature: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for (fold_idx, fold) in folds.iter().enumerate() {
            for (name, value) in fold.feature_importances.iter().flatten() {
                per_feature
                    .entry(name.as_str())
                    .or_insert_with(|| vec![0.0; folds.len()])[fold_idx] = *value;
            }
        }

        let mut ranked: Vec<RankedFeature> = per_feature
            .into_iter()
            .map(|(name, values)| RankedFeature {
                name: name.to_string(),
                mean: mean(&values),
                std: sample_std(&values),
                n_folds_selected: folds
                    .iter()
                    .filter(|f| f.selected_features.iter().any(|s| s == name))
                    .count(),
            })
            .collect();
        ranked.sort_by(|a, b| b.mean.total_cmp(&a.mean).then_with(|| a.name.cmp(&b.name)));
        FeatureImportance::Ranked(ranked)
    }
}

/// Everything reported for one cross-validation run or one cohort combo.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    pub folds: Vec<FoldMetrics>,
    /// Curves over the predictions of all folds pooled together.
    pub pooled_roc: RocCurve,
    pub pooled_pr: PrCurve,
    pub mean_roc: MeanCurve,
    pub mean_pr: MeanCurve,
    /// The summed matrix first, then one per fold.
    pub confusion_matrices: Vec<LabeledConfusionMatrix>,
    pub feature_importance: FeatureImportance,
    /// `<metric>_mean` and `<metric>_std` for every per-fold scalar; the
    /// standard deviation is the sample one and 0 for a single fold.
    pub statistics: BTreeMap<String, f64>,
}

impl RunSummary {
    pub fn from_folds(folds: &[FoldResult], sum_label: &str) -> Result<Self> {
        if folds.is_empty() {
            return Err(OmicLearnError::InvalidInput("no folds to summarize".to_string()));
        }
        let metrics = folds
            .iter()
            .map(FoldMetrics::from_fold)
            .collect::<Result<Vec<_>>>()?;

        let scores: Vec<f64> = folds.iter().flat_map(|f| f.y_score.iter().copied()).collect();
        let labels: Vec<bool> = folds.iter().flat_map(|f| f.y_true.iter().copied()).collect();
        let pooled_roc = roc_curve(&scores, &labels).map_err(|e| e.in_context(sum_label))?;
        let pooled_pr = pr_curve(&scores, &labels).map_err(|e| e.in_context(sum_label))?;

        let mean_roc = MeanCurve::roc(&metrics.iter().map(|m| &m.roc).collect::<Vec<_>>());
        let mean_pr = MeanCurve::pr(&metrics.iter().map(|m| &m.pr).collect::<Vec<_>>());

        let summed = metrics
            .iter()
            .fold(ConfusionMatrix::default(), |acc, m| acc.add(&m.confusion_matrix));
        let mut confusion_matrices = vec![LabeledConfusionMatrix {
            label: sum_label.to_string(),
            matrix: summed,
        }];
        confusion_matrices.extend(metrics.iter().map(|m| LabeledConfusionMatrix {
            label: m.label.clone(),
            matrix: m.confusion_matrix,
        }));

        let mut statistics = BTreeMap::new();
        for name in SCALAR_METRICS {
            let values: Vec<f64> = metrics.iter().map(|m| m.scalars[name]).collect();
            let (m, s) = (mean(&values), sample_std(&values));
            if !m.is_finite() || !s.is_finite() {
                return Err(OmicLearnError::DegenerateMetric {
                    metric: name.to_string(),
                    context: sum_label.to_string(),
                });
            }
            statistics.insert(format!("{}_mean", name), m);
            statistics.insert(format!("{}_std", name), s);
        }

        Ok(RunSummary {
            folds: metrics,
            pooled_roc,
            pooled_pr,
            mean_roc,
            mean_pr,
            confusion_matrices,
            feature_importance: FeatureImportance::aggregate(folds),
            statistics,
        })
    }

    pub fn summed_confusion_matrix(&self) -> &ConfusionMatrix {
        &self.confusion_matrices[0].matrix
    }

    /// Look up `<metric>_mean` / `<metric>_std`.
    pub fn statistic(&self, key: &str) -> Option<f64> {
        self.statistics.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(label: &str, y_true: Vec<bool>, y_score: Vec<f64>, importances: Option<Vec<(&str, f64)>>) -> FoldResult {
        let y_pred = y_score.iter().map(|&s| s >= 0.5).collect();
        let n_class_0 = y_true.iter().filter(|&&l| l).count();
        let n_class_1 = y_true.len() - n_class_0;
        let feature_importances: Option<Vec<(String, f64)>> =
            importances.map(|v| v.into_iter().map(|(n, x)| (n.to_string(), x)).collect());
        let selected_features = feature_importances
            .as_ref()
            .map(|v| v.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default();
        FoldResult {
            label: label.to_string(),
            y_true,
            y_score,
            y_pred,
            selected_features,
            feature_importances,
            n_class_0,
            n_class_1,
            n_train: 8,
            train_class_ratio: 0.5,
        }
    }

    #[test]
    fn summed_confusion_matrix_comes_first() {
        let folds = vec![
            fold("CV_split 1", vec![true, true, false, false], vec![0.9, 0.4, 0.2, 0.6], None),
            fold("CV_split 2", vec![true, false, true, false], vec![0.8, 0.1, 0.7, 0.3], None),
        ];
        let summary = RunSummary::from_folds(&folds, "Sum of all splits").unwrap();
        assert_eq!(summary.confusion_matrices.len(), 3);
        assert_eq!(summary.confusion_matrices[0].label, "Sum of all splits");
        assert_eq!(summary.summed_confusion_matrix().counts, [[3, 1], [1, 3]]);
        assert_eq!(
            summary.feature_importance,
            FeatureImportance::NotAvailable(UnavailableReason::NotExposed)
        );
    }

    #[test]
    fn statistics_use_sample_std() {
        let folds = vec![
            fold("CV_split 1", vec![true, true, false, false], vec![0.9, 0.4, 0.2, 0.6], None),
            fold("CV_split 2", vec![true, false, true, false], vec![0.8, 0.1, 0.7, 0.3], None),
        ];
        let summary = RunSummary::from_folds(&folds, "Sum of all splits").unwrap();
        // Fold ROC-AUCs are 0.75 and 1.0.
        assert!((summary.statistic("roc_auc_mean").unwrap() - 0.875).abs() < 1e-12);
        let expected_std = (2.0 * 0.125f64.powi(2)).sqrt();
        assert!((summary.statistic("roc_auc_std").unwrap() - expected_std).abs() < 1e-12);
        assert_eq!(summary.statistic("n_obs_mean"), Some(4.0));
        assert_eq!(summary.statistics.len(), 2 * SCALAR_METRICS.len());
    }

    #[test]
    fn mean_roc_is_pinned() {
        let folds = vec![fold("CV_split 1", vec![true, false], vec![0.9, 0.1], None)];
        let summary = RunSummary::from_folds(&folds, "Sum of all splits").unwrap();
        assert_eq!(summary.mean_roc.grid.len(), CURVE_GRID_POINTS);
        assert_eq!(summary.mean_roc.mean[0], 0.0);
        assert_eq!(summary.mean_roc.mean[CURVE_GRID_POINTS - 1], 1.0);
        assert!(summary.mean_roc.std.iter().all(|&s| s == 0.0));
        assert!((summary.mean_roc.auc() - 1.0).abs() < 0.02);
    }

    #[test]
    fn importances_all_zero_are_not_available() {
        let folds = vec![
            fold("CV_split 1", vec![true, false], vec![0.9, 0.1], Some(vec![("A", 0.0), ("B", 0.0)])),
            fold("CV_split 2", vec![true, false], vec![0.9, 0.1], Some(vec![("A", 0.0)])),
        ];
        assert_eq!(
            FeatureImportance::aggregate(&folds),
            FeatureImportance::NotAvailable(UnavailableReason::AllZero)
        );
    }

    #[test]
    fn importances_average_absent_as_zero() {
        let folds = vec![
            fold("CV_split 1", vec![true, false], vec![0.9, 0.1], Some(vec![("X", 0.6), ("Y", 0.4)])),
            fold("CV_split 2", vec![true, false], vec![0.9, 0.1], Some(vec![("X", 0.7), ("Z", 0.3)])),
        ];
        let FeatureImportance::Ranked(ranked) = FeatureImportance::aggregate(&folds) else {
            panic!("expected a ranking");
        };
        let names: Vec<&str> = ranked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["X", "Y", "Z"]);
        assert!((ranked[0].mean - 0.65).abs() < 1e-12);
        assert!((ranked[1].mean - 0.2).abs() < 1e-12);
        assert_eq!(ranked[0].n_folds_selected, 2);
        assert_eq!(ranked[2].n_folds_selected, 1);
    }
}
