//! Per-fold evaluation: ROC and precision-recall curves, the confusion
//! matrix and the scalar metrics of one held-out partition.
//!
//! Class 0 (`true`) is the positive class throughout, and scores are the
//! predicted probability of Class 0.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::cross_validation::FoldResult;
use crate::error::{OmicLearnError, Result};

// ---------------------------------------------------------------------------
// Curves
// ---------------------------------------------------------------------------

/// ROC curve from (0, 0) to (1, 1), one point per distinct score.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    /// Score threshold of each point; the origin has no threshold.
    pub thresholds: Vec<Option<f64>>,
    /// Trapezoidal area under the curve.
    pub auc: f64,
}

/// Precision-recall curve ordered by increasing recall.
///
/// The recall = 0 point carries the prevalence of Class 0 in the evaluated
/// partition as its precision, not 1.0. This is a non-standard baseline
/// convention; the area itself is the step-wise sum of precision times
/// recall increments and does not depend on it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PrCurve {
    pub recall: Vec<f64>,
    pub precision: Vec<f64>,
    pub thresholds: Vec<Option<f64>>,
    pub auc: f64,
}

/// Cumulative (true positive, false positive) counts at each distinct score,
/// walking from the highest score down.
fn threshold_counts(scores: &[f64], labels: &[bool]) -> Vec<(f64, usize, usize)> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut counts = Vec::new();
    let (mut tp, mut fp) = (0, 0);
    let mut i = 0;
    while i < order.len() {
        let current = scores[order[i]];
        while i < order.len() && scores[order[i]] == current {
            if labels[order[i]] {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        counts.push((current, tp, fp));
    }
    counts
}

fn check_inputs(scores: &[f64], labels: &[bool], metric: &str) -> Result<(usize, usize)> {
    if scores.len() != labels.len() {
        return Err(OmicLearnError::InvalidInput(format!(
            "{} scores for {} labels",
            scores.len(),
            labels.len()
        )));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(OmicLearnError::DegenerateMetric {
            metric: metric.to_string(),
            context: "non-finite predicted scores".to_string(),
        });
    }
    let positives = labels.iter().filter(|&&l| l).count();
    Ok((positives, labels.len() - positives))
}

pub fn roc_curve(scores: &[f64], labels: &[bool]) -> Result<RocCurve> {
    let (p, n) = check_inputs(scores, labels, "roc_auc")?;
    if p == 0 || n == 0 {
        return Err(OmicLearnError::EmptyClass {
            context: "evaluation".to_string(),
            detail: "ROC curve needs samples of both classes".to_string(),
        });
    }

    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    let mut thresholds = vec![None];
    for (threshold, tp, fp) in threshold_counts(scores, labels) {
        fpr.push(fp as f64 / n as f64);
        tpr.push(tp as f64 / p as f64);
        thresholds.push(Some(threshold));
    }
    let auc = trapezoidal_auc(&fpr, &tpr);
    Ok(RocCurve {
        fpr,
        tpr,
        thresholds,
        auc,
    })
}

pub fn pr_curve(scores: &[f64], labels: &[bool]) -> Result<PrCurve> {
    let (p, n) = check_inputs(scores, labels, "pr_auc")?;
    if p == 0 {
        return Err(OmicLearnError::EmptyClass {
            context: "evaluation".to_string(),
            detail: "PR curve needs Class 0 samples".to_string(),
        });
    }

    let mut recall = vec![0.0];
    let mut precision = vec![p as f64 / (p + n) as f64];
    let mut thresholds = vec![None];
    let mut auc = 0.0;
    for (threshold, tp, fp) in threshold_counts(scores, labels) {
        let r = tp as f64 / p as f64;
        let prec = tp as f64 / (tp + fp) as f64;
        auc += (r - recall[recall.len() - 1]) * prec;
        recall.push(r);
        precision.push(prec);
        thresholds.push(Some(threshold));
        // Lower thresholds only add false positives at full recall.
        if tp == p {
            break;
        }
    }
    Ok(PrCurve {
        recall,
        precision,
        thresholds,
        auc,
    })
}

fn trapezoidal_auc(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]).abs() * (ys[0] + ys[1]) / 2.0)
        .sum()
}

// ---------------------------------------------------------------------------
// Confusion matrix
// ---------------------------------------------------------------------------

/// 2x2 counts; rows are the true class, columns the predicted class, and
/// index 0 is Class 0.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub counts: [[usize; 2]; 2],
}

fn class_index(label: bool) -> usize {
    if label {
        0
    } else {
        1
    }
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &[bool], y_pred: &[bool]) -> Self {
        let mut counts = [[0; 2]; 2];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            counts[class_index(t)][class_index(p)] += 1;
        }
        ConfusionMatrix { counts }
    }

    pub fn add(&self, other: &ConfusionMatrix) -> ConfusionMatrix {
        let mut counts = self.counts;
        for (row, other_row) in counts.iter_mut().zip(other.counts.iter()) {
            for (c, o) in row.iter_mut().zip(other_row) {
                *c += o;
            }
        }
        ConfusionMatrix { counts }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn true_positives(&self) -> usize {
        self.counts[0][0]
    }

    pub fn false_negatives(&self) -> usize {
        self.counts[0][1]
    }

    pub fn false_positives(&self) -> usize {
        self.counts[1][0]
    }

    pub fn true_negatives(&self) -> usize {
        self.counts[1][1]
    }

    pub fn is_diagonal(&self) -> bool {
        self.false_negatives() == 0 && self.false_positives() == 0
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives() + self.true_negatives(), self.total())
    }

    /// Precision for Class 0; 0 when nothing was predicted as Class 0.
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives(), self.true_positives() + self.false_positives())
    }

    /// Recall (sensitivity) for Class 0.
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives(), self.true_positives() + self.false_negatives())
    }

    pub fn specificity(&self) -> f64 {
        ratio(self.true_negatives(), self.true_negatives() + self.false_positives())
    }

    pub fn balanced_accuracy(&self) -> f64 {
        (self.recall() + self.specificity()) / 2.0
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

// ---------------------------------------------------------------------------
// Fold metrics
// ---------------------------------------------------------------------------

/// Scalar metrics reported per fold, in table order.
pub const SCALAR_METRICS: [&str; 13] = [
    "roc_auc",
    "pr_auc",
    "accuracy",
    "balanced_accuracy",
    "precision",
    "recall",
    "f1",
    "num_feat",
    "n_obs",
    "n_class_0",
    "n_class_1",
    "class_ratio",
    "class_ratio_test",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FoldMetrics {
    pub label: String,
    pub roc: RocCurve,
    pub pr: PrCurve,
    pub confusion_matrix: ConfusionMatrix,
    pub scalars: BTreeMap<String, f64>,
}

impl FoldMetrics {
    /// Evaluate one fold. A non-finite scalar is reported as an error rather
    /// than carried into the summary.
    pub fn from_fold(fold: &FoldResult) -> Result<Self> {
        let roc = roc_curve(&fold.y_score, &fold.y_true).map_err(|e| e.in_context(&fold.label))?;
        let pr = pr_curve(&fold.y_score, &fold.y_true).map_err(|e| e.in_context(&fold.label))?;
        let cm = ConfusionMatrix::from_labels(&fold.y_true, &fold.y_pred);

        let n_obs = fold.y_true.len();
        let values = [
            roc.auc,
            pr.auc,
            cm.accuracy(),
            cm.balanced_accuracy(),
            cm.precision(),
            cm.recall(),
            cm.f1(),
            fold.selected_features.len() as f64,
            n_obs as f64,
            fold.n_class_0 as f64,
            fold.n_class_1 as f64,
            fold.train_class_ratio,
            ratio(fold.n_class_0, n_obs),
        ];

        let mut scalars = BTreeMap::new();
        for (name, value) in SCALAR_METRICS.iter().zip(values) {
            if !value.is_finite() {
                return Err(OmicLearnError::DegenerateMetric {
                    metric: name.to_string(),
                    context: fold.label.clone(),
                });
            }
            scalars.insert(name.to_string(), value);
        }

        Ok(FoldMetrics {
            label: fold.label.clone(),
            roc,
            pr,
            confusion_matrix: cm,
            scalars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roc_perfect_separator() {
        let roc = roc_curve(&[0.9, 0.8, 0.3, 0.1], &[true, true, false, false]).unwrap();
        assert_eq!(roc.auc, 1.0);
        assert_eq!(roc.fpr.first(), Some(&0.0));
        assert_eq!(roc.tpr.last(), Some(&1.0));
        assert_eq!(roc.fpr.last(), Some(&1.0));
    }

    #[test]
    fn roc_inverted_and_tied_scores() {
        let inverted = roc_curve(&[0.1, 0.2, 0.8, 0.9], &[true, true, false, false]).unwrap();
        assert_eq!(inverted.auc, 0.0);

        // One tie group: a single diagonal step.
        let tied = roc_curve(&[0.5; 4], &[true, false, true, false]).unwrap();
        assert_eq!(tied.fpr, vec![0.0, 1.0]);
        assert!((tied.auc - 0.5).abs() < 1e-12);
    }

    #[test]
    fn roc_known_value() {
        // 3 of the 4 positive/negative pairs are ordered correctly.
        let roc = roc_curve(&[0.9, 0.6, 0.7, 0.1], &[true, true, false, false]).unwrap();
        assert!((roc.auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn roc_requires_both_classes() {
        assert!(matches!(
            roc_curve(&[0.2, 0.4], &[true, true]),
            Err(OmicLearnError::EmptyClass { .. })
        ));
    }

    #[test]
    fn pr_perfect_separator_and_baseline() {
        let pr = pr_curve(&[0.9, 0.8, 0.3, 0.1], &[true, true, false, false]).unwrap();
        assert_eq!(pr.auc, 1.0);
        assert_eq!(pr.recall[0], 0.0);
        assert_eq!(pr.precision[0], 0.5);
        assert_eq!(pr.recall.last(), Some(&1.0));
    }

    #[test]
    fn pr_auc_is_step_wise() {
        // Thresholds: 0.9 -> (r 0.5, p 1.0), 0.7 -> (0.5, 0.5), 0.6 -> (1.0, 2/3)
        let pr = pr_curve(&[0.9, 0.6, 0.7, 0.1], &[true, true, false, false]).unwrap();
        assert!((pr.auc - (0.5 * 1.0 + 0.5 * 2.0 / 3.0)).abs() < 1e-12);
        assert!(pr.auc >= 0.0 && pr.auc <= 1.0);
        assert_eq!(pr.recall.len(), 4);
    }

    #[test]
    fn non_finite_scores_are_degenerate() {
        assert!(matches!(
            roc_curve(&[f64::NAN, 0.1], &[true, false]),
            Err(OmicLearnError::DegenerateMetric { .. })
        ));
    }

    #[test]
    fn confusion_matrix_layout() {
        let cm = ConfusionMatrix::from_labels(
            &[true, true, true, false, false],
            &[true, false, true, true, false],
        );
        assert_eq!(cm.counts, [[2, 1], [1, 1]]);
        assert_eq!(cm.total(), 5);
        assert!((cm.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((cm.recall() - 2.0 / 3.0).abs() < 1e-12);
        assert!((cm.balanced_accuracy() - (2.0 / 3.0 + 0.5) / 2.0).abs() < 1e-12);
        assert_eq!(cm.add(&cm).counts, [[4, 2], [2, 2]]);
    }

    #[test]
    fn precision_without_class0_predictions_is_zero() {
        let cm = ConfusionMatrix::from_labels(&[true, false], &[false, false]);
        assert_eq!(cm.precision(), 0.0);
        assert_eq!(cm.f1(), 0.0);
    }
}
