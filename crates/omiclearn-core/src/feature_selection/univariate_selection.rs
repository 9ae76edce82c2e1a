//! Univariate feature scores following scikit-learn's API.
//!
//! See: https://scikit-learn.org/stable/modules/feature_selection.html#univariate-feature-selection

use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor};

use crate::error::{OmicLearnError, Result};

const STAGE: &str = "feature selection";

/// Compute row-wise (squared) Euclidean norms of a 2D array.
///
/// # Parameters
///
/// * `x` - A 2D array of shape (n_samples, n_features).
/// * `squared` - Whether to return squared norms.
///
/// # Returns
///
/// An array of shape (n_samples,) containing the row-wise (squared) Euclidean norms.
pub fn row_norms<S>(x: &ArrayBase<S, Ix2>, squared: bool) -> Array1<f64>
where
    S: Data<Elem = f64>,
{
    x.axis_iter(Axis(0))
        .map(|row| {
            let sum_of_squares: f64 = row.iter().map(|&val| val.powi(2)).sum();
            if squared {
                sum_of_squares
            } else {
                sum_of_squares.sqrt()
            }
        })
        .collect()
}

/// Compute Pearson's r between each feature and the target.
///
/// # Parameters
///
/// * `x` - Data matrix of shape (n_samples, n_features).
/// * `y` - Target vector of shape (n_samples,).
/// * `center` - Whether to center `x` and `y` by subtracting their means.
/// * `force_finite` - Replace non-finite coefficients (constant columns)
///   with 0.0.
pub fn r_regression(x: &Array2<f64>, y: &Array1<f64>, center: bool, force_finite: bool) -> Array1<f64> {
    let n_samples = x.nrows() as f64;

    let (y_centered, x_means, x_norms) = if center {
        let y_mean = y.mean().unwrap_or(0.0);
        let x_means = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        // Scaled standard deviations via moments
        let x_squared_norms = row_norms(&x.t(), true);
        let x_norms = (&x_squared_norms - &(x_means.mapv(|m| m.powi(2)) * n_samples))
            .mapv(|v| v.max(0.0).sqrt());
        (y - y_mean, x_means, x_norms)
    } else {
        (y.to_owned(), Array1::zeros(x.ncols()), row_norms(&x.t(), false))
    };

    let mut correlation_coefficient: Array1<f64> = x
        .axis_iter(Axis(1))
        .zip(x_means.iter())
        .map(|(col, &m)| col.iter().zip(y_centered.iter()).map(|(v, yc)| (v - m) * yc).sum())
        .collect();

    let y_norm = y_centered.dot(&y_centered).sqrt();
    correlation_coefficient /= &x_norms;
    correlation_coefficient /= y_norm;

    if force_finite {
        correlation_coefficient.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
    }

    correlation_coefficient
}

/// Univariate linear regression tests returning F-statistics and p-values.
///
/// With a 0/1 class indicator as the target this is the two-class ANOVA F
/// test (`f_classif`).
pub fn f_regression(
    x: &Array2<f64>,
    y: &Array1<f64>,
    center: bool,
    force_finite: bool,
) -> Result<(Array1<f64>, Array1<f64>)> {
    let correlation_coefficient = r_regression(x, y, center, force_finite);
    let deg_of_freedom = y.len() as f64 - if center { 2.0 } else { 1.0 };

    let f_dist = FisherSnedecor::new(1.0, deg_of_freedom).map_err(|e| {
        OmicLearnError::fit(
            STAGE,
            format!("F test needs more samples ({} degrees of freedom): {}", deg_of_freedom, e),
        )
    })?;

    let corr_coef_squared = correlation_coefficient.mapv(|r| r.powi(2));
    let mut f_statistic = &corr_coef_squared / &(1.0 - &corr_coef_squared) * deg_of_freedom;
    let mut p_values = f_statistic.mapv(|f| 1.0 - f_dist.cdf(f));

    if force_finite {
        for (f, p) in f_statistic.iter_mut().zip(p_values.iter_mut()) {
            if f.is_infinite() {
                *f = f64::MAX;
                *p = 0.0;
            } else if f.is_nan() {
                *f = 0.0;
                *p = 1.0;
            }
        }
    }

    Ok((f_statistic, p_values))
}

/// ANOVA F statistic per feature for the two-class problem.
pub fn f_classif(x: &Array2<f64>, y: &[bool]) -> Result<(Array1<f64>, Array1<f64>)> {
    let indicator: Array1<f64> = y.iter().map(|&v| if v { 1.0 } else { 0.0 }).collect();
    f_regression(x, &indicator, true, true)
}

/// Chi-squared statistic between each non-negative feature and the class.
///
/// Features are treated as counts: observed per-class sums are compared with
/// the sums expected from the class frequencies.
pub fn chi2(x: &Array2<f64>, y: &[bool]) -> Result<(Array1<f64>, Array1<f64>)> {
    if x.iter().any(|&v| v < 0.0) {
        return Err(OmicLearnError::fit(STAGE, "Input X must be non-negative."));
    }
    let n = y.len() as f64;
    let n0 = y.iter().filter(|&&v| v).count() as f64;
    let class_prob = [n0 / n, 1.0 - n0 / n];

    let dist = ChiSquared::new(1.0).map_err(|e| OmicLearnError::fit(STAGE, e.to_string()))?;

    let mut scores = Array1::zeros(x.ncols());
    let mut p_values = Array1::ones(x.ncols());
    for (j, col) in x.axis_iter(Axis(1)).enumerate() {
        let mut observed = [0.0, 0.0];
        for (&v, &label) in col.iter().zip(y) {
            observed[if label { 0 } else { 1 }] += v;
        }
        let feature_count = observed[0] + observed[1];
        let stat: f64 = (0..2)
            .map(|c| {
                let expected = class_prob[c] * feature_count;
                if expected > 0.0 {
                    (observed[c] - expected).powi(2) / expected
                } else {
                    f64::NAN
                }
            })
            .sum();
        if stat.is_finite() {
            scores[j] = stat;
            p_values[j] = 1.0 - dist.cdf(stat);
        }
    }
    Ok((scores, p_values))
}

/// Indices of the `k` highest scores, returned in ascending column order.
/// Ties keep the lower column index.
pub fn top_k(scores: &[f64], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&i, &j| {
        let (a, b) = (scores[i], scores[j]);
        b.partial_cmp(&a)
            .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
            .then(i.cmp(&j))
    });
    let mut selected: Vec<usize> = indices.into_iter().take(k).collect();
    selected.sort_unstable();
    selected
}

/// Select the k best features by a univariate score.
pub struct SelectKBest {
    /// The number of top features to select.
    k: usize,
}

impl SelectKBest {
    pub fn new(k: usize) -> Self {
        SelectKBest { k }
    }

    /// Fit on precomputed scores and return the selected column indices.
    pub fn fit(&self, scores: &Array1<f64>) -> Vec<usize> {
        top_k(&scores.to_vec(), self.k.min(scores.len()))
    }
}
