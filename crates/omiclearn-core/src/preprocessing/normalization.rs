//! Column-wise normalization fitted on a training fold.
//!
//! Every normalizer learns its statistics from the non-missing training
//! values only and leaves missing values missing when transforming.
use itertools_num::linspace;
use ndarray::{Array2, ArrayView1, Axis};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::config::{Normalization, OutputDistribution, PowerMethod};
use crate::error::{OmicLearnError, Result};
use crate::stats::{nan_mean, nan_median, nan_std, quantile_sorted, sorted_finite};

const STAGE: &str = "normalization";

/// Lower bound on a learned scale, to avoid division by zero on constant
/// columns.
const MIN_SCALE: f64 = 1e-6;

/// Clip applied to uniform quantiles before the normal quantile function.
const BOUNDS_THRESHOLD: f64 = 1e-7;

const LAMBDA_BOUNDS: (f64, f64) = (-5.0, 5.0);

#[derive(Debug, Clone)]
pub enum Normalizer {
    Identity,
    /// `(x - center) / scale`, covering the standard, min-max and robust
    /// scalers.
    Affine { center: Vec<f64>, scale: Vec<f64> },
    /// Per-column power transform followed by standardization.
    Power {
        method: PowerMethod,
        lambdas: Vec<f64>,
        center: Vec<f64>,
        scale: Vec<f64>,
    },
    /// Maps each value through the empirical training CDF.
    Quantile {
        quantiles: Vec<Vec<f64>>,
        references: Vec<Vec<f64>>,
        output: Option<Normal>,
    },
}

impl Normalizer {
    pub fn fit(config: &Normalization, x: &Array2<f64>) -> Result<Self> {
        let fitted = match *config {
            Normalization::None => Normalizer::Identity,
            Normalization::StandardScaler => {
                let (center, scale) = standard_params(x);
                Normalizer::Affine { center, scale }
            }
            Normalization::MinMaxScaler => {
                let mut center = Vec::with_capacity(x.ncols());
                let mut scale = Vec::with_capacity(x.ncols());
                for col in x.axis_iter(Axis(1)) {
                    let sorted = sorted_finite(col);
                    let (lo, hi) = match (sorted.first(), sorted.last()) {
                        (Some(&lo), Some(&hi)) => (lo, hi),
                        _ => (0.0, 1.0),
                    };
                    center.push(lo);
                    scale.push(safe_scale(hi - lo));
                }
                Normalizer::Affine { center, scale }
            }
            Normalization::RobustScaler => {
                let mut center = Vec::with_capacity(x.ncols());
                let mut scale = Vec::with_capacity(x.ncols());
                for col in x.axis_iter(Axis(1)) {
                    let sorted = sorted_finite(col);
                    center.push(quantile_sorted(&sorted, 0.5).unwrap_or(0.0));
                    let iqr = match (quantile_sorted(&sorted, 0.25), quantile_sorted(&sorted, 0.75)) {
                        (Some(q1), Some(q3)) => q3 - q1,
                        _ => 1.0,
                    };
                    scale.push(safe_scale(iqr));
                }
                Normalizer::Affine { center, scale }
            }
            Normalization::PowerTransformer { power_method } => {
                if power_method == PowerMethod::BoxCox {
                    ensure_positive(x)?;
                }
                let lambdas: Vec<f64> = x
                    .axis_iter(Axis(1))
                    .map(|col| optimal_lambda(power_method, col))
                    .collect();
                let transformed = apply_power(x, power_method, &lambdas);
                let (center, scale) = standard_params(&transformed);
                Normalizer::Power {
                    method: power_method,
                    lambdas,
                    center,
                    scale,
                }
            }
            Normalization::QuantileTransformer {
                n_quantiles,
                output_distribution,
            } => {
                let mut quantiles = Vec::with_capacity(x.ncols());
                let mut references = Vec::with_capacity(x.ncols());
                for col in x.axis_iter(Axis(1)) {
                    let sorted = sorted_finite(col);
                    let n_q = n_quantiles.min(sorted.len());
                    let refs: Vec<f64> = match n_q {
                        0 => Vec::new(),
                        1 => vec![0.5],
                        _ => linspace(0.0, 1.0, n_q).collect(),
                    };
                    let qs = refs
                        .iter()
                        .filter_map(|&p| quantile_sorted(&sorted, p))
                        .collect();
                    quantiles.push(qs);
                    references.push(refs);
                }
                let output = match output_distribution {
                    OutputDistribution::Uniform => None,
                    OutputDistribution::Normal => Some(
                        Normal::new(0.0, 1.0).map_err(|e| OmicLearnError::fit(STAGE, e.to_string()))?,
                    ),
                };
                Normalizer::Quantile {
                    quantiles,
                    references,
                    output,
                }
            }
        };
        log::trace!("fitted {:?} normalizer on {} columns", config, x.ncols());
        Ok(fitted)
    }

    /// Apply the fitted statistics to `x`. Box-Cox is only defined for
    /// strictly positive values, on held-out data as well as on the fold it
    /// was fitted on.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let out = match self {
            Normalizer::Identity => x.clone(),
            Normalizer::Affine { center, scale } => affine(x, center, scale),
            Normalizer::Power {
                method,
                lambdas,
                center,
                scale,
            } => {
                if *method == PowerMethod::BoxCox {
                    ensure_positive(x)?;
                }
                affine(&apply_power(x, *method, lambdas), center, scale)
            }
            Normalizer::Quantile {
                quantiles,
                references,
                output,
            } => {
                let mut out = x.clone();
                for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
                    for v in col.iter_mut() {
                        if v.is_nan() {
                            continue;
                        }
                        let p = empirical_cdf(*v, &quantiles[j], &references[j]);
                        *v = match output {
                            Some(normal) => normal
                                .inverse_cdf(p.clamp(BOUNDS_THRESHOLD, 1.0 - BOUNDS_THRESHOLD)),
                            None => p,
                        };
                    }
                }
                out
            }
        };
        Ok(out)
    }
}

fn ensure_positive(x: &Array2<f64>) -> Result<()> {
    if x.iter().any(|&v| v <= 0.0) {
        return Err(OmicLearnError::fit(
            STAGE,
            "The Box-Cox transformation can only be applied to strictly positive data",
        ));
    }
    Ok(())
}

fn safe_scale(scale: f64) -> f64 {
    if scale.is_finite() && scale > MIN_SCALE {
        scale
    } else {
        1.0
    }
}

fn standard_params(x: &Array2<f64>) -> (Vec<f64>, Vec<f64>) {
    x.axis_iter(Axis(1))
        .map(|col| {
            (
                nan_mean(col).unwrap_or(0.0),
                safe_scale(nan_std(col).unwrap_or(1.0)),
            )
        })
        .unzip()
}

fn affine(x: &Array2<f64>, center: &[f64], scale: &[f64]) -> Array2<f64> {
    let mut out = x.clone();
    for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
        col.mapv_inplace(|v| (v - center[j]) / scale[j]);
    }
    out
}

fn apply_power(x: &Array2<f64>, method: PowerMethod, lambdas: &[f64]) -> Array2<f64> {
    let mut out = x.clone();
    for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
        col.mapv_inplace(|v| power(v, method, lambdas[j]));
    }
    out
}

fn power(v: f64, method: PowerMethod, lambda: f64) -> f64 {
    if v.is_nan() {
        return v;
    }
    match method {
        PowerMethod::BoxCox => {
            if lambda.abs() < 1e-12 {
                v.ln()
            } else {
                (v.powf(lambda) - 1.0) / lambda
            }
        }
        PowerMethod::YeoJohnson => {
            if v >= 0.0 {
                if lambda.abs() < 1e-12 {
                    v.ln_1p()
                } else {
                    ((v + 1.0).powf(lambda) - 1.0) / lambda
                }
            } else if (lambda - 2.0).abs() < 1e-12 {
                -(-v).ln_1p()
            } else {
                -((1.0 - v).powf(2.0 - lambda) - 1.0) / (2.0 - lambda)
            }
        }
    }
}

/// Profile log-likelihood of a power transform for one column.
fn log_likelihood(values: &[f64], method: PowerMethod, lambda: f64) -> f64 {
    let n = values.len() as f64;
    let transformed: Vec<f64> = values.iter().map(|&v| power(v, method, lambda)).collect();
    let mean = transformed.iter().sum::<f64>() / n;
    let var = transformed.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;
    let jacobian: f64 = match method {
        PowerMethod::BoxCox => values.iter().map(|v| v.ln()).sum(),
        PowerMethod::YeoJohnson => values.iter().map(|v| v.signum() * v.abs().ln_1p()).sum(),
    };
    -n / 2.0 * var.ln() + (lambda - 1.0) * jacobian
}

/// Maximum-likelihood lambda by golden-section search.
fn optimal_lambda(method: PowerMethod, col: ArrayView1<f64>) -> f64 {
    let values = sorted_finite(col);
    match (values.first(), values.last()) {
        (Some(lo), Some(hi)) if hi - lo > f64::EPSILON => {}
        _ => return 1.0,
    }

    let ratio = (5f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = LAMBDA_BOUNDS;
    let mut c = b - ratio * (b - a);
    let mut d = a + ratio * (b - a);
    let mut fc = log_likelihood(&values, method, c);
    let mut fd = log_likelihood(&values, method, d);
    for _ in 0..100 {
        if (b - a).abs() < 1e-8 {
            break;
        }
        // NaN likelihoods compare false and shrink towards the lower end.
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - ratio * (b - a);
            fc = log_likelihood(&values, method, c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + ratio * (b - a);
            fd = log_likelihood(&values, method, d);
        }
    }
    (a + b) / 2.0
}

/// Position of `v` on the training CDF, averaging over tied quantiles.
fn empirical_cdf(v: f64, quantiles: &[f64], references: &[f64]) -> f64 {
    if quantiles.is_empty() {
        return 0.5;
    }
    let lo = quantiles.partition_point(|&q| q < v);
    let hi = quantiles.partition_point(|&q| q <= v);
    if lo < hi {
        return (references[lo] + references[hi - 1]) / 2.0;
    }
    if lo == 0 {
        return references[0];
    }
    if lo == quantiles.len() {
        return references[quantiles.len() - 1];
    }
    let (q0, q1) = (quantiles[lo - 1], quantiles[lo]);
    let (r0, r1) = (references[lo - 1], references[lo]);
    r0 + (r1 - r0) * (v - q0) / (q1 - q0)
}
