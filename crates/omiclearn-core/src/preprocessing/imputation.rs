//! Missing-value imputation fitted on a training fold.
use ndarray::{Array2, ArrayView1, Axis};

use crate::config::MissingValueStrategy;
use crate::stats::{nan_mean, nan_median};

/// Neighbours consulted by the KNN imputer.
pub const KNN_NEIGHBORS: usize = 5;

#[derive(Debug, Clone)]
pub enum Imputer {
    /// Leaves missing values in place.
    Passthrough,
    /// One fill value per column.
    Constant(Vec<f64>),
    /// Mean of the `k` nearest training rows that observe the column, by
    /// NaN-aware euclidean distance. Falls back to the column mean.
    Knn {
        k: usize,
        reference: Array2<f64>,
        fallback: Vec<f64>,
    },
}

impl Imputer {
    pub fn fit(strategy: MissingValueStrategy, x: &Array2<f64>) -> Self {
        // Columns without a single observed value impute to zero.
        let per_column = |f: fn(ArrayView1<f64>) -> Option<f64>| -> Vec<f64> {
            x.axis_iter(Axis(1)).map(|col| f(col).unwrap_or(0.0)).collect()
        };
        match strategy {
            MissingValueStrategy::None => Imputer::Passthrough,
            MissingValueStrategy::Zero => Imputer::Constant(vec![0.0; x.ncols()]),
            MissingValueStrategy::Mean => Imputer::Constant(per_column(nan_mean)),
            MissingValueStrategy::Median => Imputer::Constant(per_column(nan_median)),
            MissingValueStrategy::KNNImputer => Imputer::Knn {
                k: KNN_NEIGHBORS,
                reference: x.clone(),
                fallback: per_column(nan_mean),
            },
        }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        match self {
            Imputer::Passthrough => x.clone(),
            Imputer::Constant(fill) => {
                let mut out = x.clone();
                for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
                    col.mapv_inplace(|v| if v.is_nan() { fill[j] } else { v });
                }
                out
            }
            Imputer::Knn {
                k,
                reference,
                fallback,
            } => {
                let mut out = x.clone();
                for (i, row) in x.axis_iter(Axis(0)).enumerate() {
                    if !row.iter().any(|v| v.is_nan()) {
                        continue;
                    }
                    let distances: Vec<f64> = reference
                        .axis_iter(Axis(0))
                        .map(|other| nan_euclidean(row, other))
                        .collect();
                    for j in 0..row.len() {
                        if row[j].is_nan() {
                            out[[i, j]] = knn_fill(reference, &distances, j, *k)
                                .unwrap_or(fallback[j]);
                        }
                    }
                }
                out
            }
        }
    }
}

/// Euclidean distance over the coordinates both rows observe, scaled up by
/// the fraction of coordinates present. Infinite when nothing overlaps.
pub fn nan_euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let mut ss = 0.0;
    let mut present = 0usize;
    for (&u, &v) in a.iter().zip(b.iter()) {
        if !u.is_nan() && !v.is_nan() {
            ss += (u - v).powi(2);
            present += 1;
        }
    }
    if present == 0 {
        return f64::INFINITY;
    }
    (ss * a.len() as f64 / present as f64).sqrt()
}

fn knn_fill(reference: &Array2<f64>, distances: &[f64], col: usize, k: usize) -> Option<f64> {
    let mut donors: Vec<(f64, f64)> = distances
        .iter()
        .enumerate()
        .filter_map(|(r, &d)| {
            let value = reference[[r, col]];
            if d.is_finite() && !value.is_nan() {
                Some((d, value))
            } else {
                None
            }
        })
        .collect();
    if donors.is_empty() {
        return None;
    }
    donors.sort_by(|a, b| a.0.total_cmp(&b.0));
    let take = k.min(donors.len());
    Some(donors[..take].iter().map(|(_, v)| v).sum::<f64>() / take as f64)
}
