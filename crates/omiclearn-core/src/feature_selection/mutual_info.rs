//! Mutual information between a continuous feature and the binary class,
//! estimated from k-nearest-neighbour distances (Ross, 2014).
//!
//! Columns are scaled to unit variance and receive a tiny seeded jitter
//! before the neighbour search, so tied measurements (zero-filled cells,
//! binary or label-encoded features) still have distinct distances.
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use statrs::function::gamma::digamma;

/// Neighbours used by the estimator.
pub const MI_NEIGHBORS: usize = 3;

/// Jitter amplitude relative to the mean absolute scaled value (at least 1).
const JITTER: f64 = 1e-10;

/// Mutual information of every column with the class labels, in nats,
/// clipped at zero. `seed` drives the jitter.
pub fn mutual_info_classif(x: &Array2<f64>, y: &[bool], seed: u64) -> Array1<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    x.axis_iter(Axis(1))
        .map(|col| {
            let jittered = scale_and_jitter(col, &mut rng);
            mi_continuous_discrete(&jittered, y, MI_NEIGHBORS)
        })
        .collect()
}

fn scale_and_jitter(col: ArrayView1<f64>, rng: &mut ChaCha8Rng) -> Vec<f64> {
    let n = col.len().max(1) as f64;
    let mean = col.sum() / n;
    let std = (col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    let scale = if std > 0.0 { std } else { 1.0 };
    let scaled: Vec<f64> = col.iter().map(|v| v / scale).collect();
    let amplitude = JITTER * (scaled.iter().map(|v| v.abs()).sum::<f64>() / n).max(1.0);
    scaled
        .into_iter()
        .map(|v| v + amplitude * rng.gen_range(-1.0f64..1.0))
        .collect()
}

/// Distance from `sorted[pos]` to its `k`-th nearest neighbour in `sorted`,
/// excluding itself.
fn kth_neighbor_distance(sorted: &[f64], pos: usize, k: usize) -> f64 {
    let v = sorted[pos];
    let (mut left, mut right) = (pos, pos + 1);
    let mut dist = 0.0;
    for _ in 0..k {
        let dl = if left > 0 { v - sorted[left - 1] } else { f64::INFINITY };
        let dr = if right < sorted.len() { sorted[right] - v } else { f64::INFINITY };
        if dl <= dr {
            dist = dl;
            left -= 1;
        } else {
            dist = dr;
            right += 1;
        }
    }
    dist
}

/// Points of `sorted` strictly closer to `v` than `radius`, `v` included.
/// Distances use the same subtractions as the neighbour search, so the
/// `k`-th neighbour itself is never counted.
fn count_within(sorted: &[f64], v: f64, radius: f64) -> usize {
    let lo = sorted.partition_point(|&a| v - a >= radius);
    let hi = sorted.partition_point(|&a| a - v < radius);
    hi.saturating_sub(lo).max(1)
}

fn mi_continuous_discrete(c: &[f64], y: &[bool], n_neighbors: usize) -> f64 {
    let mut per_class: [Vec<f64>; 2] = [Vec::new(), Vec::new()];
    for (&v, &label) in c.iter().zip(y) {
        per_class[if label { 0 } else { 1 }].push(v);
    }
    // Samples whose label is unique carry no neighbour information; with a
    // single informative class there is nothing to separate.
    if per_class.iter().any(|values| values.len() < 2) {
        return 0.0;
    }
    for values in per_class.iter_mut() {
        values.sort_by(|a, b| a.total_cmp(b));
    }

    let mut all: Vec<f64> = per_class.iter().flatten().copied().collect();
    all.sort_by(|a, b| a.total_cmp(b));
    let n_samples = all.len();

    let mut sum_k = 0.0;
    let mut sum_label = 0.0;
    let mut sum_m = 0.0;
    for values in &per_class {
        let count = values.len();
        let k = n_neighbors.min(count - 1);
        for pos in 0..count {
            let radius = kth_neighbor_distance(values, pos, k);
            let m = count_within(&all, values[pos], radius);
            sum_k += digamma(k as f64);
            sum_label += digamma(count as f64);
            sum_m += digamma(m as f64);
        }
    }

    let n = n_samples as f64;
    let mi = digamma(n) + (sum_k - sum_label - sum_m) / n;
    mi.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn informative_feature_scores_higher() {
        let n = 60;
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..n {
            let class0 = i % 2 == 0;
            rows.push(if class0 { 5.0 } else { 0.0 } + (i as f64 * 0.37).sin());
            rows.push((i as f64 * 1.3).cos());
            y.push(class0);
        }
        let x = Array2::from_shape_vec((n, 2), rows).unwrap();
        let mi = mutual_info_classif(&x, &y, 7);
        // A perfectly separating feature approaches ln(2).
        assert!(mi[0] > 0.5, "{:?}", mi);
        assert!(mi[1] < mi[0]);
        assert!(mi.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn kth_neighbor_excludes_self() {
        let sorted = [0.0, 1.0, 1.5, 4.0];
        assert_eq!(kth_neighbor_distance(&sorted, 1, 1), 0.5);
        assert_eq!(kth_neighbor_distance(&sorted, 1, 2), 1.0);
        assert_eq!(kth_neighbor_distance(&sorted, 0, 3), 4.0);
    }

    #[test]
    fn singleton_class_contributes_nothing() {
        let x = Array2::from_shape_vec((3, 1), vec![0.0, 1.0, 2.0]).unwrap();
        let mi = mutual_info_classif(&x, &[true, false, false], 0);
        assert_eq!(mi[0], 0.0);
    }

    #[test]
    fn tied_binary_separator_beats_integer_noise() {
        let n = 40;
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..n {
            let class0 = i % 2 == 0;
            rows.push(((i * 7) % 11) as f64);
            rows.push(if class0 { 1.0 } else { 0.0 });
            y.push(class0);
        }
        let x = Array2::from_shape_vec((n, 2), rows).unwrap();
        for seed in [0, 7, 23] {
            let mi = mutual_info_classif(&x, &y, seed);
            assert!(mi[1] > 0.5, "{:?}", mi);
            assert!(mi[1] > mi[0], "{:?}", mi);
        }
    }

    #[test]
    fn jitter_is_seeded() {
        let x = Array2::from_shape_vec((6, 1), vec![0.0, 0.0, 1.0, 1.0, 0.0, 1.0]).unwrap();
        let y = [true, true, false, false, true, false];
        assert_eq!(mutual_info_classif(&x, &y, 3), mutual_info_classif(&x, &y, 3));
    }

    #[test]
    fn neighbour_count_excludes_the_kth_point() {
        let sorted = [2.0 - 3e-10, 2.0, 2.0 + 1e-10, 2.0 + 4e-10, 5.0];
        let radius = kth_neighbor_distance(&sorted, 1, 2);
        assert_eq!(count_within(&sorted, 2.0, radius), 2);
    }
}
