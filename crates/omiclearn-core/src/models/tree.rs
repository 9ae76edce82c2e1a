//! Weighted binary classification tree shared by the tree-based classifiers
//! and the ExtraTrees feature selector.
//!
//! Leaves store the weighted fraction of Class 0 samples, so a tree predicts
//! the Class 0 probability directly.
use ndarray::{Array2, ArrayView1};
use rand::seq::index::sample;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::config::Criterion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStrategy {
    /// Best threshold over every distinct value of each candidate feature.
    Best,
    /// One uniformly drawn threshold per candidate feature (extremely
    /// randomized trees).
    Random,
}

#[derive(Debug, Clone)]
pub struct TreeParams {
    pub criterion: Criterion,
    pub strategy: SplitStrategy,
    /// Candidate features per split, already resolved against the column
    /// count.
    pub max_features: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

impl TreeParams {
    pub fn new(criterion: Criterion, strategy: SplitStrategy, max_features: usize) -> Self {
        TreeParams {
            criterion,
            strategy,
            max_features,
            max_depth: None,
            min_samples_split: 2,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf {
        proba: f64,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    root: TreeNode,
    /// Weighted impurity decrease accumulated per feature, not normalized.
    impurity_decrease: Vec<f64>,
}

struct Builder<'a> {
    x: &'a Array2<f64>,
    y: &'a [bool],
    weights: &'a [f64],
    params: &'a TreeParams,
    importances: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ClassWeights {
    class0: f64,
    class1: f64,
}

impl ClassWeights {
    fn add(&mut self, is_class0: bool, w: f64) {
        if is_class0 {
            self.class0 += w;
        } else {
            self.class1 += w;
        }
    }

    fn total(&self) -> f64 {
        self.class0 + self.class1
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        let p0 = self.class0 / total;
        let p1 = self.class1 / total;
        match criterion {
            Criterion::Gini => 1.0 - p0 * p0 - p1 * p1,
            Criterion::Entropy => [p0, p1]
                .iter()
                .filter(|&&p| p > 0.0)
                .map(|&p| -p * p.log2())
                .sum(),
        }
    }
}

struct Candidate {
    feature_idx: usize,
    threshold: f64,
    decrease: f64,
}

impl DecisionTree {
    /// Grow a tree on the rows listed in `indices` (duplicates allowed, as in
    /// a bootstrap sample).
    pub fn fit(
        x: &Array2<f64>,
        y: &[bool],
        weights: &[f64],
        indices: Vec<usize>,
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let mut builder = Builder {
            x,
            y,
            weights,
            params,
            importances: vec![0.0; x.ncols()],
        };
        let root = builder.grow(indices, 0, rng);
        DecisionTree {
            root,
            impurity_decrease: builder.importances,
        }
    }

    /// Class 0 probability for one sample.
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { proba } => return *proba,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature_idx] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    /// Impurity-based importances summing to one, or all zeros for a tree
    /// without splits.
    pub fn feature_importances(&self) -> Vec<f64> {
        normalize(&self.impurity_decrease)
    }
}

pub(crate) fn normalize(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter().map(|v| v / total).collect()
    } else {
        vec![0.0; values.len()]
    }
}

impl<'a> Builder<'a> {
    fn class_weights(&self, indices: &[usize]) -> ClassWeights {
        let mut cw = ClassWeights::default();
        for &i in indices {
            cw.add(self.y[i], self.weights[i]);
        }
        cw
    }

    fn grow(&mut self, indices: Vec<usize>, depth: usize, rng: &mut ChaCha8Rng) -> TreeNode {
        let node = self.class_weights(&indices);
        let proba = if node.total() > 0.0 {
            node.class0 / node.total()
        } else {
            0.5
        };

        let should_stop = indices.len() < self.params.min_samples_split
            || self.params.max_depth.map_or(false, |d| depth >= d)
            || node.class0 <= 0.0
            || node.class1 <= 0.0;
        if should_stop {
            return TreeNode::Leaf { proba };
        }

        let Some(best) = self.find_split(&indices, node, rng) else {
            return TreeNode::Leaf { proba };
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.x[[i, best.feature_idx]] <= best.threshold);
        if left.is_empty() || right.is_empty() {
            return TreeNode::Leaf { proba };
        }

        self.importances[best.feature_idx] += best.decrease.max(0.0);
        let left = Box::new(self.grow(left, depth + 1, rng));
        let right = Box::new(self.grow(right, depth + 1, rng));
        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
        }
    }

    fn find_split(
        &self,
        indices: &[usize],
        node: ClassWeights,
        rng: &mut ChaCha8Rng,
    ) -> Option<Candidate> {
        let n_features = self.x.ncols();
        let k = self.params.max_features.clamp(1, n_features);
        let features = sample(rng, n_features, k).into_vec();
        let node_impurity = node.total() * node.impurity(self.params.criterion);

        let mut best: Option<Candidate> = None;
        for feature_idx in features {
            let candidate = match self.params.strategy {
                SplitStrategy::Best => self.best_threshold(indices, feature_idx, node, node_impurity),
                SplitStrategy::Random => {
                    self.random_threshold(indices, feature_idx, node_impurity, rng)
                }
            };
            if let Some(c) = candidate {
                if best.as_ref().map_or(true, |b| c.decrease > b.decrease) {
                    best = Some(c);
                }
            }
        }
        best
    }

    fn best_threshold(
        &self,
        indices: &[usize],
        feature_idx: usize,
        node: ClassWeights,
        node_impurity: f64,
    ) -> Option<Candidate> {
        let mut order: Vec<(f64, usize)> = indices
            .iter()
            .map(|&i| (self.x[[i, feature_idx]], i))
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0));

        let criterion = self.params.criterion;
        let mut left = ClassWeights::default();
        let mut best: Option<Candidate> = None;
        for pos in 0..order.len() - 1 {
            let (value, i) = order[pos];
            left.add(self.y[i], self.weights[i]);
            let next = order[pos + 1].0;
            if next <= value || value.is_nan() || next.is_nan() {
                continue;
            }
            let right = ClassWeights {
                class0: node.class0 - left.class0,
                class1: node.class1 - left.class1,
            };
            let decrease = node_impurity
                - left.total() * left.impurity(criterion)
                - right.total() * right.impurity(criterion);
            if best.as_ref().map_or(true, |b| decrease > b.decrease) {
                best = Some(Candidate {
                    feature_idx,
                    threshold: value + (next - value) / 2.0,
                    decrease,
                });
            }
        }
        best
    }

    fn random_threshold(
        &self,
        indices: &[usize],
        feature_idx: usize,
        node_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<Candidate> {
        let (lo, hi) = indices
            .iter()
            .map(|&i| self.x[[i, feature_idx]])
            .filter(|v| !v.is_nan())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if !(hi > lo) {
            return None;
        }
        let threshold = rng.gen_range(lo..hi);

        let mut left = ClassWeights::default();
        let mut right = ClassWeights::default();
        for &i in indices {
            if self.x[[i, feature_idx]] <= threshold {
                left.add(self.y[i], self.weights[i]);
            } else {
                right.add(self.y[i], self.weights[i]);
            }
        }
        let criterion = self.params.criterion;
        Some(Candidate {
            feature_idx,
            threshold,
            decrease: node_impurity
                - left.total() * left.impurity(criterion)
                - right.total() * right.impurity(criterion),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn fit(x: &Array2<f64>, y: &[bool], params: &TreeParams) -> DecisionTree {
        let weights = vec![1.0; y.len()];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        DecisionTree::fit(x, y, &weights, (0..y.len()).collect(), params, &mut rng)
    }

    #[test]
    fn separates_on_informative_feature() {
        let x = array![[0.0, 5.0], [1.0, 3.0], [2.0, 5.0], [3.0, 3.0]];
        let y = [true, true, false, false];
        let params = TreeParams::new(Criterion::Gini, SplitStrategy::Best, 2);
        let tree = fit(&x, &y, &params);
        assert_eq!(tree.predict_row(x.row(0)), 1.0);
        assert_eq!(tree.predict_row(x.row(3)), 0.0);
        assert_eq!(tree.feature_importances(), vec![1.0, 0.0]);
    }

    #[test]
    fn depth_limit_yields_leaf_probabilities() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let y = [true, true, false, true, false];
        let params = TreeParams::new(Criterion::Entropy, SplitStrategy::Best, 1).with_max_depth(0);
        let tree = fit(&x, &y, &params);
        assert!((tree.predict_row(x.row(0)) - 0.6).abs() < 1e-12);
        assert_eq!(tree.feature_importances(), vec![0.0]);
    }

    #[test]
    fn sample_weights_shift_leaf_values() {
        let x = array![[0.0], [0.0], [0.0]];
        let y = [true, false, false];
        let weights = [2.0, 1.0, 1.0];
        let params = TreeParams::new(Criterion::Gini, SplitStrategy::Best, 1);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let tree = DecisionTree::fit(&x, &y, &weights, vec![0, 1, 2], &params, &mut rng);
        assert!((tree.predict_row(x.row(0)) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn random_splits_still_fit_training_data() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let y = [true, true, true, false, false, false];
        let params = TreeParams::new(Criterion::Gini, SplitStrategy::Random, 1);
        let tree = fit(&x, &y, &params);
        for (i, &label) in y.iter().enumerate() {
            assert_eq!(tree.predict_row(x.row(i)) >= 0.5, label);
        }
    }
}
