//! Single decision tree and bootstrap random forest classifiers.
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::{Criterion, MaxFeatures};
use crate::data_handling::TrainingPartition;
use crate::error::Result;
use crate::models::classifier_trait::{not_fitted, ClassifierModel};
use crate::models::tree::{normalize, DecisionTree, SplitStrategy, TreeParams};

pub struct DecisionTreeClassifier {
    criterion: Criterion,
    max_features: MaxFeatures,
    random_state: u64,
    tree: Option<DecisionTree>,
}

impl DecisionTreeClassifier {
    pub fn new(criterion: Criterion, max_features: MaxFeatures, random_state: u64) -> Self {
        DecisionTreeClassifier {
            criterion,
            max_features,
            random_state,
            tree: None,
        }
    }
}

impl ClassifierModel for DecisionTreeClassifier {
    fn fit(&mut self, train: &TrainingPartition) -> Result<()> {
        let x = train.x();
        let y = train.labels().to_vec();
        let params = TreeParams::new(
            self.criterion,
            SplitStrategy::Best,
            self.max_features.resolve(x.ncols()),
        );
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let weights = vec![1.0; y.len()];
        self.tree = Some(DecisionTree::fit(
            x,
            &y,
            &weights,
            (0..y.len()).collect(),
            &params,
            &mut rng,
        ));
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let tree = self.tree.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(x.axis_iter(Axis(0)).map(|row| tree.predict_row(row)).collect())
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.tree
            .as_ref()
            .map(|t| Array1::from_vec(t.feature_importances()))
    }

    fn name(&self) -> &str {
        "DecisionTree"
    }
}

/// Forest of trees; `bootstrap` draws each tree's rows with replacement.
pub struct RandomForestClassifier {
    n_estimators: usize,
    params: TreeParamsTemplate,
    bootstrap: bool,
    random_state: u64,
    trees: Vec<DecisionTree>,
}

#[derive(Debug, Clone, Copy)]
struct TreeParamsTemplate {
    criterion: Criterion,
    max_features: MaxFeatures,
    strategy: SplitStrategy,
}

impl RandomForestClassifier {
    pub fn new(
        n_estimators: usize,
        criterion: Criterion,
        max_features: MaxFeatures,
        random_state: u64,
    ) -> Self {
        RandomForestClassifier {
            n_estimators,
            params: TreeParamsTemplate {
                criterion,
                max_features,
                strategy: SplitStrategy::Best,
            },
            bootstrap: true,
            random_state,
            trees: Vec::new(),
        }
    }

    /// Extremely randomized trees: random thresholds, no bootstrap.
    pub fn extra_trees(n_estimators: usize, random_state: u64) -> Self {
        RandomForestClassifier {
            n_estimators,
            params: TreeParamsTemplate {
                criterion: Criterion::Gini,
                max_features: MaxFeatures::Sqrt,
                strategy: SplitStrategy::Random,
            },
            bootstrap: false,
            random_state,
            trees: Vec::new(),
        }
    }

    pub(crate) fn fit_arrays(&mut self, x: &Array2<f64>, y: &[bool]) {
        let n_samples = x.nrows();
        let params = TreeParams::new(
            self.params.criterion,
            self.params.strategy,
            self.params.max_features.resolve(x.ncols()),
        );
        let weights = vec![1.0; n_samples];
        let base_seed = self.random_state;
        let bootstrap = self.bootstrap;

        self.trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let indices: Vec<usize> = if bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                DecisionTree::fit(x, y, &weights, indices, &params, &mut rng)
            })
            .collect();
    }

    /// Mean of the per-tree normalized importances, renormalized.
    pub(crate) fn importances(&self) -> Option<Vec<f64>> {
        let first = self.trees.first()?;
        let mut total = vec![0.0; first.feature_importances().len()];
        for tree in &self.trees {
            for (t, v) in total.iter_mut().zip(tree.feature_importances()) {
                *t += v;
            }
        }
        Some(normalize(&total))
    }
}

impl ClassifierModel for RandomForestClassifier {
    fn fit(&mut self, train: &TrainingPartition) -> Result<()> {
        let y = train.labels().to_vec();
        self.fit_arrays(train.x(), &y);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(not_fitted(self.name()));
        }
        let n_trees = self.trees.len() as f64;
        Ok(x
            .axis_iter(Axis(0))
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect())
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.importances().map(Array1::from_vec)
    }

    fn name(&self) -> &str {
        "RandomForest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn toy_partition() -> TrainingPartition {
        // Feature 0 separates the classes, feature 1 is noise.
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            let class0 = i % 2 == 0;
            rows.push(if class0 { 1.0 + i as f64 * 0.01 } else { -1.0 - i as f64 * 0.01 });
            rows.push(((i * 7) % 5) as f64);
            y.push(class0);
        }
        TrainingPartition::from_arrays(Array2::from_shape_vec((20, 2), rows).unwrap(), y)
    }

    #[test]
    fn forest_is_deterministic_and_ranks_informative_feature() {
        let train = toy_partition();
        let mut a = RandomForestClassifier::new(25, Criterion::Gini, MaxFeatures::All, 5);
        let mut b = RandomForestClassifier::new(25, Criterion::Gini, MaxFeatures::All, 5);
        a.fit(&train).unwrap();
        b.fit(&train).unwrap();
        let pa = a.predict_proba(train.x()).unwrap();
        assert_eq!(pa, b.predict_proba(train.x()).unwrap());

        let imp = a.feature_importances().unwrap();
        assert!(imp[0] > imp[1]);
        assert!((imp.sum() - 1.0).abs() < 1e-9);
        let hard = pa.mapv(|p| p >= 0.5);
        assert_eq!(hard.to_vec(), train.labels().to_vec());
    }

    #[test]
    fn decision_tree_fits_training_data() {
        let train = toy_partition();
        let mut tree = DecisionTreeClassifier::new(Criterion::Entropy, MaxFeatures::All, 0);
        assert!(tree.predict_proba(train.x()).is_err());
        tree.fit(&train).unwrap();
        let proba = tree.predict_proba(train.x()).unwrap();
        for (p, &label) in proba.iter().zip(train.labels().iter()) {
            assert_eq!(*p >= 0.5, label);
        }
    }
}
