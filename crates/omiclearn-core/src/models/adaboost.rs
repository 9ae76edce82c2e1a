//! AdaBoost (SAMME) over weighted decision stumps.
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::Criterion;
use crate::data_handling::TrainingPartition;
use crate::error::{OmicLearnError, Result};
use crate::models::classifier_trait::{not_fitted, sigmoid, ClassifierModel};
use crate::models::tree::{normalize, DecisionTree, SplitStrategy, TreeParams};

pub struct AdaBoostClassifier {
    n_estimators: usize,
    learning_rate: f64,
    random_state: u64,
    stumps: Vec<DecisionTree>,
    alphas: Vec<f64>,
}

impl AdaBoostClassifier {
    pub fn new(n_estimators: usize, learning_rate: f64, random_state: u64) -> Self {
        AdaBoostClassifier {
            n_estimators,
            learning_rate,
            random_state,
            stumps: Vec::new(),
            alphas: Vec::new(),
        }
    }

    /// Alpha-weighted vote in [-1, 1], positive towards Class 0.
    fn decision(&self, row: ndarray::ArrayView1<f64>) -> f64 {
        let total: f64 = self.alphas.iter().sum();
        let vote: f64 = self
            .stumps
            .iter()
            .zip(&self.alphas)
            .map(|(stump, alpha)| {
                if stump.predict_row(row) >= 0.5 {
                    *alpha
                } else {
                    -*alpha
                }
            })
            .sum();
        vote / total
    }
}

impl ClassifierModel for AdaBoostClassifier {
    fn fit(&mut self, train: &TrainingPartition) -> Result<()> {
        let x = train.x();
        let y = train.labels().to_vec();
        let n_samples = y.len();
        let params = TreeParams::new(Criterion::Gini, SplitStrategy::Best, x.ncols()).with_max_depth(1);
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut weights = vec![1.0 / n_samples as f64; n_samples];

        self.stumps.clear();
        self.alphas.clear();

        for round in 0..self.n_estimators {
            let stump = DecisionTree::fit(x, &y, &weights, (0..n_samples).collect(), &params, &mut rng);
            let missed: Vec<bool> = x
                .axis_iter(Axis(0))
                .zip(&y)
                .map(|(row, &label)| (stump.predict_row(row) >= 0.5) != label)
                .collect();
            let w_sum: f64 = weights.iter().sum();
            let error = missed
                .iter()
                .zip(&weights)
                .filter(|(m, _)| **m)
                .map(|(_, w)| w)
                .sum::<f64>()
                / w_sum;

            if error <= 0.0 {
                // A perfect stump ends boosting early.
                self.stumps.push(stump);
                self.alphas.push(1.0);
                break;
            }
            if error >= 0.5 {
                if round == 0 {
                    return Err(OmicLearnError::fit(
                        "classifier",
                        "AdaBoost base estimator is worse than random, ensemble can not be fit",
                    ));
                }
                break;
            }

            let alpha = self.learning_rate * ((1.0 - error) / error).ln();
            for (w, &m) in weights.iter_mut().zip(&missed) {
                if m {
                    *w *= alpha.exp();
                }
            }
            let w_sum: f64 = weights.iter().sum();
            weights.iter_mut().for_each(|w| *w /= w_sum);

            self.stumps.push(stump);
            self.alphas.push(alpha);
        }
        log::trace!("AdaBoost kept {} stumps", self.stumps.len());
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.stumps.is_empty() {
            return Err(not_fitted(self.name()));
        }
        Ok(x.axis_iter(Axis(0)).map(|row| sigmoid(self.decision(row))).collect())
    }

    /// Alpha-weighted mean of the stump importances.
    fn feature_importances(&self) -> Option<Array1<f64>> {
        let first = self.stumps.first()?;
        let mut total = vec![0.0; first.feature_importances().len()];
        for (stump, alpha) in self.stumps.iter().zip(&self.alphas) {
            for (t, v) in total.iter_mut().zip(stump.feature_importances()) {
                *t += alpha * v;
            }
        }
        Some(Array1::from_vec(normalize(&total)))
    }

    fn name(&self) -> &str {
        "AdaBoost"
    }
}
