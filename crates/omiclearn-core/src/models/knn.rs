use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::config::KnnWeights;
use crate::data_handling::TrainingPartition;
use crate::error::Result;
use crate::models::classifier_trait::{not_fitted, ClassifierModel};

/// k-nearest-neighbour vote by euclidean distance. `k` is capped at the
/// number of training rows.
pub struct KNeighborsClassifier {
    n_neighbors: usize,
    weights: KnnWeights,
    reference: Option<(Array2<f64>, Array1<bool>)>,
}

impl KNeighborsClassifier {
    pub fn new(n_neighbors: usize, weights: KnnWeights) -> Self {
        KNeighborsClassifier {
            n_neighbors,
            weights,
            reference: None,
        }
    }

    fn proba_row(&self, x: &Array2<f64>, y: &Array1<bool>, row: ArrayView1<f64>) -> f64 {
        let mut neighbours: Vec<(f64, usize)> = x
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(i, other)| {
                let d2: f64 = other.iter().zip(row.iter()).map(|(a, b)| (a - b).powi(2)).sum();
                (d2.sqrt(), i)
            })
            .collect();
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        neighbours.truncate(self.n_neighbors.min(neighbours.len()));

        let vote = |items: &mut dyn Iterator<Item = (f64, bool)>| -> f64 {
            let (class0, total) = items.fold((0.0, 0.0), |(c0, t), (w, label)| {
                (if label { c0 + w } else { c0 }, t + w)
            });
            class0 / total
        };

        match self.weights {
            KnnWeights::Uniform => vote(&mut neighbours.iter().map(|&(_, i)| (1.0, y[i]))),
            KnnWeights::Distance => {
                // Exact matches take the whole vote.
                if neighbours.iter().any(|&(d, _)| d == 0.0) {
                    vote(
                        &mut neighbours
                            .iter()
                            .filter(|&&(d, _)| d == 0.0)
                            .map(|&(_, i)| (1.0, y[i])),
                    )
                } else {
                    vote(&mut neighbours.iter().map(|&(d, i)| (1.0 / d, y[i])))
                }
            }
        }
    }
}

impl ClassifierModel for KNeighborsClassifier {
    fn fit(&mut self, train: &TrainingPartition) -> Result<()> {
        self.reference = Some((train.x().clone(), train.labels().clone()));
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (rx, ry) = self.reference.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(x.axis_iter(Axis(0)).map(|row| self.proba_row(rx, ry, row)).collect())
    }

    fn name(&self) -> &str {
        "KNeighborsClassifier"
    }
}
