//! Feature selection stage.
//!
//! Univariate scorers (a la scikit-learn) and the extremely randomized trees
//! importance ranking all reduce to the same step: score every column on the
//! training fold and keep the `max_features` best.
pub mod mutual_info;
pub mod univariate_selection;

use ndarray::{Array1, Array2, Axis};

use crate::config::{FeatureSelectionConfig, SelectionMethod};
use crate::error::{OmicLearnError, Result};
use crate::models::forest::RandomForestClassifier;
use mutual_info::mutual_info_classif;
use univariate_selection::{chi2, f_classif, SelectKBest};

/// Column subset chosen on a training fold.
#[derive(Debug, Clone)]
pub struct FeatureSelector {
    selected: Vec<usize>,
}

impl FeatureSelector {
    /// Score the columns of `x` against `y` and keep the best ones, in
    /// original column order.
    pub fn fit(config: &FeatureSelectionConfig, x: &Array2<f64>, y: &[bool], seed: u64) -> Result<Self> {
        let n_features = x.ncols();
        if config.method != SelectionMethod::None && x.iter().any(|v| v.is_nan()) {
            return Err(OmicLearnError::fit(
                "feature selection",
                format!("{} cannot handle missing values; choose an imputation strategy", config.method),
            ));
        }

        let k = config.max_features.min(n_features);
        let scores = match config.method {
            SelectionMethod::ExtraTrees => {
                let mut forest = RandomForestClassifier::extra_trees(config.n_trees, seed);
                forest.fit_arrays(x, y);
                forest
                    .importances()
                    .map(Array1::from_vec)
                    .unwrap_or_else(|| Array1::zeros(n_features))
            }
            SelectionMethod::KBestMutualInfo => mutual_info_classif(x, y, seed),
            SelectionMethod::KBestFClassif => f_classif(x, y)?.0,
            SelectionMethod::KBestChi2 => chi2(x, y)?.0,
            SelectionMethod::None => {
                return Ok(FeatureSelector {
                    selected: (0..n_features).collect(),
                })
            }
        };

        let selected = SelectKBest::new(k).fit(&scores);
        log::trace!(
            "{} kept {} of {} features",
            config.method,
            selected.len(),
            n_features
        );
        Ok(FeatureSelector { selected })
    }

    pub fn selected_indices(&self) -> &[usize] {
        &self.selected
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        x.select(Axis(1), &self.selected)
    }
}
