use ndarray::{Array1, Array2};

use crate::data_handling::TrainingPartition;
use crate::error::Result;

/// Contract shared by every classifier kind the factory can build.
///
/// Scores are always the probability of Class 0, so downstream metrics never
/// need to know which model produced them.
pub trait ClassifierModel {
    /// Fit the model on a training partition. Labels follow the crate
    /// convention (`true` for Class 0).
    fn fit(&mut self, train: &TrainingPartition) -> Result<()>;

    /// Probability of Class 0 for each row of `x`.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// One importance value per input column, when the model exposes them.
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }

    /// Human readable name for logs
    fn name(&self) -> &str {
        "classifier"
    }
}

pub(crate) fn not_fitted(name: &str) -> crate::error::OmicLearnError {
    crate::error::OmicLearnError::fit("classifier", format!("{} used before fitting", name))
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
