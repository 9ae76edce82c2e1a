use gbdt::config::Config;
use gbdt::decision_tree::{Data, DataVec, ValueType, VALUE_TYPE_UNKNOWN};
use gbdt::gradient_boost::GBDT;
use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::data_handling::TrainingPartition;
use crate::error::{OmicLearnError, Result};
use crate::models::classifier_trait::{not_fitted, ClassifierModel};

/// Gradient-boosted trees (the `XGBoost` classifier kind).
///
/// Missing values are passed to the booster as unknown feature values, so
/// this is the one classifier that trains on data with gaps.
pub struct GBDTClassifier {
    model: Option<GBDT>,
    learning_rate: f64,
    max_depth: u32,
    num_boost_round: usize,
    min_leaf_size: usize,
}

impl GBDTClassifier {
    pub const LOSS: &'static str = "LogLikelyhood";
    const TRAINING_OPTIMIZATION_LEVEL: u8 = 2;

    pub fn new(learning_rate: f64, max_depth: u32, num_boost_round: usize) -> Self {
        GBDTClassifier {
            model: None,
            learning_rate,
            max_depth,
            num_boost_round,
            min_leaf_size: 1,
        }
    }

    /// Every sample carries weight 1, so the minimum child weight becomes a
    /// minimum leaf size (rounded up, at least 1).
    pub fn with_min_child_weight(mut self, min_child_weight: f64) -> Self {
        self.min_leaf_size = (min_child_weight.ceil() as usize).max(1);
        self
    }
}

fn feature_row(row: ArrayView1<f64>) -> Vec<ValueType> {
    row.iter()
        .map(|&v| {
            if v.is_nan() {
                VALUE_TYPE_UNKNOWN
            } else {
                v as ValueType
            }
        })
        .collect()
}

impl ClassifierModel for GBDTClassifier {
    fn fit(&mut self, train: &TrainingPartition) -> Result<()> {
        let x = train.x();
        if x.ncols() == 0 {
            return Err(OmicLearnError::fit("classifier", "no features to train on"));
        }

        let mut config = Config::new();
        config.set_feature_size(x.ncols());
        config.set_shrinkage(self.learning_rate as ValueType);
        config.set_max_depth(self.max_depth);
        config.set_iterations(self.num_boost_round);
        config.set_min_leaf_size(self.min_leaf_size);
        config.set_debug(false);
        config.set_training_optimization_level(Self::TRAINING_OPTIMIZATION_LEVEL);
        config.set_loss(Self::LOSS);

        let mut gbdt = GBDT::new(&config);

        // LogLikelyhood expects +1 / -1 labels; +1 marks Class 0.
        let mut train_x = DataVec::new();
        for (row, &label) in x.axis_iter(Axis(0)).zip(train.labels().iter()) {
            let target = if label { 1.0 } else { -1.0 };
            train_x.push(Data::new_training_data(feature_row(row), 1.0, target, None));
        }

        gbdt.fit(&mut train_x);
        self.model = Some(gbdt);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let model = self.model.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let mut test_x = DataVec::new();
        for row in x.axis_iter(Axis(0)) {
            test_x.push(Data::new_test_data(feature_row(row), None));
        }
        let predictions = model.predict(&test_x);
        Ok(predictions
            .into_iter()
            .map(|p| (p as f64).clamp(0.0, 1.0))
            .collect())
    }

    fn name(&self) -> &str {
        "XGBoost"
    }
}
