//! The per-fold pipeline: normalization, imputation, feature selection and
//! classifier, always fitted in that order on a training partition only.
use ndarray::{Array1, Array2};

use crate::config::{MissingValueStrategy, PipelineConfig, SelectionMethod};
use crate::data_handling::TrainingPartition;
use crate::error::{OmicLearnError, Result};
use crate::feature_selection::FeatureSelector;
use crate::models::{build_model, ClassifierModel};
use crate::preprocessing::{Imputer, Normalizer};

/// Fitted state of every stage.
struct FittedStages {
    normalizer: Normalizer,
    imputer: Imputer,
    selector: FeatureSelector,
}

pub struct Pipeline {
    config: PipelineConfig,
    fitted: Option<FittedStages>,
    classifier: Box<dyn ClassifierModel>,
}

impl Pipeline {
    /// Assemble an unfitted pipeline.
    ///
    /// `has_missing_values` describes the whole dataset: if it contains NaN
    /// and no imputation is configured, feature selection must be off and
    /// only a classifier that tolerates missing values is accepted.
    pub fn new(config: &PipelineConfig, has_missing_values: bool) -> Result<Self> {
        config.validate()?;
        if has_missing_values && config.missing_values == MissingValueStrategy::None {
            if !config.classifier.kind.tolerates_missing_values() {
                return Err(OmicLearnError::Configuration(format!(
                    "the data contains missing values and no imputation is configured; {} cannot handle them (use XGBoost or choose an imputation strategy)",
                    config.classifier.kind
                )));
            }
            if config.feature_selection.method != SelectionMethod::None {
                return Err(OmicLearnError::Configuration(format!(
                    "the data contains missing values and no imputation is configured; {} feature selection cannot handle them (set feature selection to None or choose an imputation strategy)",
                    config.feature_selection.method
                )));
            }
        }
        let classifier = build_model(&config.classifier, config.random_state)?;
        Ok(Pipeline {
            config: config.clone(),
            fitted: None,
            classifier,
        })
    }

    pub fn fit(&mut self, train: &TrainingPartition) -> Result<()> {
        let normalizer = Normalizer::fit(&self.config.normalization, train.x())?;
        let x = normalizer.transform(train.x())?;

        let imputer = Imputer::fit(self.config.missing_values, &x);
        let x = imputer.transform(&x);

        let y = train.labels().to_vec();
        let selector = FeatureSelector::fit(
            &self.config.feature_selection,
            &x,
            &y,
            self.config.random_state,
        )?;
        let x = selector.transform(&x);
        if x.ncols() == 0 {
            return Err(OmicLearnError::fit("feature selection", "no features left to train on"));
        }

        log::trace!(
            "fitting {} on {} samples x {} features",
            self.classifier.name(),
            x.nrows(),
            x.ncols()
        );
        self.classifier.fit(&train.with_features(x))?;

        self.fitted = Some(FittedStages {
            normalizer,
            imputer,
            selector,
        });
        Ok(())
    }

    fn stages(&self) -> Result<&FittedStages> {
        self.fitted
            .as_ref()
            .ok_or_else(|| OmicLearnError::fit("pipeline", "pipeline used before fitting"))
    }

    /// Apply the fitted preprocessing and selection to `x`.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let stages = self.stages()?;
        let x = stages.normalizer.transform(x)?;
        let x = stages.imputer.transform(&x);
        Ok(stages.selector.transform(&x))
    }

    /// Probability of Class 0 per row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let x = self.transform(x)?;
        self.classifier.predict_proba(&x)
    }

    /// Indices of the input columns the classifier was trained on.
    pub fn selected_indices(&self) -> Result<&[usize]> {
        Ok(self.stages()?.selector.selected_indices())
    }

    /// Names of the selected columns, given the names of the input columns.
    pub fn selected_features(&self, feature_names: &[String]) -> Result<Vec<String>> {
        Ok(self
            .selected_indices()?
            .iter()
            .map(|&i| feature_names[i].clone())
            .collect())
    }

    /// Classifier importances paired with the selected feature names, if the
    /// classifier exposes any.
    pub fn feature_importances(&self, feature_names: &[String]) -> Result<Option<Vec<(String, f64)>>> {
        let names = self.selected_features(feature_names)?;
        Ok(self
            .classifier
            .feature_importances()
            .map(|values| names.into_iter().zip(values.iter().copied()).collect()))
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassifierConfig, ClassifierKind, FeatureSelectionConfig, Normalization, PowerMethod};

    fn train_partition(with_nan: bool) -> (TrainingPartition, Vec<String>) {
        let n = 40;
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..n {
            let class0 = i % 2 == 0;
            rows.push(if class0 { 3.0 } else { -3.0 } + (i % 5) as f64 * 0.1);
            rows.push(if with_nan && i % 6 == 1 { f64::NAN } else { (i % 4) as f64 });
            rows.push(((i * 7) % 9) as f64);
            y.push(class0);
        }
        let names = vec!["P1".to_string(), "P2".to_string(), "P3".to_string()];
        (TrainingPartition::from_arrays(Array2::from_shape_vec((n, 3), rows).unwrap(), y), names)
    }

    fn config(kind: ClassifierKind, method: SelectionMethod, max_features: usize) -> PipelineConfig {
        PipelineConfig {
            feature_selection: FeatureSelectionConfig {
                method,
                max_features,
                n_trees: 30,
            },
            classifier: ClassifierConfig::new(kind),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn missing_values_without_imputation_need_tolerant_classifier() {
        let cfg = config(ClassifierKind::LogisticRegression, SelectionMethod::None, 20);
        assert!(matches!(Pipeline::new(&cfg, true), Err(OmicLearnError::Configuration(_))));

        let cfg = config(ClassifierKind::XGBoost, SelectionMethod::None, 20);
        assert!(Pipeline::new(&cfg, true).is_ok());

        for method in [SelectionMethod::ExtraTrees, SelectionMethod::KBestMutualInfo] {
            let cfg = config(ClassifierKind::XGBoost, method, 20);
            assert!(matches!(Pipeline::new(&cfg, true), Err(OmicLearnError::Configuration(_))));
            assert!(Pipeline::new(&cfg, false).is_ok());
        }

        let mut cfg = config(ClassifierKind::LogisticRegression, SelectionMethod::None, 20);
        cfg.missing_values = MissingValueStrategy::Median;
        assert!(Pipeline::new(&cfg, true).is_ok());
    }

    #[test]
    fn fit_and_predict_with_selection() {
        let (train, names) = train_partition(false);
        let cfg = config(ClassifierKind::LogisticRegression, SelectionMethod::KBestFClassif, 1);
        let mut pipeline = Pipeline::new(&cfg, false).unwrap();
        pipeline.fit(&train).unwrap();

        assert_eq!(pipeline.selected_features(&names).unwrap(), vec!["P1".to_string()]);
        let proba = pipeline.predict_proba(train.x()).unwrap();
        for (p, &label) in proba.iter().zip(train.labels().iter()) {
            assert_eq!(*p >= 0.5, label);
        }
        let importances = pipeline.feature_importances(&names).unwrap().unwrap();
        assert_eq!(importances.len(), 1);
        assert_eq!(importances[0].0, "P1");
    }

    #[test]
    fn imputation_runs_before_selection() {
        let (train, names) = train_partition(true);
        let mut cfg = config(ClassifierKind::RandomForest, SelectionMethod::ExtraTrees, 2);
        cfg.missing_values = MissingValueStrategy::Mean;
        let mut pipeline = Pipeline::new(&cfg, true).unwrap();
        pipeline.fit(&train).unwrap();
        assert_eq!(pipeline.selected_features(&names).unwrap().len(), 2);
        assert!(pipeline.predict_proba(train.x()).unwrap().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn xgboost_trains_on_missing_values_without_selection() {
        let (train, names) = train_partition(true);
        let cfg = config(ClassifierKind::XGBoost, SelectionMethod::None, 20);
        let mut pipeline = Pipeline::new(&cfg, true).unwrap();
        pipeline.fit(&train).unwrap();
        assert_eq!(pipeline.selected_features(&names).unwrap().len(), 3);
        assert!(pipeline.predict_proba(train.x()).unwrap().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn box_cox_on_non_positive_held_out_rows_is_a_fit_error() {
        let (train, _) = train_partition(false);
        let mut cfg = config(ClassifierKind::LogisticRegression, SelectionMethod::None, 20);
        cfg.normalization = Normalization::PowerTransformer {
            power_method: PowerMethod::BoxCox,
        };
        let shifted = train.x().mapv(|v| v + 10.0);
        let mut pipeline = Pipeline::new(&cfg, false).unwrap();
        pipeline
            .fit(&TrainingPartition::from_arrays(shifted.clone(), train.labels().to_vec()))
            .unwrap();
        assert!(pipeline.predict_proba(&shifted).is_ok());
        assert!(matches!(
            pipeline.predict_proba(train.x()),
            Err(OmicLearnError::Fit { .. })
        ));
    }

    #[test]
    fn predict_before_fit_is_an_error() {
        let (train, _) = train_partition(false);
        let cfg = config(ClassifierKind::DecisionTree, SelectionMethod::None, 20);
        let pipeline = Pipeline::new(&cfg, false).unwrap();
        assert!(pipeline.predict_proba(train.x()).is_err());
    }

    #[test]
    fn knn_exposes_no_importances() {
        let (train, names) = train_partition(false);
        let mut cfg = config(ClassifierKind::KNeighborsClassifier, SelectionMethod::None, 20);
        cfg.classifier.params.n_neighbors = Some(5);
        let mut pipeline = Pipeline::new(&cfg, false).unwrap();
        pipeline.fit(&train).unwrap();
        assert!(pipeline.feature_importances(&names).unwrap().is_none());
    }
}
