use crate::config::{
    ClassifierConfig, ClassifierKind, Criterion, KnnWeights, MaxFeatures, Penalty, SvcLoss,
};
use crate::error::Result;
use crate::models::adaboost::AdaBoostClassifier;
use crate::models::classifier_trait::ClassifierModel;
use crate::models::forest::{DecisionTreeClassifier, RandomForestClassifier};
use crate::models::gbdt::GBDTClassifier;
use crate::models::knn::KNeighborsClassifier;
use crate::models::linear::{LinearSvc, LogisticRegression};

/// Build a fresh, unfitted classifier from its configuration.
///
/// Unset hyper-parameters take per-kind defaults; parameters that belong to
/// other kinds are ignored.
pub fn build_model(config: &ClassifierConfig, random_state: u64) -> Result<Box<dyn ClassifierModel>> {
    let p = &config.params;
    let model: Box<dyn ClassifierModel> = match config.kind {
        ClassifierKind::AdaBoost => Box::new(AdaBoostClassifier::new(
            p.n_estimators.unwrap_or(100),
            p.learning_rate.unwrap_or(1.0),
            random_state,
        )),
        ClassifierKind::LogisticRegression => Box::new(LogisticRegression::new(
            p.penalty.unwrap_or(Penalty::L2),
            p.c.unwrap_or(1.0),
            p.l1_ratio.unwrap_or(0.5),
            p.max_iter.unwrap_or(100),
        )),
        ClassifierKind::KNeighborsClassifier => Box::new(KNeighborsClassifier::new(
            p.n_neighbors.unwrap_or(100),
            p.weights.unwrap_or(KnnWeights::Uniform),
        )),
        ClassifierKind::RandomForest => Box::new(RandomForestClassifier::new(
            p.n_estimators.unwrap_or(100),
            p.criterion.unwrap_or(Criterion::Gini),
            p.max_features.unwrap_or(MaxFeatures::Auto),
            random_state,
        )),
        ClassifierKind::DecisionTree => Box::new(DecisionTreeClassifier::new(
            p.criterion.unwrap_or(Criterion::Gini),
            p.max_features.unwrap_or(MaxFeatures::Auto),
            random_state,
        )),
        ClassifierKind::LinearSVC => Box::new(
            LinearSvc::new(
                p.penalty.unwrap_or(Penalty::L2),
                p.loss.unwrap_or(SvcLoss::SquaredHinge),
                p.c.unwrap_or(1.0),
                p.max_iter.unwrap_or(1000),
            )?
            .with_calibration_folds(p.cv_generator.unwrap_or(2), random_state),
        ),
        ClassifierKind::XGBoost => Box::new(
            GBDTClassifier::new(
                p.learning_rate.unwrap_or(0.3),
                p.max_depth.unwrap_or(6) as u32,
                p.n_estimators.unwrap_or(100),
            )
            .with_min_child_weight(p.min_child_weight.unwrap_or(1.0)),
        ),
    };
    log::trace!("built {} classifier", model.name());
    Ok(model)
}
