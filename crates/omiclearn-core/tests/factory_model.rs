use ndarray::Array2;
use omiclearn_core::config::{ClassifierConfig, ClassifierKind, CrossValidationConfig, CvScheme};
use omiclearn_core::data_handling::Dataset;
use omiclearn_core::models::build_model;
use omiclearn_core::splitter::StratifiedSplitter;

fn separable_dataset() -> Dataset {
    let n = 30;
    let mut rows = Vec::new();
    let mut y = Vec::new();
    for i in 0..n {
        let class0 = i % 3 != 0;
        rows.push(if class0 { 1.0 } else { -1.0 } + (i % 4) as f64 * 0.05);
        rows.push(((i * 7) % 5) as f64 * 0.1);
        y.push(class0);
    }
    Dataset::new(
        Array2::from_shape_vec((n, 2), rows).expect("failed to create feature matrix"),
        y,
        vec!["signal".to_string(), "noise".to_string()],
    )
    .expect("valid dataset")
}

#[test]
fn test_factory_builds_and_predicts_every_kind() {
    let data = separable_dataset();
    let cv = CrossValidationConfig {
        scheme: CvScheme::StratifiedKFold,
        n_splits: 3,
        ..CrossValidationConfig::default()
    };
    let split = StratifiedSplitter::new(data.labels(), &cv, 1)
        .unwrap()
        .next()
        .unwrap();
    let (train, test) = data.partition(&split);

    for kind in [
        ClassifierKind::AdaBoost,
        ClassifierKind::LogisticRegression,
        ClassifierKind::KNeighborsClassifier,
        ClassifierKind::RandomForest,
        ClassifierKind::DecisionTree,
        ClassifierKind::LinearSVC,
        ClassifierKind::XGBoost,
    ] {
        let mut config = ClassifierConfig::new(kind);
        config.params.n_neighbors = Some(3);
        config.params.n_estimators = Some(20);

        let mut model = build_model(&config, 7).unwrap();
        model.fit(&train).unwrap();
        let probs = model.predict_proba(test.x()).unwrap();
        assert_eq!(probs.len(), test.n_samples(), "{}", kind);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)), "{}", kind);

        let predicted = probs.mapv(|p| p >= 0.5);
        let correct = predicted
            .iter()
            .zip(test.labels().iter())
            .filter(|(p, t)| p == t)
            .count();
        assert_eq!(correct, test.n_samples(), "{} misclassified a separable fold", kind);
    }
}

#[test]
fn test_factory_rejects_l1_hinge_svc() {
    let mut config = ClassifierConfig::new(ClassifierKind::LinearSVC);
    config.params.penalty = Some(omiclearn_core::config::Penalty::L1);
    config.params.loss = Some(omiclearn_core::config::SvcLoss::Hinge);
    assert!(build_model(&config, 0).is_err());
}
