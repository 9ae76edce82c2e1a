use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{OmicLearnError, Result};

/// Central configuration for one run: the per-fold pipeline and the
/// cross-validation protocol that drives it.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    pub pipeline: PipelineConfig,
    pub cross_validation: CrossValidationConfig,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.cross_validation.validate()
    }
}

/// Immutable description of the preprocessing, selection and classifier
/// stages. Every random source of a run is seeded from `random_state`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub normalization: Normalization,
    pub missing_values: MissingValueStrategy,
    pub feature_selection: FeatureSelectionConfig,
    pub classifier: ClassifierConfig,
    pub random_state: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            normalization: Normalization::StandardScaler,
            missing_values: MissingValueStrategy::None,
            feature_selection: FeatureSelectionConfig::default(),
            classifier: ClassifierConfig::default(),
            random_state: 23,
        }
    }
}

impl PipelineConfig {
    /// Checks the parameters that apply to the chosen stages. Parameters of
    /// other classifiers / methods are never looked at.
    pub fn validate(&self) -> Result<()> {
        if let Normalization::QuantileTransformer { n_quantiles, .. } = self.normalization {
            if !(1..=2000).contains(&n_quantiles) {
                return Err(OmicLearnError::Configuration(format!(
                    "n_quantiles must be within 1..=2000, got {}",
                    n_quantiles
                )));
            }
        }

        let fs = &self.feature_selection;
        if fs.method != SelectionMethod::None && fs.max_features == 0 {
            return Err(OmicLearnError::Configuration(
                "max_features must be at least 1 when a feature selection method is set".into(),
            ));
        }
        if fs.method == SelectionMethod::ExtraTrees && fs.n_trees == 0 {
            return Err(OmicLearnError::Configuration(
                "n_trees must be at least 1 for ExtraTrees feature selection".into(),
            ));
        }

        self.classifier.validate()
    }
}

/// Column-wise normalization applied first in every fold.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "method")]
pub enum Normalization {
    None,
    StandardScaler,
    MinMaxScaler,
    RobustScaler,
    PowerTransformer {
        #[serde(default)]
        power_method: PowerMethod,
    },
    QuantileTransformer {
        #[serde(default = "default_n_quantiles")]
        n_quantiles: usize,
        #[serde(default)]
        output_distribution: OutputDistribution,
    },
}

fn default_n_quantiles() -> usize {
    100
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization::StandardScaler
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerMethod {
    #[default]
    YeoJohnson,
    BoxCox,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputDistribution {
    #[default]
    Uniform,
    Normal,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingValueStrategy {
    #[default]
    None,
    Zero,
    Mean,
    Median,
    KNNImputer,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FeatureSelectionConfig {
    pub method: SelectionMethod,
    /// Upper bound on the number of selected features.
    pub max_features: usize,
    /// Forest size, used by `ExtraTrees` only.
    pub n_trees: usize,
}

impl Default for FeatureSelectionConfig {
    fn default() -> Self {
        Self {
            method: SelectionMethod::ExtraTrees,
            max_features: 20,
            n_trees: 100,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMethod {
    #[default]
    ExtraTrees,
    KBestMutualInfo,
    KBestFClassif,
    KBestChi2,
    None,
}

/// Classifier choice plus a flat hyper-parameter record. Only the fields the
/// chosen kind reads are consulted; unset fields fall back to per-kind
/// defaults in the model factory.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub kind: ClassifierKind,
    pub params: ClassifierParams,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            kind: ClassifierKind::AdaBoost,
            params: ClassifierParams::default(),
        }
    }
}

impl ClassifierConfig {
    pub fn new(kind: ClassifierKind) -> Self {
        Self {
            kind,
            params: ClassifierParams::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.params;
        let positive = |name: &str, value: Option<f64>| -> Result<()> {
            match value {
                Some(v) if !(v > 0.0) => Err(OmicLearnError::Configuration(format!(
                    "{} must be positive for {}, got {}",
                    name, self.kind, v
                ))),
                _ => Ok(()),
            }
        };
        let at_least_one = |name: &str, value: Option<usize>| -> Result<()> {
            match value {
                Some(0) => Err(OmicLearnError::Configuration(format!(
                    "{} must be at least 1 for {}",
                    name, self.kind
                ))),
                _ => Ok(()),
            }
        };

        match self.kind {
            ClassifierKind::AdaBoost => {
                at_least_one("n_estimators", p.n_estimators)?;
                positive("learning_rate", p.learning_rate)
            }
            ClassifierKind::LogisticRegression => {
                at_least_one("max_iter", p.max_iter)?;
                positive("C", p.c)?;
                match p.l1_ratio {
                    Some(r) if !(0.0..=1.0).contains(&r) => Err(OmicLearnError::Configuration(
                        format!("l1_ratio must be within [0, 1], got {}", r),
                    )),
                    _ => Ok(()),
                }
            }
            ClassifierKind::KNeighborsClassifier => at_least_one("n_neighbors", p.n_neighbors),
            ClassifierKind::RandomForest => {
                at_least_one("n_estimators", p.n_estimators)?;
                validate_max_features(p.max_features)
            }
            ClassifierKind::DecisionTree => validate_max_features(p.max_features),
            ClassifierKind::LinearSVC => {
                positive("C", p.c)?;
                at_least_one("max_iter", p.max_iter)?;
                match p.cv_generator {
                    Some(cv) if !(2..=100).contains(&cv) => {
                        return Err(OmicLearnError::Configuration(format!(
                            "cv_generator must be within 2..=100, got {}",
                            cv
                        )))
                    }
                    _ => {}
                }
                match p.penalty {
                    Some(Penalty::ElasticNet) | Some(Penalty::None) => {
                        Err(OmicLearnError::Configuration(
                            "LinearSVC supports only l1 and l2 penalties".into(),
                        ))
                    }
                    _ => Ok(()),
                }
            }
            ClassifierKind::XGBoost => {
                at_least_one("n_estimators", p.n_estimators)?;
                at_least_one("max_depth", p.max_depth)?;
                match p.min_child_weight {
                    Some(w) if !(0.0..=100.0).contains(&w) => {
                        return Err(OmicLearnError::Configuration(format!(
                            "min_child_weight must be within [0, 100], got {}",
                            w
                        )))
                    }
                    _ => {}
                }
                positive("learning_rate", p.learning_rate)
            }
        }
    }
}

fn validate_max_features(max_features: Option<MaxFeatures>) -> Result<()> {
    match max_features {
        Some(MaxFeatures::Count(0)) => Err(OmicLearnError::Configuration(
            "max_features must be at least 1".into(),
        )),
        _ => Ok(()),
    }
}

/// Closed set of supported classifiers.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierKind {
    #[default]
    AdaBoost,
    LogisticRegression,
    KNeighborsClassifier,
    RandomForest,
    DecisionTree,
    LinearSVC,
    XGBoost,
}

impl ClassifierKind {
    /// Whether the classifier can be trained on data that still contains
    /// missing values.
    pub fn tolerates_missing_values(&self) -> bool {
        matches!(self, ClassifierKind::XGBoost)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ClassifierParams {
    pub n_estimators: Option<usize>,
    pub learning_rate: Option<f64>,
    pub max_depth: Option<usize>,
    pub penalty: Option<Penalty>,
    pub c: Option<f64>,
    pub l1_ratio: Option<f64>,
    pub max_iter: Option<usize>,
    pub n_neighbors: Option<usize>,
    pub weights: Option<KnnWeights>,
    pub criterion: Option<Criterion>,
    pub max_features: Option<MaxFeatures>,
    pub loss: Option<SvcLoss>,
    /// Inner folds used to calibrate LinearSVC probabilities.
    pub cv_generator: Option<usize>,
    /// Smallest number of training samples in an XGBoost leaf.
    pub min_child_weight: Option<f64>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Penalty {
    L2,
    L1,
    ElasticNet,
    None,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KnnWeights {
    Uniform,
    Distance,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Gini,
    Entropy,
}

/// Number of candidate features examined at each tree split.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MaxFeatures {
    /// Square root of the feature count (the classifier default).
    Auto,
    Sqrt,
    Log2,
    Count(usize),
    All,
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::Auto | MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
            MaxFeatures::Count(k) => *k,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SvcLoss {
    Hinge,
    SquaredHinge,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CvScheme {
    #[default]
    RepeatedStratifiedKFold,
    StratifiedKFold,
    StratifiedShuffleSplit,
}

/// Parameters of the fold splitter and the fold worker pool.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CrossValidationConfig {
    pub scheme: CvScheme,
    pub n_splits: usize,
    /// Used by `RepeatedStratifiedKFold` only.
    pub n_repeats: usize,
    /// Held-out fraction per split, used by `StratifiedShuffleSplit` only.
    pub test_size: f64,
    /// Fold worker threads; 0 uses every available core.
    pub workers: usize,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            scheme: CvScheme::RepeatedStratifiedKFold,
            n_splits: 5,
            n_repeats: 10,
            test_size: 0.1,
            workers: 0,
        }
    }
}

impl CrossValidationConfig {
    pub const MIN_SPLITS: usize = 2;
    pub const MAX_SPLITS: usize = 10;
    pub const MAX_REPEATS: usize = 50;

    pub fn validate(&self) -> Result<()> {
        if !(Self::MIN_SPLITS..=Self::MAX_SPLITS).contains(&self.n_splits) {
            return Err(OmicLearnError::Configuration(format!(
                "n_splits must be within {}..={}, got {}",
                Self::MIN_SPLITS,
                Self::MAX_SPLITS,
                self.n_splits
            )));
        }
        match self.scheme {
            CvScheme::RepeatedStratifiedKFold => {
                if !(1..=Self::MAX_REPEATS).contains(&self.n_repeats) {
                    return Err(OmicLearnError::Configuration(format!(
                        "n_repeats must be within 1..={}, got {}",
                        Self::MAX_REPEATS,
                        self.n_repeats
                    )));
                }
            }
            CvScheme::StratifiedShuffleSplit => {
                if !(self.test_size > 0.0 && self.test_size < 1.0) {
                    return Err(OmicLearnError::Configuration(format!(
                        "test_size must be within (0, 1), got {}",
                        self.test_size
                    )));
                }
            }
            CvScheme::StratifiedKFold => {}
        }
        Ok(())
    }

    /// Number of folds the splitter will yield.
    pub fn total_folds(&self) -> usize {
        match self.scheme {
            CvScheme::RepeatedStratifiedKFold => self.n_splits * self.n_repeats,
            CvScheme::StratifiedKFold | CvScheme::StratifiedShuffleSplit => self.n_splits,
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ClassifierKind::AdaBoost => "AdaBoost",
            ClassifierKind::LogisticRegression => "LogisticRegression",
            ClassifierKind::KNeighborsClassifier => "KNeighborsClassifier",
            ClassifierKind::RandomForest => "RandomForest",
            ClassifierKind::DecisionTree => "DecisionTree",
            ClassifierKind::LinearSVC => "LinearSVC",
            ClassifierKind::XGBoost => "XGBoost",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SelectionMethod::ExtraTrees => "ExtraTrees",
            SelectionMethod::KBestMutualInfo => "k-best (mutual_info_classif)",
            SelectionMethod::KBestFClassif => "k-best (f_classif)",
            SelectionMethod::KBestChi2 => "k-best (chi2)",
            SelectionMethod::None => "None",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for MissingValueStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            MissingValueStrategy::None => "None",
            MissingValueStrategy::Zero => "Zero",
            MissingValueStrategy::Mean => "Mean",
            MissingValueStrategy::Median => "Median",
            MissingValueStrategy::KNNImputer => "KNNImputer",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for CvScheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CvScheme::RepeatedStratifiedKFold => "RepeatedStratifiedKFold",
            CvScheme::StratifiedKFold => "StratifiedKFold",
            CvScheme::StratifiedShuffleSplit => "StratifiedShuffleSplit",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Normalization::None => write!(f, "None"),
            Normalization::StandardScaler => write!(f, "StandardScaler"),
            Normalization::MinMaxScaler => write!(f, "MinMaxScaler"),
            Normalization::RobustScaler => write!(f, "RobustScaler"),
            Normalization::PowerTransformer { power_method } => {
                let method = match power_method {
                    PowerMethod::YeoJohnson => "yeo-johnson",
                    PowerMethod::BoxCox => "box-cox",
                };
                write!(f, "PowerTransformer (method = {})", method)
            }
            Normalization::QuantileTransformer {
                n_quantiles,
                output_distribution,
            } => {
                let output = match output_distribution {
                    OutputDistribution::Uniform => "uniform",
                    OutputDistribution::Normal => "normal",
                };
                write!(
                    f,
                    "QuantileTransformer (n_quantiles = {} output_distribution = {})",
                    n_quantiles, output
                )
            }
        }
    }
}

fn normalized_key(s: &str) -> String {
    s.to_lowercase().replace(['-', '_', ' '], "")
}

impl FromStr for ClassifierKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match normalized_key(s).as_str() {
            "adaboost" => Ok(ClassifierKind::AdaBoost),
            "logisticregression" | "logreg" => Ok(ClassifierKind::LogisticRegression),
            "kneighborsclassifier" | "knn" => Ok(ClassifierKind::KNeighborsClassifier),
            "randomforest" => Ok(ClassifierKind::RandomForest),
            "decisiontree" => Ok(ClassifierKind::DecisionTree),
            "linearsvc" | "svm" => Ok(ClassifierKind::LinearSVC),
            "xgboost" | "gbdt" => Ok(ClassifierKind::XGBoost),
            _ => Err(format!(
                "Unknown classifier: {}. Valid options are: AdaBoost, LogisticRegression, \
                 KNeighborsClassifier, RandomForest, DecisionTree, LinearSVC, XGBoost",
                s
            )),
        }
    }
}

impl FromStr for SelectionMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match normalized_key(s).as_str() {
            "extratrees" => Ok(SelectionMethod::ExtraTrees),
            "kbestmutualinfo" | "mutualinfo" | "kbest(mutualinfoclassif)" => {
                Ok(SelectionMethod::KBestMutualInfo)
            }
            "kbestfclassif" | "fclassif" | "kbest(fclassif)" => Ok(SelectionMethod::KBestFClassif),
            "kbestchi2" | "chi2" | "kbest(chi2)" => Ok(SelectionMethod::KBestChi2),
            "none" => Ok(SelectionMethod::None),
            _ => Err(format!("Unknown feature selection method: {}", s)),
        }
    }
}

impl FromStr for MissingValueStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match normalized_key(s).as_str() {
            "none" => Ok(MissingValueStrategy::None),
            "zero" => Ok(MissingValueStrategy::Zero),
            "mean" => Ok(MissingValueStrategy::Mean),
            "median" => Ok(MissingValueStrategy::Median),
            "knnimputer" | "knn" => Ok(MissingValueStrategy::KNNImputer),
            _ => Err(format!("Unknown missing value strategy: {}", s)),
        }
    }
}

impl FromStr for CvScheme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match normalized_key(s).as_str() {
            "repeatedstratifiedkfold" => Ok(CvScheme::RepeatedStratifiedKFold),
            "stratifiedkfold" => Ok(CvScheme::StratifiedKFold),
            "stratifiedshufflesplit" => Ok(CvScheme::StratifiedShuffleSplit),
            _ => Err(format!("Unknown cross-validation scheme: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_applicable_params_are_ignored() {
        let mut config = ClassifierConfig::new(ClassifierKind::LogisticRegression);
        // KNN-only parameter with an invalid value: must not be validated.
        config.params.n_neighbors = Some(0);
        assert!(config.validate().is_ok());

        config.kind = ClassifierKind::KNeighborsClassifier;
        assert!(config.validate().is_err());
    }

    #[test]
    fn calibration_folds_and_leaf_weight_ranges() {
        let mut svc = ClassifierConfig::new(ClassifierKind::LinearSVC);
        svc.params.cv_generator = Some(1);
        assert!(svc.validate().is_err());
        svc.params.cv_generator = Some(100);
        assert!(svc.validate().is_ok());

        let mut xgb = ClassifierConfig::new(ClassifierKind::XGBoost);
        xgb.params.min_child_weight = Some(-1.0);
        assert!(xgb.validate().is_err());
        xgb.params.min_child_weight = Some(0.0);
        assert!(xgb.validate().is_ok());
        // cv_generator belongs to LinearSVC only.
        xgb.params.cv_generator = Some(1);
        assert!(xgb.validate().is_ok());
    }

    #[test]
    fn split_and_repeat_ranges() {
        let mut cv = CrossValidationConfig::default();
        assert!(cv.validate().is_ok());
        cv.n_splits = 11;
        assert!(cv.validate().is_err());
        cv.n_splits = 5;
        cv.n_repeats = 51;
        assert!(cv.validate().is_err());
        // Repeats are ignored by the non-repeated schemes.
        cv.scheme = CvScheme::StratifiedKFold;
        assert!(cv.validate().is_ok());
        assert_eq!(cv.total_folds(), 5);
    }

    #[test]
    fn max_features_resolution() {
        assert_eq!(MaxFeatures::Auto.resolve(16), 4);
        assert_eq!(MaxFeatures::Log2.resolve(16), 4);
        assert_eq!(MaxFeatures::Count(50).resolve(16), 16);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
    }

    #[test]
    fn classifier_names_parse() {
        assert_eq!(
            "LogisticRegression".parse::<ClassifierKind>().unwrap(),
            ClassifierKind::LogisticRegression
        );
        assert_eq!("xgboost".parse::<ClassifierKind>().unwrap(), ClassifierKind::XGBoost);
        assert!("perceptron".parse::<ClassifierKind>().is_err());
        assert_eq!(
            "k-best (f_classif)".parse::<SelectionMethod>().unwrap(),
            SelectionMethod::KBestFClassif
        );
    }
}
