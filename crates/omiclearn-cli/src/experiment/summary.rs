use omiclearn_core::config::{ClassifierParams, CvScheme, MissingValueStrategy, Normalization, RunConfig, SelectionMethod};
use omiclearn_core::ExperimentResult;

use crate::experiment::input::DataConfig;

/// `key = value` pairs of the parameters that are set.
pub fn format_classifier_params(params: &ClassifierParams) -> String {
    match serde_json::to_value(params) {
        Ok(serde_json::Value::Object(map)) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => format!("{} = {}", k, s),
                other => format!("{} = {}", k, other),
            })
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

fn preprocessing_text(run: &RunConfig) -> String {
    let pipeline = &run.pipeline;
    let mut text = String::new();

    match pipeline.normalization {
        Normalization::None => text.push_str("No normalization on the data was performed. "),
        ref normalization => text.push_str(&format!(
            "Data was normalized in each using a {} approach. ",
            normalization
        )),
    }

    match pipeline.missing_values {
        MissingValueStrategy::None => {
            text.push_str("The dataset contained no missing values; hence no imputation was performed. ")
        }
        strategy => text.push_str(&format!(
            "To impute missing values, a {}-imputation strategy is used. ",
            strategy
        )),
    }

    let fs = &pipeline.feature_selection;
    match fs.method {
        SelectionMethod::None => text.push_str("No feature selection algorithm was applied. "),
        SelectionMethod::ExtraTrees => text.push_str(&format!(
            "Features were selected using a {} (n_trees={}) strategy with the maximum number of {} features. ",
            fs.method, fs.n_trees, fs.max_features
        )),
        method => text.push_str(&format!(
            "Features were selected using a {} strategy with the maximum number of {} features. ",
            method, fs.max_features
        )),
    }
    text.push_str(
        "Normalization and feature selection was individually performed using the training data of each split. ",
    );

    let classifier = &pipeline.classifier;
    text.push_str(&format!(
        "For classification, we used a {}-Classifier ({}). ",
        classifier.kind,
        format_classifier_params(&classifier.params)
    ));
    text
}

/// Methods paragraph describing the run, in the wording of a manuscript
/// methods section, followed by the cohort results when present.
pub fn methods_text(data: &DataConfig, run: &RunConfig, result: &ExperimentResult) -> String {
    let mut text = preprocessing_text(run);
    let class_0 = data.class_0.join("");
    let class_1 = data.class_1.join("");
    let summary = &result.cross_validation;
    let stat = |key: &str| summary.statistic(key).unwrap_or(f64::NAN);

    let cv = &run.cross_validation;
    match cv.scheme {
        CvScheme::RepeatedStratifiedKFold => text.push_str(&format!(
            "When using (RepeatedStratifiedKFold) a repeated (n_repeats={}), stratified cross-validation \
             (n_splits={}) approach to classify {} vs. {}, we achieved a receiver operating characteristic (ROC) \
             with an average AUC (area under the curve) of {:.2} ({:.2} std) and precision-recall (PR) Curve \
             with an average AUC of {:.2} ({:.2} std). ",
            cv.n_repeats,
            cv.n_splits,
            class_0,
            class_1,
            stat("roc_auc_mean"),
            stat("roc_auc_std"),
            stat("pr_auc_mean"),
            stat("pr_auc_std")
        )),
        scheme => text.push_str(&format!(
            "When using {} cross-validation approach (n_splits={}) to classify {} vs. {}, we achieved a \
             receiver operating characteristic (ROC) with an average AUC (area under the curve) of {:.2} \
             ({:.2} std) and Precision-Recall (PR) Curve with an average AUC of {:.2} ({:.2} std). ",
            scheme,
            cv.n_splits,
            class_0,
            class_1,
            stat("roc_auc_mean"),
            stat("roc_auc_std"),
            stat("pr_auc_mean"),
            stat("pr_auc_std")
        )),
    }

    if let Some(comparison) = &result.cohort_comparison {
        text.push_str(&format!(
            "When training on one cohort and predicting on another to classify {} vs. {}, we achieved the \
             following AUCs: ",
            class_0, class_1
        ));
        for combo in &comparison.results {
            let roc = combo.summary.statistic("roc_auc_mean").unwrap_or(f64::NAN);
            let pr = combo.summary.statistic("pr_auc_mean").unwrap_or(f64::NAN);
            text.push_str(&format!(
                "{:.2} when training on {} and predicting on {}, and {:.2} for PR Curve when training on {} \
                 and predicting on {}. ",
                roc, combo.train_cohort, combo.test_cohort, pr, combo.train_cohort, combo.test_cohort
            ));
        }
    }

    text.trim_end().to_string()
}

/// Note shipped next to every PR figure and summary.
pub const PR_BASELINE_NOTE: &str = "PR curves start at recall 0 with precision equal to the Class 0 \
     prevalence of the evaluated samples, and PR-AUC is the step-wise sum of precision over recall \
     increments. Values are therefore not directly comparable to tools that start the curve at precision 1.";

#[cfg(test)]
mod tests {
    use super::*;
    use omiclearn_core::config::{ClassifierConfig, ClassifierKind};

    #[test]
    fn unset_params_are_omitted() {
        let mut params = ClassifierParams::default();
        params.n_estimators = Some(100);
        params.learning_rate = Some(0.5);
        let text = format_classifier_params(&params);
        assert!(text.contains("n_estimators = 100"));
        assert!(text.contains("learning_rate = 0.5"));
        assert!(!text.contains("max_depth"));
    }

    #[test]
    fn preprocessing_sentences_follow_the_config() {
        let mut run = RunConfig::default();
        run.pipeline.missing_values = MissingValueStrategy::Median;
        run.pipeline.classifier = ClassifierConfig::new(ClassifierKind::RandomForest);
        let text = preprocessing_text(&run);
        assert!(text.starts_with("Data was normalized in each using a StandardScaler approach."));
        assert!(text.contains("a Median-imputation strategy"));
        assert!(text.contains("ExtraTrees (n_trees=100)"));
        assert!(text.contains("RandomForest-Classifier ()"));
    }
}
