//! Error taxonomy shared by every stage of a run.
//!
//! None of these are retried internally. The orchestrator attaches the fold
//! or cohort-combo context before handing the error to the caller.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OmicLearnError>;

#[derive(Debug, Error)]
pub enum OmicLearnError {
    /// Invalid or incompatible pipeline / cross-validation configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A class has fewer members than the number of requested splits.
    #[error("class {class} has {members} samples, but {required} are required for the requested splits")]
    InsufficientSamples {
        class: String,
        members: usize,
        required: usize,
    },

    /// A pipeline stage failed to fit or transform.
    #[error("{stage} failed on {context}: {message}")]
    Fit {
        stage: String,
        context: String,
        message: String,
    },

    /// One of the two classes is empty where both are required.
    #[error("empty class in {context}: {detail}")]
    EmptyClass { context: String, detail: String },

    /// Shape or length mismatch between inputs.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A metric evaluated to a non-finite value.
    #[error("metric {metric} is not finite for {context}")]
    DegenerateMetric { metric: String, context: String },
}

impl OmicLearnError {
    pub fn fit(stage: &str, message: impl Into<String>) -> Self {
        OmicLearnError::Fit {
            stage: stage.to_string(),
            context: "training data".to_string(),
            message: message.into(),
        }
    }

    /// Replace the generic context of a stage error with the fold or combo it
    /// happened in.
    pub fn in_context(self, context: &str) -> Self {
        match self {
            OmicLearnError::Fit { stage, message, .. } => OmicLearnError::Fit {
                stage,
                context: context.to_string(),
                message,
            },
            OmicLearnError::EmptyClass { detail, .. } => OmicLearnError::EmptyClass {
                context: context.to_string(),
                detail,
            },
            OmicLearnError::DegenerateMetric { metric, .. } => OmicLearnError::DegenerateMetric {
                metric,
                context: context.to_string(),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_context_rewrites_fit_errors() {
        let err = OmicLearnError::fit("feature selection", "NaN in input").in_context("fold 3");
        assert_eq!(
            err.to_string(),
            "feature selection failed on fold 3: NaN in input"
        );
    }

    #[test]
    fn in_context_keeps_configuration_errors() {
        let err = OmicLearnError::Configuration("bad".into()).in_context("fold 0");
        assert!(matches!(err, OmicLearnError::Configuration(_)));
    }
}
