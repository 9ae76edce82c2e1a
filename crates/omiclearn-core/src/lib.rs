//! omiclearn-core: cross-validation and metrics engine for exploratory
//! biomarker classification on omics data.
//!
//! A run takes a [`data_handling::Dataset`] (samples x features, boolean
//! labels with `true` for Class 0), an optional cohort assignment and a
//! [`config::RunConfig`]. Each fold fits a fresh normalization, imputation,
//! feature selection and classifier pipeline on its training partition and
//! scores the held-out partition; [`aggregate::RunSummary`] condenses the
//! folds into curves, confusion matrices, importances and summary statistics.
//!
//! Classifiers are implemented in-crate on top of `ndarray`, except the
//! gradient-boosted trees, which wrap the `gbdt` crate.
pub mod aggregate;
pub mod config;
pub mod cross_validation;
pub mod data_handling;
pub mod error;
pub mod feature_selection;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod splitter;
pub mod stats;

pub use cross_validation::{run_experiment, ExperimentResult};
pub use error::{OmicLearnError, Result};
