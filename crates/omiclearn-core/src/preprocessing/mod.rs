//! Preprocessing stages run before feature selection: normalization, then
//! missing-value imputation.
pub mod imputation;
pub mod normalization;

pub use imputation::Imputer;
pub use normalization::Normalizer;
