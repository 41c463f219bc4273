//! Compiler error types
//!
//! Every failure the compiler can report happens before any SQL is produced.
//! Data-level problems (duplicates, conflicting versions) are not errors here:
//! they are detected at execution time through the emitted error-check queries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::input::ValidationError;

/// Error raised while validating or planning an ingest.
///
/// All variants describe an unsupported configuration; the variant names the
/// category and the payload names the offending field or strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CompileError {
    /// A strategy combination or option that the compiler refuses to plan
    #[error("Unsupported configuration for {subject}: {reason}")]
    UnsupportedConfiguration { subject: String, reason: String },

    /// A referenced field is absent from a dataset schema
    #[error("Field \"{field}\" not found in dataset \"{dataset}\"")]
    MissingField { dataset: String, field: String },

    /// An optimization filter names an unknown column or an unsupported type
    #[error("Invalid optimization filter on \"{column}\": {reason}")]
    InvalidOptimizationFilter { column: String, reason: String },

    /// The target dialect lacks a capability the plan needs
    #[error("Dialect {dialect} does not support {feature}")]
    MissingDialectFeature { dialect: String, feature: String },

    /// A dataset or field name failed identifier validation
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Data split ranges are empty, inverted or overlapping
    #[error("Invalid data split: {0}")]
    InvalidDataSplit(String),
}

impl CompileError {
    /// Shorthand for [`CompileError::UnsupportedConfiguration`]
    pub fn unsupported(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        CompileError::UnsupportedConfiguration {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`CompileError::MissingField`]
    pub fn missing_field(dataset: impl Into<String>, field: impl Into<String>) -> Self {
        CompileError::MissingField {
            dataset: dataset.into(),
            field: field.into(),
        }
    }
}

impl From<ValidationError> for CompileError {
    fn from(err: ValidationError) -> Self {
        CompileError::InvalidIdentifier(err.to_string())
    }
}

/// Result type for compiler operations
pub type CompileResult<T> = Result<T, CompileError>;
