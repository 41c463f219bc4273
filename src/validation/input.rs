//! Identifier validation.
//!
//! Dataset, field and alias names flow into generated SQL. They are always
//! quoted by the renderer, so the checks here only reject names that quoting
//! cannot make safe or that no target database accepts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length for dataset names
pub const MAX_DATASET_NAME_LENGTH: usize = 255;

/// Maximum length for field names
pub const MAX_FIELD_NAME_LENGTH: usize = 255;

/// Characters that would terminate a quoted identifier in some dialect
const QUOTE_CHARS: &[char] = &['"', '`', '\''];

/// Errors that can occur during identifier validation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    /// Input is empty when a value is required
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// Input exceeds maximum allowed length
    #[error("{field} exceeds maximum length (max: {max}, got: {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// Input contains invalid characters
    #[error("{field} contains invalid characters: {reason}")]
    InvalidCharacters { field: &'static str, reason: String },
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a dataset (table, group or database) name.
///
/// # Rules
///
/// - Must not be empty
/// - Must not exceed 255 characters
/// - Must not contain control characters or quote characters
///
/// # Examples
///
/// ```
/// use ingest_sql_compiler::validation::input::validate_dataset_name;
///
/// assert!(validate_dataset_name("main").is_ok());
/// assert!(validate_dataset_name("staging-2024").is_ok());
/// assert!(validate_dataset_name("").is_err());
/// assert!(validate_dataset_name("main\"; DROP").is_err());
/// ```
pub fn validate_dataset_name(name: &str) -> ValidationResult<()> {
    validate_identifier("dataset name", name, MAX_DATASET_NAME_LENGTH)
}

/// Validate a field (column) name.
///
/// Same rules as [`validate_dataset_name`]. Reserved words are allowed since
/// every field reference is rendered quoted.
///
/// # Examples
///
/// ```
/// use ingest_sql_compiler::validation::input::validate_field_name;
///
/// assert!(validate_field_name("biz_date").is_ok());
/// assert!(validate_field_name("order").is_ok());
/// assert!(validate_field_name("a`b").is_err());
/// ```
pub fn validate_field_name(name: &str) -> ValidationResult<()> {
    validate_identifier("field name", name, MAX_FIELD_NAME_LENGTH)
}

fn validate_identifier(field: &'static str, name: &str, max: usize) -> ValidationResult<()> {
    if name.is_empty() {
        return Err(ValidationError::Empty(field));
    }

    if name.len() > max {
        return Err(ValidationError::TooLong {
            field,
            max,
            actual: name.len(),
        });
    }

    if let Some(c) = name.chars().find(|c| c.is_control() || QUOTE_CHARS.contains(c)) {
        return Err(ValidationError::InvalidCharacters {
            field,
            reason: format!("invalid character: {:?}", c),
        });
    }

    Ok(())
}
