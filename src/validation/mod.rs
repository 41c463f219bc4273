//! Validation functionality
//!
//! Provides validation logic for:
//! - Identifier validation (dataset and field names)
//! - Ingest configuration validation (strategies against schemas and dialect)

pub mod ingest;
pub mod input;

pub use ingest::IngestModeValidator;
pub use input::{ValidationError, validate_dataset_name, validate_field_name};
