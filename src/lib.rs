//! Ingest SQL Compiler - declarative ingest modes compiled to SQL
//!
//! Provides:
//! - Schema, strategy and ingest mode models (serde friendly)
//! - Plan-time validation of an ingest configuration
//! - A dialect-agnostic planner, one algorithm per ingest mode
//! - A SQL renderer driven by a dialect capability record
//! - Configuration file support for compiler defaults

pub mod config;
pub mod dialect;
pub mod error;
pub mod generator;
pub mod models;
pub mod plan;
pub mod planner;
pub mod render;
pub mod validation;

// Re-export commonly used types
pub use config::{CompilerConfig, ConfigError};
pub use dialect::{CaseConversion, Dialect, DialectKind};
pub use error::{CompileError, CompileResult};
pub use generator::Compiler;
pub use models::{
    AppendOnly, BitemporalDelta, DataSplitRange, DataType, Dataset, DatasetReference, Datasets,
    Field, GeneratorResult, IngestMode, NontemporalDelta, NontemporalSnapshot, StatisticName,
    UnitemporalDelta, UnitemporalSnapshot,
};
pub use planner::PlannerOptions;
