//! Models for the compiler
//!
//! Schema, strategy, ingest mode and result types. All derive serde so a
//! compile request can be written as JSON or YAML.

pub mod dataset;
pub mod field;
pub mod ingest_mode;
pub mod result;
pub mod strategy;

pub use dataset::{Dataset, DatasetReference, Datasets, LockDataset, MetadataDataset};
pub use field::{DataType, Field};
pub use ingest_mode::{
    AppendOnly, BitemporalDelta, IngestMode, IngestModeKind, NontemporalDelta,
    NontemporalSnapshot, UnitemporalDelta, UnitemporalSnapshot,
};
pub use result::{DataSplitRange, DedupAndVersionErrorKind, GeneratorResult, StatisticName};
pub use strategy::{
    AuditingStrategy, DeduplicationStrategy, EmptyDatasetHandling, MergeStrategy,
    OptimizationFilter, PartitionSpec, TransactionMilestoning, ValidityDerivation,
    ValidityMilestoning, VersionResolver, VersioningStrategy,
};
