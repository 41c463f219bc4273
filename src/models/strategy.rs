//! Strategy axes of an ingest mode
//!
//! One closed enum per axis. Each enum is tagged with `kind` when it carries
//! data so a compile request reads naturally in JSON or YAML:
//!
//! ```json
//! { "kind": "max_version", "version_field": "version" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default name of the generated data split column
pub const DEFAULT_DATA_SPLIT_FIELD: &str = "data_split";

pub const DEFAULT_BATCH_ID_IN_FIELD: &str = "batch_id_in";
pub const DEFAULT_BATCH_ID_OUT_FIELD: &str = "batch_id_out";
pub const DEFAULT_BATCH_TIME_IN_FIELD: &str = "batch_time_in";
pub const DEFAULT_BATCH_TIME_OUT_FIELD: &str = "batch_time_out";

fn default_true() -> bool {
    true
}

fn default_data_split_field() -> String {
    DEFAULT_DATA_SPLIT_FIELD.to_string()
}

fn default_batch_id_in() -> String {
    DEFAULT_BATCH_ID_IN_FIELD.to_string()
}

fn default_batch_id_out() -> String {
    DEFAULT_BATCH_ID_OUT_FIELD.to_string()
}

fn default_batch_time_in() -> String {
    DEFAULT_BATCH_TIME_IN_FIELD.to_string()
}

fn default_batch_time_out() -> String {
    DEFAULT_BATCH_TIME_OUT_FIELD.to_string()
}

/// Whether ingested rows carry an audit timestamp column
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditingStrategy {
    #[default]
    NoAuditing,
    DateTimeAuditing { date_time_field: String },
}

impl AuditingStrategy {
    pub fn audit_field(&self) -> Option<&str> {
        match self {
            AuditingStrategy::NoAuditing => None,
            AuditingStrategy::DateTimeAuditing { date_time_field } => Some(date_time_field),
        }
    }
}

/// Treatment of fully identical staged rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeduplicationStrategy {
    #[default]
    AllowDuplicates,
    FilterDuplicates,
    FailOnDuplicates,
}

impl DeduplicationStrategy {
    /// Whether the staged rows must be grouped with a duplicate count
    pub fn collapses_duplicates(&self) -> bool {
        !matches!(self, DeduplicationStrategy::AllowDuplicates)
    }
}

/// How a staged version compares with the live version in main
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionResolver {
    /// Any digest change wins
    #[default]
    DigestBased,
    GreaterThanActiveVersion,
    GreaterThanEqualToActiveVersion,
}

/// How multiple versions of one business key in a batch are handled
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VersioningStrategy {
    #[default]
    NoVersioning,
    /// Keep only the highest version per key
    MaxVersion {
        version_field: String,
        #[serde(default)]
        resolver: VersionResolver,
        #[serde(default = "default_true")]
        perform_stage_versioning: bool,
        /// Emit the conflicting-version error check
        #[serde(default = "default_true")]
        fail_on_duplicate_primary_keys: bool,
    },
    /// Apply every version in order, one data split range at a time
    AllVersions {
        version_field: String,
        #[serde(default = "default_data_split_field")]
        data_split_field: String,
        #[serde(default)]
        resolver: VersionResolver,
        #[serde(default = "default_true")]
        perform_stage_versioning: bool,
    },
}

impl VersioningStrategy {
    pub fn version_field(&self) -> Option<&str> {
        match self {
            VersioningStrategy::NoVersioning => None,
            VersioningStrategy::MaxVersion { version_field, .. }
            | VersioningStrategy::AllVersions { version_field, .. } => Some(version_field),
        }
    }

    pub fn resolver(&self) -> VersionResolver {
        match self {
            VersioningStrategy::NoVersioning => VersionResolver::DigestBased,
            VersioningStrategy::MaxVersion { resolver, .. }
            | VersioningStrategy::AllVersions { resolver, .. } => *resolver,
        }
    }

    /// Whether versions are ranked while building the temp staging table
    pub fn performs_stage_versioning(&self) -> bool {
        match self {
            VersioningStrategy::NoVersioning => false,
            VersioningStrategy::MaxVersion {
                perform_stage_versioning,
                ..
            }
            | VersioningStrategy::AllVersions {
                perform_stage_versioning,
                ..
            } => *perform_stage_versioning,
        }
    }

    pub fn data_split_field(&self) -> Option<&str> {
        match self {
            VersioningStrategy::AllVersions {
                data_split_field, ..
            } => Some(data_split_field),
            _ => None,
        }
    }

    pub fn is_versioned(&self) -> bool {
        !matches!(self, VersioningStrategy::NoVersioning)
    }

    /// Whether the conflicting-version (MAX_DATA_ERRORS) check is emitted
    pub fn checks_data_errors(&self) -> bool {
        match self {
            VersioningStrategy::NoVersioning => false,
            VersioningStrategy::MaxVersion {
                perform_stage_versioning,
                fail_on_duplicate_primary_keys,
                ..
            } => *perform_stage_versioning && *fail_on_duplicate_primary_keys,
            VersioningStrategy::AllVersions {
                perform_stage_versioning,
                ..
            } => *perform_stage_versioning,
        }
    }
}

/// Logical deletes carried by staged rows
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeStrategy {
    #[default]
    NoDeletes,
    /// Rows whose `delete_field` holds one of `delete_values` delete (or close) their match
    DeleteIndicator {
        delete_field: String,
        delete_values: Vec<String>,
    },
}

impl MergeStrategy {
    pub fn delete_field(&self) -> Option<&str> {
        match self {
            MergeStrategy::NoDeletes => None,
            MergeStrategy::DeleteIndicator { delete_field, .. } => Some(delete_field),
        }
    }
}

/// Transaction-time markers kept on every unitemporal or bitemporal row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionMilestoning {
    BatchId {
        #[serde(default = "default_batch_id_in")]
        batch_id_in_field: String,
        #[serde(default = "default_batch_id_out")]
        batch_id_out_field: String,
    },
    BatchIdAndDateTime {
        #[serde(default = "default_batch_id_in")]
        batch_id_in_field: String,
        #[serde(default = "default_batch_id_out")]
        batch_id_out_field: String,
        #[serde(default = "default_batch_time_in")]
        date_time_in_field: String,
        #[serde(default = "default_batch_time_out")]
        date_time_out_field: String,
    },
    TransactionDateTime {
        #[serde(default = "default_batch_time_in")]
        date_time_in_field: String,
        #[serde(default = "default_batch_time_out")]
        date_time_out_field: String,
    },
}

impl Default for TransactionMilestoning {
    fn default() -> Self {
        TransactionMilestoning::BatchId {
            batch_id_in_field: default_batch_id_in(),
            batch_id_out_field: default_batch_id_out(),
        }
    }
}

impl TransactionMilestoning {
    pub fn batch_id_fields(&self) -> Option<(&str, &str)> {
        match self {
            TransactionMilestoning::BatchId {
                batch_id_in_field,
                batch_id_out_field,
            }
            | TransactionMilestoning::BatchIdAndDateTime {
                batch_id_in_field,
                batch_id_out_field,
                ..
            } => Some((batch_id_in_field, batch_id_out_field)),
            TransactionMilestoning::TransactionDateTime { .. } => None,
        }
    }

    pub fn date_time_fields(&self) -> Option<(&str, &str)> {
        match self {
            TransactionMilestoning::BatchId { .. } => None,
            TransactionMilestoning::BatchIdAndDateTime {
                date_time_in_field,
                date_time_out_field,
                ..
            }
            | TransactionMilestoning::TransactionDateTime {
                date_time_in_field,
                date_time_out_field,
            } => Some((date_time_in_field, date_time_out_field)),
        }
    }

    /// The marker that opens a row and therefore belongs to the primary key
    pub fn in_field(&self) -> &str {
        match self.batch_id_fields() {
            Some((batch_in, _)) => batch_in,
            None => self.date_time_fields().map(|(t_in, _)| t_in).unwrap_or_default(),
        }
    }
}

/// Source of the business validity range in a bitemporal ingest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidityDerivation {
    SourceSpecifiesFromAndThru {
        source_date_time_from_field: String,
        source_date_time_thru_field: String,
    },
    /// The thru date is inferred from the next version's from date
    SourceSpecifiesFromOnly { source_date_time_from_field: String },
}

impl ValidityDerivation {
    pub fn source_from_field(&self) -> &str {
        match self {
            ValidityDerivation::SourceSpecifiesFromAndThru {
                source_date_time_from_field,
                ..
            }
            | ValidityDerivation::SourceSpecifiesFromOnly {
                source_date_time_from_field,
            } => source_date_time_from_field,
        }
    }

    pub fn source_thru_field(&self) -> Option<&str> {
        match self {
            ValidityDerivation::SourceSpecifiesFromAndThru {
                source_date_time_thru_field,
                ..
            } => Some(source_date_time_thru_field),
            ValidityDerivation::SourceSpecifiesFromOnly { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityMilestoning {
    pub date_time_from_field: String,
    pub date_time_thru_field: String,
    pub derivation: ValidityDerivation,
}

/// What a snapshot ingest does when the staged batch is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyDatasetHandling {
    NoOp,
    #[default]
    DeleteTargetData,
}

/// Caller-supplied range narrowing of the rows of main a delta ingest touches.
///
/// The bounds are placeholders substituted by the execution layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationFilter {
    pub field_name: String,
    pub lower_bound_pattern: String,
    pub upper_bound_pattern: String,
    #[serde(default)]
    pub include_nulls: bool,
}

impl OptimizationFilter {
    pub fn new(
        field_name: impl Into<String>,
        lower_bound_pattern: impl Into<String>,
        upper_bound_pattern: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            lower_bound_pattern: lower_bound_pattern.into(),
            upper_bound_pattern: upper_bound_pattern.into(),
            include_nulls: false,
        }
    }
}

/// Partition scoping of a unitemporal snapshot.
///
/// With `values` empty, only partitions present in staging are milestoned;
/// otherwise only the listed partition values are.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub fields: Vec<String>,
    #[serde(default)]
    pub values: BTreeMap<String, Vec<String>>,
}
