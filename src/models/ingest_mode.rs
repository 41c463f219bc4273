//! Ingest modes
//!
//! One struct per mode, each carrying only the strategies meaningful for it.
//! [`IngestMode`] wraps them in a closed enum tagged by `mode`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CompileError, CompileResult};

use super::strategy::{
    AuditingStrategy, DeduplicationStrategy, EmptyDatasetHandling, MergeStrategy,
    OptimizationFilter, PartitionSpec, TransactionMilestoning, ValidityDerivation,
    ValidityMilestoning, VersioningStrategy,
};

/// Default digest column name
pub const DEFAULT_DIGEST_FIELD: &str = "digest";

/// Default batch id column for append-only ingests
pub const DEFAULT_BATCH_ID_FIELD: &str = "batch_id";

fn default_digest() -> String {
    DEFAULT_DIGEST_FIELD.to_string()
}

fn default_batch_id_field() -> Option<String> {
    Some(DEFAULT_BATCH_ID_FIELD.to_string())
}

/// Insert staged rows into main without touching existing rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendOnly {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_field: Option<String>,
    #[serde(default)]
    pub auditing: AuditingStrategy,
    #[serde(default)]
    pub deduplication: DeduplicationStrategy,
    #[serde(default)]
    pub versioning: VersioningStrategy,
    /// Skip staged rows whose key and digest already exist in main
    #[serde(default)]
    pub filter_existing_records: bool,
    /// Column stamped with the batch id; `None` disables stamping
    #[serde(default = "default_batch_id_field")]
    pub batch_id_field: Option<String>,
}

impl Default for AppendOnly {
    fn default() -> Self {
        Self {
            digest_field: None,
            auditing: AuditingStrategy::default(),
            deduplication: DeduplicationStrategy::default(),
            versioning: VersioningStrategy::default(),
            filter_existing_records: false,
            batch_id_field: default_batch_id_field(),
        }
    }
}

/// Replace the whole content of main with the staged batch
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NontemporalSnapshot {
    #[serde(default)]
    pub auditing: AuditingStrategy,
    #[serde(default)]
    pub deduplication: DeduplicationStrategy,
    #[serde(default)]
    pub versioning: VersioningStrategy,
    #[serde(default)]
    pub empty_dataset_handling: EmptyDatasetHandling,
}

/// Upsert staged rows into main by primary key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NontemporalDelta {
    #[serde(default = "default_digest")]
    pub digest_field: String,
    #[serde(default)]
    pub auditing: AuditingStrategy,
    #[serde(default)]
    pub deduplication: DeduplicationStrategy,
    #[serde(default)]
    pub versioning: VersioningStrategy,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
}

impl Default for NontemporalDelta {
    fn default() -> Self {
        Self {
            digest_field: default_digest(),
            auditing: AuditingStrategy::default(),
            deduplication: DeduplicationStrategy::default(),
            versioning: VersioningStrategy::default(),
            merge_strategy: MergeStrategy::default(),
        }
    }
}

/// Milestone main so its live rows mirror the staged snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitemporalSnapshot {
    #[serde(default = "default_digest")]
    pub digest_field: String,
    #[serde(default)]
    pub transaction_milestoning: TransactionMilestoning,
    #[serde(default)]
    pub deduplication: DeduplicationStrategy,
    #[serde(default)]
    pub versioning: VersioningStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<PartitionSpec>,
    #[serde(default)]
    pub empty_dataset_handling: EmptyDatasetHandling,
}

impl Default for UnitemporalSnapshot {
    fn default() -> Self {
        Self {
            digest_field: default_digest(),
            transaction_milestoning: TransactionMilestoning::default(),
            deduplication: DeduplicationStrategy::default(),
            versioning: VersioningStrategy::default(),
            partition: None,
            empty_dataset_handling: EmptyDatasetHandling::default(),
        }
    }
}

/// Milestone changed keys of main and open the staged versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitemporalDelta {
    #[serde(default = "default_digest")]
    pub digest_field: String,
    #[serde(default)]
    pub transaction_milestoning: TransactionMilestoning,
    #[serde(default)]
    pub deduplication: DeduplicationStrategy,
    #[serde(default)]
    pub versioning: VersioningStrategy,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    #[serde(default)]
    pub optimization_filters: Vec<OptimizationFilter>,
}

impl Default for UnitemporalDelta {
    fn default() -> Self {
        Self {
            digest_field: default_digest(),
            transaction_milestoning: TransactionMilestoning::default(),
            deduplication: DeduplicationStrategy::default(),
            versioning: VersioningStrategy::default(),
            merge_strategy: MergeStrategy::default(),
            optimization_filters: Vec::new(),
        }
    }
}

/// Milestone on transaction time and business validity time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitemporalDelta {
    #[serde(default = "default_digest")]
    pub digest_field: String,
    #[serde(default)]
    pub transaction_milestoning: TransactionMilestoning,
    pub validity_milestoning: ValidityMilestoning,
    #[serde(default)]
    pub deduplication: DeduplicationStrategy,
    #[serde(default)]
    pub versioning: VersioningStrategy,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
}

/// How a staged batch is merged into main
///
/// # Example
///
/// ```rust
/// use ingest_sql_compiler::models::IngestMode;
///
/// let mode: IngestMode = serde_json::from_str(r#"{"mode": "nontemporal_delta"}"#).unwrap();
/// assert_eq!(mode.digest_field(), Some("digest"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IngestMode {
    AppendOnly(AppendOnly),
    NontemporalSnapshot(NontemporalSnapshot),
    NontemporalDelta(NontemporalDelta),
    UnitemporalSnapshot(UnitemporalSnapshot),
    UnitemporalDelta(UnitemporalDelta),
    BitemporalDelta(BitemporalDelta),
}

impl IngestMode {
    pub fn digest_field(&self) -> Option<&str> {
        match self {
            IngestMode::AppendOnly(m) => m.digest_field.as_deref(),
            IngestMode::NontemporalSnapshot(_) => None,
            IngestMode::NontemporalDelta(m) => Some(&m.digest_field),
            IngestMode::UnitemporalSnapshot(m) => Some(&m.digest_field),
            IngestMode::UnitemporalDelta(m) => Some(&m.digest_field),
            IngestMode::BitemporalDelta(m) => Some(&m.digest_field),
        }
    }

    pub fn deduplication(&self) -> DeduplicationStrategy {
        match self {
            IngestMode::AppendOnly(m) => m.deduplication,
            IngestMode::NontemporalSnapshot(m) => m.deduplication,
            IngestMode::NontemporalDelta(m) => m.deduplication,
            IngestMode::UnitemporalSnapshot(m) => m.deduplication,
            IngestMode::UnitemporalDelta(m) => m.deduplication,
            IngestMode::BitemporalDelta(m) => m.deduplication,
        }
    }

    pub fn versioning(&self) -> &VersioningStrategy {
        match self {
            IngestMode::AppendOnly(m) => &m.versioning,
            IngestMode::NontemporalSnapshot(m) => &m.versioning,
            IngestMode::NontemporalDelta(m) => &m.versioning,
            IngestMode::UnitemporalSnapshot(m) => &m.versioning,
            IngestMode::UnitemporalDelta(m) => &m.versioning,
            IngestMode::BitemporalDelta(m) => &m.versioning,
        }
    }

    pub fn auditing(&self) -> Option<&AuditingStrategy> {
        match self {
            IngestMode::AppendOnly(m) => Some(&m.auditing),
            IngestMode::NontemporalSnapshot(m) => Some(&m.auditing),
            IngestMode::NontemporalDelta(m) => Some(&m.auditing),
            _ => None,
        }
    }

    pub fn merge_strategy(&self) -> Option<&MergeStrategy> {
        match self {
            IngestMode::NontemporalDelta(m) => Some(&m.merge_strategy),
            IngestMode::UnitemporalDelta(m) => Some(&m.merge_strategy),
            IngestMode::BitemporalDelta(m) => Some(&m.merge_strategy),
            _ => None,
        }
    }

    pub fn transaction_milestoning(&self) -> Option<&TransactionMilestoning> {
        match self {
            IngestMode::UnitemporalSnapshot(m) => Some(&m.transaction_milestoning),
            IngestMode::UnitemporalDelta(m) => Some(&m.transaction_milestoning),
            IngestMode::BitemporalDelta(m) => Some(&m.transaction_milestoning),
            _ => None,
        }
    }

    /// Data split column, set only for all-versions ingests
    pub fn data_split_field(&self) -> Option<&str> {
        self.versioning().data_split_field()
    }

    pub fn delete_indicator_field(&self) -> Option<&str> {
        self.merge_strategy().and_then(MergeStrategy::delete_field)
    }

    /// Reject strategy combinations no schema can make valid.
    ///
    /// Schema-dependent rules live in [`crate::validation::ingest`].
    pub fn validate(&self) -> CompileResult<()> {
        let kind = self.kind();
        let versioning = self.versioning();

        let requires_auditing = matches!(
            self,
            IngestMode::AppendOnly(_) | IngestMode::NontemporalDelta(_)
        );
        let no_auditing = self.auditing().is_some_and(|a| a.audit_field().is_none());
        if requires_auditing && no_auditing && versioning.is_versioned() {
            return Err(CompileError::unsupported(
                kind.to_string(),
                "NoAuditing cannot be combined with MaxVersion or AllVersions",
            ));
        }

        let snapshot = matches!(
            self,
            IngestMode::NontemporalSnapshot(_) | IngestMode::UnitemporalSnapshot(_)
        );
        if snapshot && versioning.data_split_field().is_some() {
            return Err(CompileError::unsupported(
                kind.to_string(),
                "AllVersions is only supported by append-only and delta ingests",
            ));
        }

        if let Some(MergeStrategy::DeleteIndicator {
            delete_field,
            delete_values,
        }) = self.merge_strategy()
            && delete_values.is_empty()
        {
            return Err(CompileError::unsupported(
                delete_field.clone(),
                "delete indicator needs at least one delete value",
            ));
        }

        if let IngestMode::AppendOnly(m) = self
            && m.filter_existing_records
            && m.digest_field.is_none()
        {
            return Err(CompileError::unsupported(
                kind.to_string(),
                "filter_existing_records requires a digest field",
            ));
        }

        if let IngestMode::BitemporalDelta(m) = self
            && matches!(
                m.validity_milestoning.derivation,
                ValidityDerivation::SourceSpecifiesFromOnly { .. }
            )
            && self.delete_indicator_field().is_some()
        {
            return Err(CompileError::unsupported(
                kind.to_string(),
                "delete indicator is not supported when the source specifies only the validity start",
            ));
        }

        Ok(())
    }

    pub fn kind(&self) -> IngestModeKind {
        match self {
            IngestMode::AppendOnly(_) => IngestModeKind::AppendOnly,
            IngestMode::NontemporalSnapshot(_) => IngestModeKind::NontemporalSnapshot,
            IngestMode::NontemporalDelta(_) => IngestModeKind::NontemporalDelta,
            IngestMode::UnitemporalSnapshot(_) => IngestModeKind::UnitemporalSnapshot,
            IngestMode::UnitemporalDelta(_) => IngestModeKind::UnitemporalDelta,
            IngestMode::BitemporalDelta(_) => IngestModeKind::BitemporalDelta,
        }
    }
}

/// Mode discriminant, used in logs and error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestModeKind {
    AppendOnly,
    NontemporalSnapshot,
    NontemporalDelta,
    UnitemporalSnapshot,
    UnitemporalDelta,
    BitemporalDelta,
}

impl fmt::Display for IngestModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestModeKind::AppendOnly => "AppendOnly",
            IngestModeKind::NontemporalSnapshot => "NontemporalSnapshot",
            IngestModeKind::NontemporalDelta => "NontemporalDelta",
            IngestModeKind::UnitemporalSnapshot => "UnitemporalSnapshot",
            IngestModeKind::UnitemporalDelta => "UnitemporalDelta",
            IngestModeKind::BitemporalDelta => "BitemporalDelta",
        };
        write!(f, "{}", name)
    }
}
