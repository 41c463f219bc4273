//! Compiler output

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Inclusive range of data split values applied by one all-versions pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSplitRange {
    pub lower_bound: i64,
    pub upper_bound: i64,
}

impl DataSplitRange {
    pub fn new(lower_bound: i64, upper_bound: i64) -> Self {
        Self {
            lower_bound,
            upper_bound,
        }
    }
}

/// Named statistics query
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatisticName {
    IncomingRecordCount,
    RowsInserted,
    RowsUpdated,
    RowsDeleted,
    RowsTerminated,
}

impl StatisticName {
    pub const ALL: [StatisticName; 5] = [
        StatisticName::IncomingRecordCount,
        StatisticName::RowsUpdated,
        StatisticName::RowsDeleted,
        StatisticName::RowsInserted,
        StatisticName::RowsTerminated,
    ];

    /// Column alias of the query result
    pub fn as_str(&self) -> &'static str {
        match self {
            StatisticName::IncomingRecordCount => "incomingRecordCount",
            StatisticName::RowsInserted => "rowsInserted",
            StatisticName::RowsUpdated => "rowsUpdated",
            StatisticName::RowsDeleted => "rowsDeleted",
            StatisticName::RowsTerminated => "rowsTerminated",
        }
    }
}

impl fmt::Display for StatisticName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of data-level error check emitted by the dedup phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DedupAndVersionErrorKind {
    MaxDuplicates,
    DuplicateRows,
    MaxDataErrors,
    DataErrorRows,
}

impl DedupAndVersionErrorKind {
    /// Column alias of the check's result
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupAndVersionErrorKind::MaxDuplicates => "MAX_DUPLICATES",
            DedupAndVersionErrorKind::DuplicateRows => "DUPLICATE_ROWS",
            DedupAndVersionErrorKind::MaxDataErrors => "MAX_DATA_ERRORS",
            DedupAndVersionErrorKind::DataErrorRows => "DATA_ERROR_ROWS",
        }
    }
}

impl fmt::Display for DedupAndVersionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendered SQL for one ingest, by execution phase.
///
/// Phases run in field order: pre-actions, lock initialization, lock
/// acquisition, deduplication and versioning (followed by its error checks),
/// ingest, metadata ingest, post actions, post cleanup. Pre-ingest statistics
/// are evaluated before `ingest_sql`; post-ingest statistics after it and
/// before `metadata_ingest_sql`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeneratorResult {
    pub pre_actions_sql: Vec<String>,
    pub initialize_lock_sql: Vec<String>,
    pub acquire_lock_sql: Vec<String>,
    pub deduplication_and_versioning_sql: Vec<String>,
    pub deduplication_and_versioning_error_checks_sql: BTreeMap<DedupAndVersionErrorKind, String>,
    pub ingest_sql: Vec<String>,
    pub metadata_ingest_sql: Vec<String>,
    pub post_actions_sql: Vec<String>,
    pub post_cleanup_sql: Vec<String>,
    pub pre_ingest_statistics_sql: BTreeMap<StatisticName, String>,
    pub post_ingest_statistics_sql: BTreeMap<StatisticName, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_split_range: Option<DataSplitRange>,
}

impl GeneratorResult {
    /// Every executable statement in phase order, statistics and checks excluded
    pub fn all_statements(&self) -> impl Iterator<Item = &String> {
        self.pre_actions_sql
            .iter()
            .chain(&self.initialize_lock_sql)
            .chain(&self.acquire_lock_sql)
            .chain(&self.deduplication_and_versioning_sql)
            .chain(&self.ingest_sql)
            .chain(&self.metadata_ingest_sql)
            .chain(&self.post_actions_sql)
            .chain(&self.post_cleanup_sql)
    }
}
