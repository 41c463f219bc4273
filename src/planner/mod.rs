//! Planner
//!
//! Builds the [`IngestPlan`] for one ingest: the shared phases (pre-actions,
//! locking, dedup and versioning, metadata, cleanup) around the statements
//! of the selected mode. Planning assumes a validated configuration; see
//! [`crate::validation::ingest`].

pub mod append_only;
pub mod bitemporal_delta;
pub mod common;
pub mod dedup;
pub mod metadata;
pub mod nontemporal_delta;
pub mod nontemporal_snapshot;
pub mod statistics;
pub mod unitemporal_delta;
pub mod unitemporal_snapshot;

use chrono::{NaiveDateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::CompileResult;
use crate::models::{Datasets, DedupAndVersionErrorKind, IngestMode, StatisticName};
use crate::plan::{LogicalPlan, Operation, Select};

pub use common::IngestContext;
use statistics::Statistics;

/// Default number of sample rows returned by error-check queries
pub const DEFAULT_SAMPLE_ROW_COUNT: u64 = 20;

/// Default status recorded in the metadata table
pub const DEFAULT_BATCH_SUCCESS_STATUS: &str = "DONE";

/// Knobs that shape the generated phases independently of the ingest mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerOptions {
    /// Empty staging after a successful ingest
    pub cleanup_staging_data: bool,
    pub collect_statistics: bool,
    /// Emit a CREATE for staging in the pre-actions
    pub create_staging_dataset: bool,
    /// Emit the lock table statements
    pub enable_concurrent_safety: bool,
    pub sample_row_count: u64,
    pub batch_success_status: String,
    pub batch_start_timestamp: NaiveDateTime,
    /// Render batch id and timestamps as substitution patterns
    pub placeholder_mode: bool,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            cleanup_staging_data: true,
            collect_statistics: false,
            create_staging_dataset: false,
            enable_concurrent_safety: false,
            sample_row_count: DEFAULT_SAMPLE_ROW_COUNT,
            batch_success_status: DEFAULT_BATCH_SUCCESS_STATUS.to_string(),
            batch_start_timestamp: Utc::now().naive_utc(),
            placeholder_mode: false,
        }
    }
}

impl PlannerOptions {
    pub fn with_batch_start_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.batch_start_timestamp = timestamp;
        self
    }
}

/// Logical plan of one ingest, by phase
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestPlan {
    pub pre_actions: LogicalPlan,
    pub initialize_lock: LogicalPlan,
    pub acquire_lock: LogicalPlan,
    pub deduplication_and_versioning: LogicalPlan,
    pub error_checks: BTreeMap<DedupAndVersionErrorKind, Select>,
    pub ingest: LogicalPlan,
    pub metadata_ingest: LogicalPlan,
    pub post_actions: LogicalPlan,
    pub post_cleanup: LogicalPlan,
    pub pre_ingest_statistics: BTreeMap<StatisticName, Select>,
    pub post_ingest_statistics: BTreeMap<StatisticName, Select>,
}

/// Statements contributed by a mode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModePlan {
    /// Mode-specific tables to create after the shared ones
    pub pre_actions: LogicalPlan,
    pub ingest: LogicalPlan,
    pub pre_statistics: Statistics,
    pub post_statistics: Statistics,
}

/// One merge algorithm
pub trait ModePlanner {
    fn plan(&self, ctx: &IngestContext<'_>) -> CompileResult<ModePlan>;

    /// Statements for a batch with no staged rows; none by default
    fn plan_empty_batch(&self, _ctx: &IngestContext<'_>) -> CompileResult<ModePlan> {
        Ok(ModePlan::default())
    }
}

fn planner_for(mode: &IngestMode) -> Box<dyn ModePlanner + '_> {
    match mode {
        IngestMode::AppendOnly(m) => Box::new(append_only::AppendOnlyPlanner::new(m)),
        IngestMode::NontemporalSnapshot(m) => {
            Box::new(nontemporal_snapshot::NontemporalSnapshotPlanner::new(m))
        }
        IngestMode::NontemporalDelta(m) => {
            Box::new(nontemporal_delta::NontemporalDeltaPlanner::new(m))
        }
        IngestMode::UnitemporalSnapshot(m) => {
            Box::new(unitemporal_snapshot::UnitemporalSnapshotPlanner::new(m))
        }
        IngestMode::UnitemporalDelta(m) => {
            Box::new(unitemporal_delta::UnitemporalDeltaPlanner::new(m))
        }
        IngestMode::BitemporalDelta(m) => {
            Box::new(bitemporal_delta::BitemporalDeltaPlanner::new(m))
        }
    }
}

/// Plan a regular batch
pub fn plan(
    mode: &IngestMode,
    datasets: &Datasets,
    options: &PlannerOptions,
    dialect: &Dialect,
) -> CompileResult<IngestPlan> {
    let ctx = IngestContext::new(mode, datasets, options, dialect, true)?;
    let mode_plan = planner_for(mode).plan(&ctx)?;
    Ok(assemble(&ctx, mode_plan))
}

/// Plan a batch known to have no staged rows
pub fn plan_empty_batch(
    mode: &IngestMode,
    datasets: &Datasets,
    options: &PlannerOptions,
    dialect: &Dialect,
) -> CompileResult<IngestPlan> {
    let ctx = IngestContext::new(mode, datasets, options, dialect, false)?;
    let mode_plan = planner_for(mode).plan_empty_batch(&ctx)?;
    Ok(assemble(&ctx, mode_plan))
}

fn assemble(ctx: &IngestContext<'_>, mode_plan: ModePlan) -> IngestPlan {
    let options = ctx.options;
    let mut plan = IngestPlan::default();

    plan.pre_actions
        .push(Operation::create(&ctx.main_table, ctx.main.fields.clone()));
    if options.create_staging_dataset {
        plan.pre_actions
            .push(Operation::create(&ctx.staging_table, ctx.staging.fields.clone()));
    }
    plan.pre_actions.push(metadata::create_metadata(ctx));
    if let (Some(temp), Some(table)) = (&ctx.temp_staging, &ctx.temp_staging_table) {
        plan.pre_actions
            .push(Operation::create(table, temp.fields.clone()));
    }
    plan.pre_actions.extend(mode_plan.pre_actions);

    if options.enable_concurrent_safety {
        plan.pre_actions.push(metadata::create_lock(ctx));
        plan.initialize_lock.push(metadata::initialize_lock(ctx));
        plan.acquire_lock.push(metadata::acquire_lock(ctx));
    }

    if let Some(dedup) = dedup::plan(ctx) {
        plan.deduplication_and_versioning = dedup.operations;
        plan.error_checks = dedup.error_checks;
    }

    plan.ingest = mode_plan.ingest;
    plan.metadata_ingest.push(metadata::ingest_metadata(ctx));

    if options.cleanup_staging_data {
        plan.post_actions.push(Operation::delete_all(&ctx.staging_table));
    }
    if let Some(table) = &ctx.temp_staging_table {
        plan.post_cleanup.push(Operation::Drop(table.unaliased()));
    }

    if options.collect_statistics {
        plan.pre_ingest_statistics = mode_plan.pre_statistics;
        plan.post_ingest_statistics = mode_plan.post_statistics;
    } else {
        debug!(
            dropped = mode_plan.pre_statistics.len() + mode_plan.post_statistics.len(),
            "Statistics collection disabled"
        );
    }

    if plan.ingest.is_empty() {
        debug!(mode = %ctx.mode.kind(), main = ctx.main_name(), "Plan has no ingest statements");
    }
    debug!(
        pre_actions = plan.pre_actions.len(),
        deduplication = plan.deduplication_and_versioning.len(),
        error_checks = plan.error_checks.len(),
        ingest = plan.ingest.len(),
        post_actions = plan.post_actions.len(),
        "Assembled ingest plan"
    );
    plan
}
