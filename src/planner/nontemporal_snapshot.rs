//! NontemporalSnapshot: replace the content of main with the staged batch

use crate::error::CompileResult;
use crate::models::{EmptyDatasetHandling, NontemporalSnapshot, StatisticName};
use crate::plan::Operation;
use crate::planner::common::{IngestContext, insert_into_main};
use crate::planner::statistics::{self, Statistics};
use crate::planner::{ModePlan, ModePlanner};

pub struct NontemporalSnapshotPlanner<'m> {
    mode: &'m NontemporalSnapshot,
}

impl<'m> NontemporalSnapshotPlanner<'m> {
    pub fn new(mode: &'m NontemporalSnapshot) -> Self {
        Self { mode }
    }
}

impl ModePlanner for NontemporalSnapshotPlanner<'_> {
    fn plan(&self, ctx: &IngestContext<'_>) -> CompileResult<ModePlan> {
        let sink = &ctx.main_table;
        let mut projection = ctx.insert_projection()?;
        if let Some(audit) = self.mode.auditing.audit_field() {
            projection.push((audit.to_string(), ctx.batch_start()));
        }

        let mut pre_statistics = Statistics::new();
        pre_statistics.insert(
            StatisticName::RowsDeleted,
            statistics::count(StatisticName::RowsDeleted, sink, None),
        );

        let mut post_statistics = Statistics::new();
        post_statistics.insert(
            StatisticName::IncomingRecordCount,
            statistics::incoming_record_count(ctx),
        );
        post_statistics.insert(
            StatisticName::RowsInserted,
            statistics::count(StatisticName::RowsInserted, sink, None),
        );
        for name in [StatisticName::RowsUpdated, StatisticName::RowsTerminated] {
            post_statistics.insert(name, statistics::zero(name));
        }

        Ok(ModePlan {
            ingest: vec![
                Operation::delete_all(sink),
                insert_into_main(ctx, projection, None),
            ],
            pre_statistics,
            post_statistics,
            ..ModePlan::default()
        })
    }

    fn plan_empty_batch(&self, ctx: &IngestContext<'_>) -> CompileResult<ModePlan> {
        let ingest = match self.mode.empty_dataset_handling {
            EmptyDatasetHandling::DeleteTargetData => vec![Operation::delete_all(&ctx.main_table)],
            EmptyDatasetHandling::NoOp => Vec::new(),
        };
        Ok(ModePlan {
            ingest,
            ..ModePlan::default()
        })
    }
}
