//! AppendOnly: insert staged rows, never touching existing ones

use crate::error::CompileResult;
use crate::models::{AppendOnly, StatisticName};
use crate::plan::{Condition, Select};
use crate::planner::common::{IngestContext, insert_into_main};
use crate::planner::statistics::{self, Statistics};
use crate::planner::{ModePlan, ModePlanner};

pub struct AppendOnlyPlanner<'m> {
    mode: &'m AppendOnly,
}

impl<'m> AppendOnlyPlanner<'m> {
    pub fn new(mode: &'m AppendOnly) -> Self {
        Self { mode }
    }

    /// Staged rows whose key and digest are already present in main
    fn already_ingested(&self, ctx: &IngestContext<'_>) -> Option<Condition> {
        if !self.mode.filter_existing_records {
            return None;
        }
        let sink = &ctx.main_table;
        let stage = ctx.stage_table();
        let mut matched: Vec<Condition> = ctx.pk_match(sink, stage).into_iter().collect();
        if let Some(digest) = &self.mode.digest_field {
            matched.push(Condition::Equals(sink.field(digest), stage.field(digest)));
        }
        Some(Condition::exists(Select::all_from(
            sink,
            Condition::all(matched),
        )))
    }

    fn statistics(&self, ctx: &IngestContext<'_>) -> Statistics {
        let sink = &ctx.main_table;
        let mut stats = Statistics::new();
        stats.insert(
            StatisticName::IncomingRecordCount,
            statistics::incoming_record_count(ctx),
        );
        let inserted = match (&self.mode.batch_id_field, self.mode.auditing.audit_field()) {
            (Some(batch_id), _) => Some(Condition::Equals(sink.field(batch_id), ctx.next_batch_id())),
            (None, Some(audit)) => Some(Condition::Equals(sink.field(audit), ctx.batch_start())),
            (None, None) => None,
        };
        if let Some(inserted) = inserted {
            stats.insert(
                StatisticName::RowsInserted,
                statistics::count(StatisticName::RowsInserted, sink, Some(inserted)),
            );
        }
        for name in [
            StatisticName::RowsUpdated,
            StatisticName::RowsTerminated,
            StatisticName::RowsDeleted,
        ] {
            stats.insert(name, statistics::zero(name));
        }
        stats
    }
}

impl ModePlanner for AppendOnlyPlanner<'_> {
    fn plan(&self, ctx: &IngestContext<'_>) -> CompileResult<ModePlan> {
        let mut projection = ctx.insert_projection()?;
        if let Some(audit) = self.mode.auditing.audit_field() {
            projection.push((audit.to_string(), ctx.batch_start()));
        }
        if let Some(batch_id) = &self.mode.batch_id_field {
            projection.push((batch_id.clone(), ctx.next_batch_id()));
        }

        let mut conditions: Vec<Condition> =
            ctx.data_split_condition(ctx.stage_table()).into_iter().collect();
        if let Some(existing) = self.already_ingested(ctx) {
            conditions.push(Condition::not(existing));
        }

        Ok(ModePlan {
            ingest: vec![insert_into_main(ctx, projection, Condition::all(conditions))],
            post_statistics: self.statistics(ctx),
            ..ModePlan::default()
        })
    }
}
