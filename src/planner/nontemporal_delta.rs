//! NontemporalDelta: upsert staged rows by primary key
//!
//! Three statements, in order: update changed rows in place, insert staged
//! rows whose key has no live row, and delete rows matched by a staged
//! delete indicator. Dialects preferring MERGE get the same three outcomes
//! from one statement.
//!
//! Staged rows flagged for deletion never update or insert.

use crate::error::{CompileError, CompileResult};
use crate::models::{NontemporalDelta, StatisticName};
use crate::plan::{Condition, MergeInsert, Operation, Select, Source, Value};
use crate::planner::common::{IngestContext, STAGING_ALIAS, insert_into_main};
use crate::planner::statistics::{self, Statistics};
use crate::planner::{ModePlan, ModePlanner};

pub struct NontemporalDeltaPlanner<'m> {
    mode: &'m NontemporalDelta,
}

impl<'m> NontemporalDeltaPlanner<'m> {
    pub fn new(mode: &'m NontemporalDelta) -> Self {
        Self { mode }
    }

    /// Unflagged staged rows that replace the live row they match
    fn superseding(&self, ctx: &IngestContext<'_>) -> Option<Condition> {
        let sink = &ctx.main_table;
        let stage = ctx.stage_table();
        let conditions = ctx
            .data_split_condition(stage)
            .into_iter()
            .chain(ctx.pk_match(sink, stage))
            .chain(ctx.stage_supersedes(sink, stage))
            .chain(ctx.live_rows(stage))
            .collect();
        Condition::all(conditions)
    }

    /// Unflagged staged rows whose key has no live row
    fn inserting(&self, ctx: &IngestContext<'_>) -> Option<Condition> {
        let sink = &ctx.main_table;
        let stage = ctx.stage_table();
        let unmatched = Condition::not_exists(Select::all_from(sink, ctx.pk_match(sink, stage)));
        let conditions = ctx
            .data_split_condition(stage)
            .into_iter()
            .chain(std::iter::once(unmatched))
            .chain(ctx.live_rows(stage))
            .collect();
        Condition::all(conditions)
    }

    /// Copied columns plus the audit stamp, as `(main column, value)`
    fn written_values(
        &self,
        ctx: &IngestContext<'_>,
        mut projection: Vec<(String, Value)>,
    ) -> Vec<(String, Value)> {
        if let Some(audit) = self.mode.auditing.audit_field() {
            projection.push((audit.to_string(), ctx.batch_start()));
        }
        projection
    }

    fn update(&self, ctx: &IngestContext<'_>, projection: &[(String, Value)]) -> Operation {
        let stage = ctx.stage_table();
        let condition = self.superseding(ctx);
        let mut assignments: Vec<(String, Value)> = projection
            .iter()
            .map(|(column, value)| {
                let select =
                    Select::from_table(vec![value.clone()], stage).filter(condition.clone());
                (column.clone(), Value::sub_query(select))
            })
            .collect();
        if let Some(audit) = self.mode.auditing.audit_field() {
            assignments.push((audit.to_string(), ctx.batch_start()));
        }
        Operation::Update {
            table: ctx.main_table.clone(),
            assignments,
            condition: Some(Condition::exists(Select::all_from(stage, condition))),
        }
    }

    fn insert(&self, ctx: &IngestContext<'_>, projection: Vec<(String, Value)>) -> Operation {
        insert_into_main(ctx, self.written_values(ctx, projection), self.inserting(ctx))
    }

    /// Staged rows deleting their live match: same key, same content, flagged
    fn deleting(&self, ctx: &IngestContext<'_>) -> Option<Condition> {
        let sink = &ctx.main_table;
        let stage = ctx.stage_table();
        let deleted = ctx.deleted_rows(stage)?;
        let conditions = ctx
            .data_split_condition(stage)
            .into_iter()
            .chain(ctx.pk_match(sink, stage))
            .chain(ctx.stage_matches(sink, stage))
            .chain(std::iter::once(deleted))
            .collect();
        Condition::all(conditions)
    }

    fn delete(&self, ctx: &IngestContext<'_>) -> Option<Operation> {
        let stage = ctx.stage_table();
        let condition = self.deleting(ctx)?;
        let staged = stage.fields(ctx.stage_dataset().field_names());
        Some(Operation::Delete {
            table: ctx.main_table.clone(),
            condition: Some(Condition::exists(
                Select::from_table(staged, stage).filter(Some(condition)),
            )),
        })
    }

    /// The upsert as one MERGE.
    ///
    /// Data split bounds move into a sub-select over the staged columns, so
    /// the clause guards only compare the matched pair.
    fn merge(
        &self,
        ctx: &IngestContext<'_>,
        projection: Vec<(String, Value)>,
    ) -> CompileResult<Operation> {
        let sink = &ctx.main_table;
        let stage = ctx.stage_table();
        let on = ctx.pk_match(sink, stage).ok_or_else(|| {
            CompileError::unsupported(
                ctx.mode.kind().to_string(),
                "primary keys shared by main and staging are required",
            )
        })?;

        let source = match ctx.data_split_condition(stage) {
            Some(split) => {
                let split_field = ctx.mode.data_split_field();
                let columns = ctx
                    .stage_dataset()
                    .field_names()
                    .into_iter()
                    .filter(|name| Some(*name) != split_field);
                let alias = ctx.stage_dataset().reference.alias_or(STAGING_ALIAS);
                Source::sub_select(
                    Select::from_table(stage.fields(columns), stage).filter(Some(split)),
                    alias,
                )
            }
            None => Source::Table(stage.clone()),
        };

        let matched_condition = Condition::all(
            ctx.stage_supersedes(sink, stage)
                .into_iter()
                .chain(ctx.live_rows(stage))
                .collect(),
        );
        let delete_condition = ctx.deleted_rows(stage).and_then(|deleted| {
            Condition::all(
                ctx.stage_matches(sink, stage)
                    .into_iter()
                    .chain(std::iter::once(deleted))
                    .collect(),
            )
        });
        let values = self.written_values(ctx, projection);
        let (columns, inserted): (Vec<String>, Vec<Value>) = values.iter().cloned().unzip();

        Ok(Operation::Merge {
            target: sink.clone(),
            source,
            on,
            matched_condition,
            assignments: values,
            delete_condition,
            insert: MergeInsert {
                condition: ctx.live_rows(stage),
                columns,
                values: inserted,
            },
        })
    }

    /// Counts taken before the ingest, with the predicates of its statements
    fn pre_statistics(&self, ctx: &IngestContext<'_>) -> Statistics {
        let sink = &ctx.main_table;
        let stage = ctx.stage_table();
        let mut stats = Statistics::new();
        stats.insert(
            StatisticName::RowsUpdated,
            statistics::count(
                StatisticName::RowsUpdated,
                sink,
                Some(Condition::exists(Select::all_from(stage, self.superseding(ctx)))),
            ),
        );
        stats.insert(
            StatisticName::RowsInserted,
            statistics::count(StatisticName::RowsInserted, stage, self.inserting(ctx)),
        );
        let deleted = match self.deleting(ctx) {
            Some(condition) => statistics::count(
                StatisticName::RowsDeleted,
                sink,
                Some(Condition::exists(Select::all_from(stage, Some(condition)))),
            ),
            None => statistics::zero(StatisticName::RowsDeleted),
        };
        stats.insert(StatisticName::RowsDeleted, deleted);
        stats
    }
}

impl ModePlanner for NontemporalDeltaPlanner<'_> {
    fn plan(&self, ctx: &IngestContext<'_>) -> CompileResult<ModePlan> {
        let projection = ctx.insert_projection()?;
        let ingest = if ctx.dialect.upserts_by_merge() {
            vec![self.merge(ctx, projection)?]
        } else {
            let mut ingest = vec![
                self.update(ctx, &projection),
                self.insert(ctx, projection),
            ];
            ingest.extend(self.delete(ctx));
            ingest
        };

        let mut post_statistics = Statistics::new();
        post_statistics.insert(
            StatisticName::IncomingRecordCount,
            statistics::incoming_record_count(ctx),
        );
        post_statistics.insert(
            StatisticName::RowsTerminated,
            statistics::zero(StatisticName::RowsTerminated),
        );

        Ok(ModePlan {
            ingest,
            pre_statistics: self.pre_statistics(ctx),
            post_statistics,
            ..ModePlan::default()
        })
    }
}
