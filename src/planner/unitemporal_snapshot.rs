//! UnitemporalSnapshot: make the live rows of main mirror the staged snapshot
//!
//! Live rows without an identical staged row are closed, staged rows without
//! an identical live row are opened. Partition scoping limits both
//! statements to the partitions present in staging, or to listed values.

use tracing::warn;

use crate::error::CompileResult;
use crate::models::{DataType, EmptyDatasetHandling, PartitionSpec, UnitemporalSnapshot};
use crate::plan::{Condition, Operation, Select, TableRef, Value};
use crate::planner::common::{
    IngestContext, close_assignments, insert_into_main, key_match, live_condition, open_values,
};
use crate::planner::statistics;
use crate::planner::{ModePlan, ModePlanner};

pub struct UnitemporalSnapshotPlanner<'m> {
    mode: &'m UnitemporalSnapshot,
}

impl<'m> UnitemporalSnapshotPlanner<'m> {
    pub fn new(mode: &'m UnitemporalSnapshot) -> Self {
        Self { mode }
    }

    fn partition(&self) -> Option<&PartitionSpec> {
        self.mode.partition.as_ref().filter(|p| !p.fields.is_empty())
    }

    /// `t.p IN (values)` for every partition field with listed values
    fn partition_values_condition(&self, ctx: &IngestContext<'_>, table: &TableRef) -> Option<Condition> {
        let partition = self.partition()?;
        let conditions = partition
            .fields
            .iter()
            .filter_map(|field| partition.values.get(field).map(|values| (field, values)))
            .map(|(field, values)| {
                let data_type = ctx
                    .main
                    .field(field)
                    .map(|f| f.data_type.clone())
                    .unwrap_or(DataType::Varchar { length: None });
                Condition::In(
                    table.field(field),
                    values
                        .iter()
                        .map(|v| Value::typed_literal(v, &data_type))
                        .collect(),
                )
            })
            .collect();
        Condition::all(conditions)
    }

    fn partition_fields(&self) -> Vec<&str> {
        self.partition()
            .map(|p| p.fields.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn milestone(&self, ctx: &IngestContext<'_>) -> Operation {
        let sink = &ctx.main_table;
        let stage = ctx.stage_table();
        let tm = &self.mode.transaction_milestoning;

        let still_staged = Condition::all(
            ctx.pk_match(sink, stage)
                .into_iter()
                .chain(ctx.stage_matches(sink, stage))
                .collect(),
        );
        let mut conditions = vec![
            live_condition(tm, sink),
            Condition::not_exists(Select::all_from(stage, still_staged)),
        ];
        match self.partition_values_condition(ctx, sink) {
            Some(values) => conditions.push(values),
            None => {
                if let Some(staged_partition) = key_match(&self.partition_fields(), sink, stage) {
                    conditions.push(Condition::exists(Select::all_from(
                        stage,
                        Some(staged_partition),
                    )));
                }
            }
        }

        Operation::Update {
            table: sink.clone(),
            assignments: close_assignments(ctx, tm),
            condition: Condition::all(conditions),
        }
    }

    fn insert(&self, ctx: &IngestContext<'_>) -> CompileResult<Operation> {
        let sink = &ctx.main_table;
        let stage = ctx.stage_table();
        let tm = &self.mode.transaction_milestoning;

        let mut projection = ctx.insert_projection()?;
        projection.extend(open_values(ctx, tm));

        let mut live = vec![live_condition(tm, sink)];
        match self.partition_values_condition(ctx, sink) {
            Some(values) => live.push(values),
            None => live.extend(key_match(&self.partition_fields(), sink, stage)),
        }
        let digest = self.mode.digest_field.as_str();
        let live_digests =
            Select::from_table(vec![sink.field(digest)], sink).filter(Condition::all(live));
        let unseen = Condition::not(Condition::InSelect(
            stage.field(digest),
            Box::new(live_digests),
        ));
        Ok(insert_into_main(ctx, projection, Some(unseen)))
    }
}

impl ModePlanner for UnitemporalSnapshotPlanner<'_> {
    fn plan(&self, ctx: &IngestContext<'_>) -> CompileResult<ModePlan> {
        let tm = &self.mode.transaction_milestoning;
        let keys = ctx.keys();
        Ok(ModePlan {
            ingest: vec![self.milestone(ctx), self.insert(ctx)?],
            post_statistics: statistics::milestoned(ctx, tm, Some(keys.as_slice())),
            ..ModePlan::default()
        })
    }

    /// Close every live row in scope, unless configured as a no-op
    fn plan_empty_batch(&self, ctx: &IngestContext<'_>) -> CompileResult<ModePlan> {
        if self.mode.empty_dataset_handling == EmptyDatasetHandling::NoOp {
            return Ok(ModePlan::default());
        }
        let sink = &ctx.main_table;
        let tm = &self.mode.transaction_milestoning;
        let values = self.partition_values_condition(ctx, sink);
        if values.is_none() && self.partition().is_some() {
            warn!(
                main = ctx.main_name(),
                "Partitions of an empty batch are unknown, skipping milestoning"
            );
            return Ok(ModePlan::default());
        }
        let conditions = std::iter::once(live_condition(tm, sink)).chain(values).collect();
        Ok(ModePlan {
            ingest: vec![Operation::Update {
                table: sink.clone(),
                assignments: close_assignments(ctx, tm),
                condition: Condition::all(conditions),
            }],
            ..ModePlan::default()
        })
    }
}
