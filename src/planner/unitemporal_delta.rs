//! UnitemporalDelta: close superseded live rows and open the staged versions

use crate::error::CompileResult;
use crate::models::{OptimizationFilter, UnitemporalDelta};
use crate::plan::{Condition, Operation, Select, TableRef, Value};
use crate::planner::common::{
    IngestContext, close_assignments, insert_into_main, live_condition, open_values,
};
use crate::planner::statistics;
use crate::planner::{ModePlan, ModePlanner};

pub struct UnitemporalDeltaPlanner<'m> {
    mode: &'m UnitemporalDelta,
}

impl<'m> UnitemporalDeltaPlanner<'m> {
    pub fn new(mode: &'m UnitemporalDelta) -> Self {
        Self { mode }
    }

    /// Caller-supplied narrowing of the main rows considered
    fn optimization_filters(&self, ctx: &IngestContext<'_>) -> Vec<Condition> {
        self.mode
            .optimization_filters
            .iter()
            .map(|f| optimization_condition(f, &ctx.main_table))
            .collect()
    }

    fn milestone(&self, ctx: &IngestContext<'_>) -> Operation {
        let sink = &ctx.main_table;
        let stage = ctx.stage_table();
        let tm = &self.mode.transaction_milestoning;

        let supersedes = ctx.stage_supersedes(sink, stage);
        let changed = match (supersedes, ctx.deleted_rows(stage)) {
            (Some(s), Some(d)) => Some(Condition::Or(vec![s, d])),
            (s, d) => s.or(d),
        };
        let staged = ctx
            .data_split_condition(stage)
            .into_iter()
            .chain(ctx.pk_match(sink, stage))
            .chain(changed)
            .collect();

        let mut conditions = vec![live_condition(tm, sink)];
        conditions.extend(self.optimization_filters(ctx));
        conditions.push(Condition::exists(Select::all_from(
            stage,
            Condition::all(staged),
        )));

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

        let mut live_match = vec![live_condition(tm, sink)];
        live_match.extend(ctx.stage_matches(sink, stage));
        live_match.extend(ctx.pk_match(sink, stage));
        live_match.extend(self.optimization_filters(ctx));

        let conditions = ctx
            .data_split_condition(stage)
            .into_iter()
            .chain(std::iter::once(Condition::not_exists(Select::all_from(
                sink,
                Condition::all(live_match),
            ))))
            .chain(ctx.live_rows(stage))
            .collect();
        Ok(insert_into_main(ctx, projection, Condition::all(conditions)))
    }
}

/// `(f >= 'lower') AND (f <= 'upper')`, or that range `OR f IS NULL` when nulls are included
pub fn optimization_condition(filter: &OptimizationFilter, table: &TableRef) -> Condition {
    let bound = |pattern: &str| Value::String(pattern.to_string());
    let field = table.field(&filter.field_name);
    let range = Condition::And(vec![
        Condition::GreaterThanOrEqual(field.clone(), bound(&filter.lower_bound_pattern)),
        Condition::LessThanOrEqual(field.clone(), bound(&filter.upper_bound_pattern)),
    ]);
    if filter.include_nulls {
        Condition::Or(vec![range, Condition::IsNull(field)])
    } else {
        range
    }
}

impl ModePlanner for UnitemporalDeltaPlanner<'_> {
    fn plan(&self, ctx: &IngestContext<'_>) -> CompileResult<ModePlan> {
        let tm = &self.mode.transaction_milestoning;
        let keys = ctx.keys();
        let reopened = ctx.deleted_rows(ctx.stage_table()).map(|_| keys.as_slice());
        Ok(ModePlan {
            ingest: vec![self.milestone(ctx), self.insert(ctx)?],
            post_statistics: statistics::milestoned(ctx, tm, reopened),
            ..ModePlan::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::render::SqlRenderer;

    #[test]
    fn test_optimization_condition_quotes_bounds() {
        let table = TableRef::aliased(&crate::models::DatasetReference::new("main"), "sink");
        let filter = OptimizationFilter::new("id", "{ID_LOWER_BOUND}", "{ID_UPPER_BOUND}");
        let dialect = Dialect::ansi();
        let sql = SqlRenderer::new(&dialect)
            .render_condition(&optimization_condition(&filter, &table));
        assert_eq!(
            sql,
            "(sink.\"id\" >= '{ID_LOWER_BOUND}') AND (sink.\"id\" <= '{ID_UPPER_BOUND}')"
        );
    }

    #[test]
    fn test_optimization_condition_including_nulls() {
        let table = TableRef::aliased(&crate::models::DatasetReference::new("main"), "sink");
        let filter = OptimizationFilter {
            include_nulls: true,
            ..OptimizationFilter::new("biz_date", "{LOWER}", "{UPPER}")
        };
        let dialect = Dialect::ansi();
        let sql = SqlRenderer::new(&dialect)
            .render_condition(&optimization_condition(&filter, &table));
        assert_eq!(
            sql,
            "((sink.\"biz_date\" >= '{LOWER}') AND (sink.\"biz_date\" <= '{UPPER}')) OR (sink.\"biz_date\" IS NULL)"
        );
    }
}
