//! BitemporalDelta: milestone on transaction time and business validity
//!
//! When staging carries both validity bounds, a staged row closes the live row
//! with the same key and validity start, then is opened as is. When staging
//! carries only the validity start, the thru dates of staged and affected live
//! rows are derived from their neighbours through a temp table:
//!
//! 1. staged rows, with their derived thru date, into temp
//! 2. live rows split by a staged start, with their shortened range, into temp
//! 3. close the live rows replaced in temp
//! 4. move temp into main
//! 5. clear temp

use crate::error::CompileResult;
use crate::models::{BitemporalDelta, Dataset, ValidityDerivation};
use crate::plan::{
    Condition, FieldRef, FunctionName, JoinKind, Operation, Select, Source, TableAlias, TableRef, Value,
};
use crate::planner::common::{
    INFINITE_BATCH_TIME, IngestContext, TEMP_ALIAS, TEMP_TABLE_SUFFIX, close_assignments,
    insert_into_main, key_match, live_condition, open_values,
};
use crate::planner::statistics;
use crate::planner::{ModePlan, ModePlanner};

const X: &str = "ingest_x";
const Y: &str = "ingest_y";
const START: &str = "ingest_start_date";
const END: &str = "ingest_end_date";

pub struct BitemporalDeltaPlanner<'m> {
    mode: &'m BitemporalDelta,
}

impl<'m> BitemporalDeltaPlanner<'m> {
    pub fn new(mode: &'m BitemporalDelta) -> Self {
        Self { mode }
    }

    fn from_field(&self) -> &str {
        &self.mode.validity_milestoning.date_time_from_field
    }

    fn thru_field(&self) -> &str {
        &self.mode.validity_milestoning.date_time_thru_field
    }

    fn source_from_field(&self) -> &str {
        self.mode.validity_milestoning.derivation.source_from_field()
    }

    /// `sink.from = stage.source_from`
    fn same_validity(&self, sink: &TableRef, stage: &TableRef) -> Condition {
        Condition::Equals(
            sink.field(self.from_field()),
            stage.field(self.source_from_field()),
        )
    }

    fn milestone(&self, ctx: &IngestContext<'_>) -> Operation {
        let sink = &ctx.main_table;
        let stage = ctx.stage_table();
        let tm = &self.mode.transaction_milestoning;

        let changed = match (ctx.stage_supersedes(sink, stage), ctx.deleted_rows(stage)) {
            (Some(s), Some(d)) => Some(Condition::Or(vec![s, d])),
            (s, d) => s.or(d),
        };
        let staged = ctx
            .data_split_condition(stage)
            .into_iter()
            .chain(ctx.pk_match(sink, stage))
            .chain(std::iter::once(self.same_validity(sink, stage)))
            .chain(changed)
            .collect();

        Operation::Update {
            table: sink.clone(),
            assignments: close_assignments(ctx, tm),
            condition: Some(Condition::And(vec![
                live_condition(tm, sink),
                Condition::exists(Select::all_from(stage, Condition::all(staged))),
            ])),
        }
    }

    fn insert(&self, ctx: &IngestContext<'_>) -> CompileResult<Operation> {
        let sink = &ctx.main_table;
        let stage = ctx.stage_table();
        let tm = &self.mode.transaction_milestoning;

        let mut projection = ctx.insert_projection()?;
        projection.extend(open_values(ctx, tm));

        let live_match: Vec<Condition> = std::iter::once(live_condition(tm, sink))
            .chain(ctx.stage_matches(sink, stage))
            .chain(ctx.pk_match(sink, stage))
            .chain(std::iter::once(self.same_validity(sink, stage)))
            .collect();
        let unmatched = Condition::not_exists(Select::all_from(sink, Condition::all(live_match)));
        let staged = Condition::and(
            std::iter::once(unmatched)
                .chain(ctx.data_split_condition(stage))
                .collect(),
        );
        let conditions = std::iter::once(staged).chain(ctx.live_rows(stage)).collect();
        Ok(insert_into_main(ctx, projection, Condition::all(conditions)))
    }

    fn plan_from_and_thru(&self, ctx: &IngestContext<'_>) -> CompileResult<ModePlan> {
        let tm = &self.mode.transaction_milestoning;
        let mut keys = ctx.keys();
        keys.push(self.from_field());
        let reopened = ctx
            .deleted_rows(ctx.stage_table())
            .map(|_| keys.as_slice());
        Ok(ModePlan {
            ingest: vec![self.milestone(ctx), self.insert(ctx)?],
            post_statistics: statistics::milestoned(ctx, tm, reopened),
            ..ModePlan::default()
        })
    }

    fn plan_from_only(&self, ctx: &IngestContext<'_>) -> CompileResult<ModePlan> {
        let tm = &self.mode.transaction_milestoning;
        let temp = match ctx.temp {
            Some(temp) => temp.clone(),
            None => derived_temp(&ctx.main),
        };
        let temp_table = TableRef::aliased(&temp.reference, TEMP_ALIAS);
        let derivation = FromOnlyDerivation::new(self, ctx)?;

        let close = Operation::Update {
            table: ctx.main_table.clone(),
            assignments: close_assignments(ctx, tm),
            condition: Some(Condition::And(vec![
                Condition::exists(Select::all_from(
                    &temp_table,
                    Condition::all(
                        ctx.pk_match(&ctx.main_table, &temp_table)
                            .into_iter()
                            .chain(std::iter::once(Condition::Equals(
                                ctx.main_table.field(self.from_field()),
                                temp_table.field(self.from_field()),
                            )))
                            .collect(),
                    ),
                )),
                live_condition(tm, &ctx.main_table),
            ])),
        };

        let main_columns = ctx.main.field_names();
        let temp_to_main = Operation::Insert {
            table: ctx.main_table.unaliased(),
            columns: main_columns.iter().map(|c| c.to_string()).collect(),
            select: Select::from_table(
                temp_table.fields(main_columns.iter().copied()),
                &temp_table,
            ),
        };

        Ok(ModePlan {
            pre_actions: vec![Operation::create(&temp_table, temp.fields.clone())],
            ingest: vec![
                derivation.stage_to_temp(&temp_table),
                derivation.main_to_temp(&temp_table),
                close,
                temp_to_main,
                Operation::delete_all(&temp_table),
            ],
            post_statistics: statistics::milestoned(ctx, tm, None),
            ..ModePlan::default()
        })
    }
}

impl ModePlanner for BitemporalDeltaPlanner<'_> {
    fn plan(&self, ctx: &IngestContext<'_>) -> CompileResult<ModePlan> {
        match self.mode.validity_milestoning.derivation {
            ValidityDerivation::SourceSpecifiesFromAndThru { .. } => self.plan_from_and_thru(ctx),
            ValidityDerivation::SourceSpecifiesFromOnly { .. } => self.plan_from_only(ctx),
        }
    }
}

/// Temp table shaped like main, next to it
fn derived_temp(main: &Dataset) -> Dataset {
    let name = format!("{}{}", main.name(), TEMP_TABLE_SUFFIX);
    Dataset {
        reference: main.reference.sibling(name, None),
        fields: main.fields.clone(),
    }
}

/// Reference to a derived table `(SELECT ...) as alias`
fn derived(alias: &str) -> TableRef {
    TableRef {
        database: None,
        group: None,
        name: alias.to_string(),
        alias: Some(TableAlias::verbatim(alias)),
    }
}

/// Thru-date derivation for staging that only carries validity start dates
struct FromOnlyDerivation<'p, 'c> {
    planner: &'p BitemporalDeltaPlanner<'p>,
    ctx: &'c IngestContext<'c>,
    keys: Vec<&'c str>,
    /// Main columns copied from staging, other than the validity range
    data_columns: Vec<String>,
    x: TableRef,
    y: TableRef,
}

impl<'p, 'c> FromOnlyDerivation<'p, 'c> {
    fn new(
        planner: &'p BitemporalDeltaPlanner<'p>,
        ctx: &'c IngestContext<'c>,
    ) -> CompileResult<Self> {
        let from = planner.from_field();
        let data_columns = ctx
            .insert_projection()?
            .into_iter()
            .map(|(column, _)| column)
            .filter(|column| column != from)
            .collect();
        Ok(Self {
            planner,
            ctx,
            keys: ctx.keys(),
            data_columns,
            x: derived(X),
            y: derived(Y),
        })
    }

    fn key_values(&self, table: &TableRef) -> Vec<Value> {
        table.fields(self.keys.iter().copied())
    }

    /// Key match of `left` and `right`, followed by `extra`
    fn keyed(&self, left: &TableRef, right: &TableRef, extra: Vec<Condition>) -> Condition {
        Condition::and(
            key_match(&self.keys, left, right)
                .into_iter()
                .chain(extra)
                .collect(),
        )
    }

    /// `SELECT keys, source_from as start FROM stage [WHERE split]`
    fn stage_starts(&self) -> Select {
        let stage = self.ctx.stage_table();
        let mut values: Vec<Value> = self.keys.iter().map(|k| FieldRef::bare(k)).collect();
        values.push(FieldRef::bare(self.planner.source_from_field()).aliased(START));
        Select::from_table(values, stage).filter(self.ctx.data_split_condition(stage))
    }

    /// `SELECT keys, from as start [, thru as end] FROM main WHERE live`
    fn main_ranges(&self, with_end: bool) -> Select {
        let sink = &self.ctx.main_table;
        let mut values: Vec<Value> = self.keys.iter().map(|k| FieldRef::bare(k)).collect();
        values.push(FieldRef::bare(self.planner.from_field()).aliased(START));
        if with_end {
            values.push(FieldRef::bare(self.planner.thru_field()).aliased(END));
        }
        Select::from_table(values, sink).filter(Some(live_condition(
            &self.planner.mode.transaction_milestoning,
            sink,
        )))
    }

    fn grouped_keys(&self) -> Vec<Value> {
        let mut values = self.key_values(&self.x);
        values.push(self.x.field(START));
        values
    }

    /// Columns written to temp, with the values derived for them from `x` and `y`
    fn temp_projection(&self, start_column: &str) -> (Vec<String>, Vec<Value>) {
        let mut columns = self.data_columns.clone();
        let mut values: Vec<Value> = self.data_columns.iter().map(|c| self.x.field(c)).collect();
        columns.push(self.planner.from_field().to_string());
        values.push(self.x.field(start_column).aliased(START));
        columns.push(self.planner.thru_field().to_string());
        values.push(self.y.field(END));
        for (column, value) in open_values(self.ctx, &self.planner.mode.transaction_milestoning) {
            columns.push(column);
            values.push(value);
        }
        (columns, values)
    }

    /// Staged rows end where the next staged or live start of their key begins
    fn stage_to_temp(&self, temp: &TableRef) -> Operation {
        let (x, y) = (&self.x, &self.y);
        let min = |table: &TableRef, field: &str| {
            Value::function(FunctionName::Min, vec![table.field(field)])
        };

        let mut next_live_values = self.grouped_keys();
        next_live_values.push(
            Value::function(
                FunctionName::Coalesce,
                vec![min(y, START), Value::String(INFINITE_BATCH_TIME.to_string())],
            )
            .aliased(END),
        );
        let next_live = Select::new(next_live_values)
            .source(Source::join(
                Source::sub_select(self.stage_starts(), X),
                JoinKind::LeftOuter,
                Source::sub_select(self.main_ranges(false), Y),
                self.keyed(
                    x,
                    y,
                    vec![Condition::LessThan(x.field(START), y.field(START))],
                ),
            ))
            .group_by(self.grouped_keys());

        let mut ends_values = self.grouped_keys();
        ends_values.push(
            Value::function(FunctionName::Coalesce, vec![min(y, START), min(x, END)]).aliased(END),
        );
        let ends = Select::new(ends_values)
            .source(Source::join(
                Source::sub_select(next_live, X),
                JoinKind::LeftOuter,
                Source::sub_select(self.stage_starts(), Y),
                self.keyed(x, y, self.within_x_range()),
            ))
            .group_by(self.grouped_keys());

        let stage = self.ctx.stage_table();
        let source_from = self.planner.source_from_field();
        let staged_rows = Select::from_table(
            stage.fields(self.ctx.stage_dataset().field_names()),
            stage,
        )
        .filter(self.ctx.data_split_condition(stage));

        let (columns, values) = self.temp_projection(source_from);
        Operation::Insert {
            table: temp.unaliased(),
            columns,
            select: Select::new(values).source(Source::join(
                Source::sub_select(staged_rows, X),
                JoinKind::LeftOuter,
                Source::sub_select(ends, Y),
                self.keyed(
                    x,
                    y,
                    vec![Condition::Equals(x.field(source_from), y.field(START))],
                ),
            )),
        }
    }

    /// Live rows split by a staged start keep their content up to that start
    fn main_to_temp(&self, temp: &TableRef) -> Operation {
        let (x, y) = (&self.x, &self.y);
        let sink = &self.ctx.main_table;
        let stage = self.ctx.stage_table();

        let mut first_split_values = self.grouped_keys();
        first_split_values.push(
            Value::function(FunctionName::Min, vec![y.field(START)]).aliased(END),
        );
        let first_split = Select::new(first_split_values)
            .source(Source::join(
                Source::sub_select(self.main_ranges(true), X),
                JoinKind::Inner,
                Source::sub_select(self.stage_starts(), Y),
                self.keyed(x, y, self.within_x_range()),
            ))
            .group_by(self.grouped_keys());

        let restaged = self.keyed(
            x,
            stage,
            vec![Condition::Equals(
                x.field(START),
                stage.field(self.planner.source_from_field()),
            )],
        );
        let restaged = Condition::and(
            std::iter::once(restaged)
                .chain(self.ctx.data_split_condition(stage))
                .collect(),
        );
        let mut shortened_values = self.grouped_keys();
        shortened_values.push(x.field(END).aliased(END));
        let shortened = Select::new(shortened_values)
            .source(Source::sub_select(first_split, X))
            .filter(Some(Condition::not_exists(
                self.stage_starts().filter(Some(restaged)),
            )));

        let live_rows = Select::from_table(sink.fields(self.ctx.main.field_names()), sink).filter(
            Some(live_condition(&self.planner.mode.transaction_milestoning, sink)),
        );

        let from = self.planner.from_field();
        let (columns, values) = self.temp_projection(from);
        Operation::Insert {
            table: temp.unaliased(),
            columns,
            select: Select::new(values).source(Source::join(
                Source::sub_select(live_rows, X),
                JoinKind::Inner,
                Source::sub_select(shortened, Y),
                self.keyed(x, y, vec![Condition::Equals(x.field(from), y.field(START))]),
            )),
        }
    }

    /// `(y.start > x.start) AND (y.start < x.end)`
    fn within_x_range(&self) -> Vec<Condition> {
        vec![
            Condition::GreaterThan(self.y.field(START), self.x.field(START)),
            Condition::LessThan(self.y.field(START), self.x.field(END)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::models::{DataType, Datasets, Field, IngestMode, ValidityMilestoning};
    use crate::planner::PlannerOptions;
    use crate::render::SqlRenderer;

    const NEXT_BATCH_ID: &str = "(SELECT COALESCE(MAX(batch_metadata.\"table_batch_id\"),0)+1 FROM batch_metadata as batch_metadata WHERE UPPER(batch_metadata.\"table_name\") = 'MAIN')";

    fn mode(derivation: ValidityDerivation) -> BitemporalDelta {
        BitemporalDelta {
            digest_field: "digest".to_string(),
            transaction_milestoning: Default::default(),
            validity_milestoning: ValidityMilestoning {
                date_time_from_field: "validity_from_target".to_string(),
                date_time_thru_field: "validity_through_target".to_string(),
                derivation,
            },
            deduplication: Default::default(),
            versioning: Default::default(),
            merge_strategy: Default::default(),
        }
    }

    fn main() -> Dataset {
        Dataset::new(
            "main",
            vec![
                Field::new("id", DataType::Int).as_primary_key(),
                Field::new("amount", DataType::Double),
                Field::new("digest", DataType::Varchar { length: None }),
                Field::new("batch_id_in", DataType::Integer).as_primary_key(),
                Field::new("batch_id_out", DataType::Integer),
                Field::new("validity_from_target", DataType::DateTime).as_primary_key(),
                Field::new("validity_through_target", DataType::DateTime),
            ],
        )
    }

    #[test]
    fn test_from_and_thru_matches_on_validity_start() {
        let mode = mode(ValidityDerivation::SourceSpecifiesFromAndThru {
            source_date_time_from_field: "validity_from_reference".to_string(),
            source_date_time_thru_field: "validity_through_reference".to_string(),
        });
        let staging = Dataset::new(
            "staging",
            vec![
                Field::new("id", DataType::Int).as_primary_key(),
                Field::new("amount", DataType::Double),
                Field::new("validity_from_reference", DataType::DateTime).as_primary_key(),
                Field::new("validity_through_reference", DataType::DateTime),
                Field::new("digest", DataType::Varchar { length: None }),
            ],
        );
        let datasets = Datasets::new(main(), staging);
        let ingest_mode = IngestMode::BitemporalDelta(mode.clone());
        let options = PlannerOptions::default();
        let dialect = Dialect::ansi();
        let ctx = IngestContext::new(&ingest_mode, &datasets, &options, &dialect, true).unwrap();
        let plan = BitemporalDeltaPlanner::new(&mode).plan(&ctx).unwrap();

        let sql = SqlRenderer::new(&dialect).render_all(&plan.ingest);
        assert_eq!(
            sql[0],
            format!(
                "UPDATE main as sink SET sink.\"batch_id_out\" = {}-1 WHERE (sink.\"batch_id_out\" = 999999999) AND (EXISTS (SELECT * FROM staging as stage WHERE (sink.\"id\" = stage.\"id\") AND (sink.\"validity_from_target\" = stage.\"validity_from_reference\") AND (sink.\"digest\" <> stage.\"digest\")))",
                NEXT_BATCH_ID
            )
        );
        assert_eq!(
            sql[1],
            format!(
                "INSERT INTO main (\"id\", \"amount\", \"validity_from_target\", \"validity_through_target\", \"digest\", \"batch_id_in\", \"batch_id_out\") (SELECT stage.\"id\",stage.\"amount\",stage.\"validity_from_reference\",stage.\"validity_through_reference\",stage.\"digest\",{},999999999 FROM staging as stage WHERE NOT (EXISTS (SELECT * FROM main as sink WHERE (sink.\"batch_id_out\" = 999999999) AND (sink.\"digest\" = stage.\"digest\") AND (sink.\"id\" = stage.\"id\") AND (sink.\"validity_from_target\" = stage.\"validity_from_reference\"))))",
                NEXT_BATCH_ID
            )
        );
        assert!(plan.pre_actions.is_empty());
    }

    #[test]
    fn test_from_only_routes_through_temp_table() {
        let mode = mode(ValidityDerivation::SourceSpecifiesFromOnly {
            source_date_time_from_field: "validity_from_reference".to_string(),
        });
        let staging = Dataset::new(
            "staging",
            vec![
                Field::new("id", DataType::Int).as_primary_key(),
                Field::new("amount", DataType::Double),
                Field::new("validity_from_reference", DataType::DateTime).as_primary_key(),
                Field::new("digest", DataType::Varchar { length: None }),
            ],
        );
        let datasets = Datasets::new(main(), staging);
        let ingest_mode = IngestMode::BitemporalDelta(mode.clone());
        let options = PlannerOptions::default();
        let dialect = Dialect::ansi();
        let ctx = IngestContext::new(&ingest_mode, &datasets, &options, &dialect, true).unwrap();
        let plan = BitemporalDeltaPlanner::new(&mode).plan(&ctx).unwrap();

        let renderer = SqlRenderer::new(&dialect);
        assert_eq!(
            renderer.render_all(&plan.pre_actions),
            vec!["CREATE TABLE IF NOT EXISTS main_ingest_temp(\"id\" INT NOT NULL,\"amount\" DOUBLE,\"digest\" VARCHAR,\"batch_id_in\" INTEGER NOT NULL,\"batch_id_out\" INTEGER,\"validity_from_target\" DATETIME NOT NULL,\"validity_through_target\" DATETIME,PRIMARY KEY (\"id\", \"batch_id_in\", \"validity_from_target\"))"]
        );

        let sql = renderer.render_all(&plan.ingest);
        assert_eq!(sql.len(), 5);
        assert!(sql[0].starts_with(
            "INSERT INTO main_ingest_temp (\"id\", \"amount\", \"digest\", \"validity_from_target\", \"validity_through_target\", \"batch_id_in\", \"batch_id_out\") (SELECT ingest_x.\"id\",ingest_x.\"amount\",ingest_x.\"digest\",ingest_x.\"validity_from_reference\" as \"ingest_start_date\",ingest_y.\"ingest_end_date\","
        ));
        assert!(sql[0].contains(
            "COALESCE(MIN(ingest_y.\"ingest_start_date\"),'9999-12-31 23:59:59') as \"ingest_end_date\""
        ));
        assert!(sql[1].contains(
            "WHERE NOT (EXISTS (SELECT \"id\",\"validity_from_reference\" as \"ingest_start_date\" FROM staging as stage WHERE (ingest_x.\"id\" = stage.\"id\") AND (ingest_x.\"ingest_start_date\" = stage.\"validity_from_reference\")))"
        ));
        assert_eq!(
            sql[2],
            format!(
                "UPDATE main as sink SET sink.\"batch_id_out\" = {}-1 WHERE (EXISTS (SELECT * FROM main_ingest_temp as temp WHERE (sink.\"id\" = temp.\"id\") AND (sink.\"validity_from_target\" = temp.\"validity_from_target\"))) AND (sink.\"batch_id_out\" = 999999999)",
                NEXT_BATCH_ID
            )
        );
        assert_eq!(
            sql[3],
            "INSERT INTO main (\"id\", \"amount\", \"digest\", \"batch_id_in\", \"batch_id_out\", \"validity_from_target\", \"validity_through_target\") (SELECT temp.\"id\",temp.\"amount\",temp.\"digest\",temp.\"batch_id_in\",temp.\"batch_id_out\",temp.\"validity_from_target\",temp.\"validity_through_target\" FROM main_ingest_temp as temp)"
        );
        assert_eq!(sql[4], "DELETE FROM main_ingest_temp as temp");
    }
}
