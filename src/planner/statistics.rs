//! Statistics queries
//!
//! Read-only counts evaluated before or after the ingest statements, scoped
//! by the same predicates the ingest uses.

use std::collections::BTreeMap;

use crate::models::{StatisticName, TransactionMilestoning};
use crate::plan::{Condition, FunctionName, Select, TableRef, Value};
use crate::planner::common::{
    COUNT_FIELD, IngestContext, SELF_JOIN_ALIAS, key_match,
};

pub type Statistics = BTreeMap<StatisticName, Select>;

/// Rows offered by the batch, counted before deduplication
pub fn incoming_record_count(ctx: &IngestContext<'_>) -> Select {
    let stage = ctx.stage_table();
    let name = StatisticName::IncomingRecordCount.as_str();
    let count = if ctx.stage_has_count() {
        Value::function(
            FunctionName::Coalesce,
            vec![
                Value::function(FunctionName::Sum, vec![stage.field(COUNT_FIELD)]),
                Value::Integer(0),
            ],
        )
    } else {
        Value::count_all()
    };
    Select::from_table(vec![count.aliased(name)], stage)
        .filter(ctx.data_split_condition(stage))
}

/// `SELECT 0 as "name"`
pub fn zero(name: StatisticName) -> Select {
    Select::new(vec![Value::Integer(0).aliased(name.as_str())])
}

/// `SELECT COUNT(*) as "name" FROM table [WHERE condition]`
pub fn count(name: StatisticName, table: &TableRef, condition: Option<Condition>) -> Select {
    Select::from_table(vec![Value::count_all().aliased(name.as_str())], table).filter(condition)
}

fn count_value(table: &TableRef, condition: Condition) -> Value {
    Value::sub_query(Select::from_table(vec![Value::count_all()], table).filter(Some(condition)))
}

/// Transaction markers of one milestoned batch
pub struct Markers {
    /// Rows opened by the batch
    pub opened: Condition,
    /// Rows closed by the batch
    pub closed: Condition,
}

impl Markers {
    pub fn new(ctx: &IngestContext<'_>, tm: &TransactionMilestoning, table: &TableRef) -> Self {
        if let Some((batch_in, batch_out)) = tm.batch_id_fields() {
            return Self {
                opened: Condition::Equals(table.field(batch_in), ctx.next_batch_id()),
                closed: Condition::Equals(table.field(batch_out), ctx.closing_batch_id()),
            };
        }
        let (time_in, time_out) = tm.date_time_fields().unwrap_or_default();
        Self {
            opened: Condition::Equals(table.field(time_in), ctx.batch_start()),
            closed: Condition::Equals(table.field(time_out), ctx.batch_start()),
        }
    }
}

/// Statistics of a milestoned ingest.
///
/// With `reopened_keys`, a row closed by the batch only counts as updated when
/// the batch also opened a row with the same keys; the remaining closed rows
/// are terminations.
pub fn milestoned(
    ctx: &IngestContext<'_>,
    tm: &TransactionMilestoning,
    reopened_keys: Option<&[&str]>,
) -> Statistics {
    let sink = &ctx.main_table;
    let markers = Markers::new(ctx, tm, sink);

    let updated = match reopened_keys {
        Some(keys) => {
            let sink2 = sink.realias(SELF_JOIN_ALIAS);
            let reopened = Markers::new(ctx, tm, &sink2).opened;
            let mut matched: Vec<Condition> = key_match(keys, &sink2, sink).into_iter().collect();
            matched.push(reopened);
            Condition::And(vec![
                markers.closed.clone(),
                Condition::exists(Select::all_from(&sink2, Condition::all(matched))),
            ])
        }
        None => markers.closed.clone(),
    };

    let mut stats = Statistics::new();
    stats.insert(StatisticName::IncomingRecordCount, incoming_record_count(ctx));
    stats.insert(
        StatisticName::RowsUpdated,
        count(StatisticName::RowsUpdated, sink, Some(updated.clone())),
    );
    stats.insert(
        StatisticName::RowsInserted,
        Select::new(vec![
            count_value(sink, markers.opened)
                .minus(count_value(sink, updated.clone()))
                .aliased(StatisticName::RowsInserted.as_str()),
        ]),
    );
    let terminated = match reopened_keys {
        Some(_) => Select::new(vec![
            count_value(sink, markers.closed)
                .minus(count_value(sink, updated))
                .aliased(StatisticName::RowsTerminated.as_str()),
        ]),
        None => zero(StatisticName::RowsTerminated),
    };
    stats.insert(StatisticName::RowsTerminated, terminated);
    stats.insert(StatisticName::RowsDeleted, zero(StatisticName::RowsDeleted));
    stats
}
