//! Batch metadata and lock statements
//!
//! The metadata table records one row per completed batch; the next batch id
//! is derived from it. The lock table holds a single row per main table that
//! every concurrent ingest updates before writing.

use crate::models::{DataType, Field};
use crate::plan::{Condition, FunctionName, Operation, Select, TableRef, Value};
use crate::planner::common::IngestContext;

const TABLE_NAME: &str = "table_name";
const BATCH_START: &str = "batch_start_ts_utc";
const BATCH_END: &str = "batch_end_ts_utc";
const BATCH_STATUS: &str = "batch_status";
const TABLE_BATCH_ID: &str = "table_batch_id";
const STAGING_FILTERS: &str = "staging_filters";

const LOCK_INSERT_TS: &str = "insert_ts_utc";
const LOCK_LAST_USED_TS: &str = "last_used_ts_utc";

/// Schema of the batch metadata table
pub fn metadata_fields() -> Vec<Field> {
    vec![
        Field::new(TABLE_NAME, DataType::Varchar { length: Some(255) }),
        Field::new(BATCH_START, DataType::DateTime),
        Field::new(BATCH_END, DataType::DateTime),
        Field::new(BATCH_STATUS, DataType::Varchar { length: Some(32) }),
        Field::new(TABLE_BATCH_ID, DataType::Integer),
        Field::new(STAGING_FILTERS, DataType::Json),
    ]
}

/// Schema of the lock table
pub fn lock_fields() -> Vec<Field> {
    vec![
        Field::new(LOCK_INSERT_TS, DataType::DateTime),
        Field::new(LOCK_LAST_USED_TS, DataType::DateTime),
        Field::new(TABLE_NAME, DataType::Varchar { length: None }).with_unique(),
    ]
}

/// `(SELECT COALESCE(MAX(m.table_batch_id),0)+1 FROM m WHERE UPPER(m.table_name) = 'MAIN')`
pub fn next_batch_id(metadata: &TableRef, main_name: &str) -> Value {
    let max_id = Value::function(
        FunctionName::Coalesce,
        vec![
            Value::function(FunctionName::Max, vec![metadata.field(TABLE_BATCH_ID)]),
            Value::Integer(0),
        ],
    );
    let select = Select::from_table(vec![max_id.plus(Value::Integer(1))], metadata).filter(Some(
        Condition::Equals(
            Value::function(FunctionName::Upper, vec![metadata.field(TABLE_NAME)]),
            Value::TableName(main_name.to_uppercase()),
        ),
    ));
    Value::sub_query(select)
}

pub fn create_metadata(ctx: &IngestContext<'_>) -> Operation {
    Operation::create(&ctx.metadata_table, metadata_fields())
}

/// Record the batch as completed with the configured status
pub fn ingest_metadata(ctx: &IngestContext<'_>) -> Operation {
    Operation::Insert {
        table: ctx.metadata_table.unaliased(),
        columns: vec![
            TABLE_NAME.to_string(),
            TABLE_BATCH_ID.to_string(),
            BATCH_START.to_string(),
            BATCH_END.to_string(),
            BATCH_STATUS.to_string(),
        ],
        select: Select::new(vec![
            Value::TableName(ctx.main_name().to_string()),
            ctx.next_batch_id(),
            ctx.batch_start(),
            ctx.batch_end(),
            Value::String(ctx.options.batch_success_status.clone()),
        ]),
    }
}

pub fn create_lock(ctx: &IngestContext<'_>) -> Operation {
    Operation::create(&ctx.lock_table, lock_fields())
}

/// Insert the lock row once; a no-op when it already exists
pub fn initialize_lock(ctx: &IngestContext<'_>) -> Operation {
    Operation::Insert {
        table: ctx.lock_table.unaliased(),
        columns: vec![LOCK_INSERT_TS.to_string(), TABLE_NAME.to_string()],
        select: Select::new(vec![
            ctx.batch_start(),
            Value::TableName(ctx.main_name().to_string()),
        ])
        .filter(Some(Condition::not_exists(Select::all_from(
            &ctx.lock_table,
            None,
        )))),
    }
}

/// Touch the lock row so concurrent ingests serialize on it
pub fn acquire_lock(ctx: &IngestContext<'_>) -> Operation {
    Operation::Update {
        table: ctx.lock_table.clone(),
        assignments: vec![(LOCK_LAST_USED_TS.to_string(), ctx.batch_start())],
        condition: None,
    }
}
