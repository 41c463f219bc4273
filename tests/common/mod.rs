//! Shared fixtures for the integration tests

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use ingest_sql_compiler::dialect::Dialect;
use ingest_sql_compiler::generator::Compiler;
use ingest_sql_compiler::models::{DataType, Dataset, Datasets, Field};
use ingest_sql_compiler::planner::PlannerOptions;

/// Next batch id expression for a main table named `main`
pub const NEXT_BATCH_ID: &str = "(SELECT COALESCE(MAX(batch_metadata.\"table_batch_id\"),0)+1 FROM batch_metadata as batch_metadata WHERE UPPER(batch_metadata.\"table_name\") = 'MAIN')";

/// Rendered batch start timestamp
pub const BATCH_START: &str = "'2000-01-01 00:00:00.000000'";

pub const METADATA_CREATE: &str = "CREATE TABLE IF NOT EXISTS batch_metadata(\"table_name\" VARCHAR(255),\"batch_start_ts_utc\" DATETIME,\"batch_end_ts_utc\" DATETIME,\"batch_status\" VARCHAR(32),\"table_batch_id\" INTEGER,\"staging_filters\" JSON)";

pub fn batch_start_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
}

/// Default options with the batch start pinned
pub fn options() -> PlannerOptions {
    PlannerOptions::default().with_batch_start_timestamp(batch_start_timestamp())
}

pub fn compiler() -> Compiler {
    Compiler::new(Dialect::ansi(), options())
}

pub fn compiler_with(options: PlannerOptions) -> Compiler {
    Compiler::new(Dialect::ansi(), options)
}

/// `id` (key), `name`, `amount`, `biz_date`, `digest`
pub fn base_fields() -> Vec<Field> {
    vec![
        Field::new("id", DataType::Int).as_primary_key(),
        Field::new("name", DataType::Varchar { length: None }),
        Field::new("amount", DataType::Double),
        Field::new("biz_date", DataType::Date),
        Field::new("digest", DataType::Varchar { length: None }),
    ]
}

pub fn with_field(mut fields: Vec<Field>, field: Field) -> Vec<Field> {
    fields.push(field);
    fields
}

/// Main and staging with the same fields
pub fn datasets(fields: Vec<Field>) -> Datasets {
    Datasets::new(
        Dataset::new("main", fields.clone()),
        Dataset::new("staging", fields),
    )
}

/// `stage."id",stage."name",stage."amount",stage."biz_date",stage."digest"`
pub fn staged_columns(alias: &str) -> String {
    ["id", "name", "amount", "biz_date", "digest"]
        .iter()
        .map(|c| format!("{}.\"{}\"", alias, c))
        .collect::<Vec<_>>()
        .join(",")
}
