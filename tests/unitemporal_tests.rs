//! UnitemporalDelta and UnitemporalSnapshot compile tests

mod common;

use common::*;
use ingest_sql_compiler::CompileError;
use ingest_sql_compiler::models::{
    DataType, Dataset, Datasets, Field, IngestMode, MergeStrategy, OptimizationFilter,
    StatisticName, TransactionMilestoning, UnitemporalDelta, UnitemporalSnapshot,
};
use ingest_sql_compiler::planner::PlannerOptions;

const LIVE: &str = "sink.\"batch_id_out\" = 999999999";

fn closing_batch_id() -> String {
    format!("{}-1", NEXT_BATCH_ID)
}

#[test]
fn test_unitemporal_delta_batch_id() {
    let options = PlannerOptions {
        collect_statistics: true,
        ..options()
    };
    let result = compiler_with(options)
        .compile(
            &IngestMode::UnitemporalDelta(UnitemporalDelta::default()),
            &datasets(base_fields()),
        )
        .unwrap();

    assert_eq!(
        result.pre_actions_sql[0],
        "CREATE TABLE IF NOT EXISTS main(\"id\" INT NOT NULL,\"name\" VARCHAR,\"amount\" DOUBLE,\"biz_date\" DATE,\"digest\" VARCHAR,\"batch_id_in\" INTEGER NOT NULL,\"batch_id_out\" INTEGER,PRIMARY KEY (\"id\", \"batch_id_in\"))"
    );
    assert_eq!(
        result.ingest_sql,
        vec![
            format!(
                "UPDATE main as sink SET sink.\"batch_id_out\" = {} WHERE ({}) AND (EXISTS (SELECT * FROM staging as stage WHERE (sink.\"id\" = stage.\"id\") AND (sink.\"digest\" <> stage.\"digest\")))",
                closing_batch_id(),
                LIVE
            ),
            format!(
                "INSERT INTO main (\"id\", \"name\", \"amount\", \"biz_date\", \"digest\", \"batch_id_in\", \"batch_id_out\") (SELECT {},{},999999999 FROM staging as stage WHERE NOT (EXISTS (SELECT * FROM main as sink WHERE ({}) AND (sink.\"digest\" = stage.\"digest\") AND (sink.\"id\" = stage.\"id\"))))",
                staged_columns("stage"),
                NEXT_BATCH_ID,
                LIVE
            ),
        ]
    );

    let stats = &result.post_ingest_statistics_sql;
    assert_eq!(
        stats[&StatisticName::RowsUpdated],
        format!(
            "SELECT COUNT(*) as \"rowsUpdated\" FROM main as sink WHERE sink.\"batch_id_out\" = {}",
            closing_batch_id()
        )
    );
    assert_eq!(
        stats[&StatisticName::RowsInserted],
        format!(
            "SELECT (SELECT COUNT(*) FROM main as sink WHERE sink.\"batch_id_in\" = {})-(SELECT COUNT(*) FROM main as sink WHERE sink.\"batch_id_out\" = {}) as \"rowsInserted\"",
            NEXT_BATCH_ID,
            closing_batch_id()
        )
    );
    assert_eq!(
        stats[&StatisticName::RowsTerminated],
        "SELECT 0 as \"rowsTerminated\""
    );
}

#[test]
fn test_unitemporal_delta_with_delete_indicator() {
    let datasets = Datasets::new(
        Dataset::new("main", base_fields()),
        Dataset::new(
            "staging",
            with_field(
                base_fields(),
                Field::new("delete_indicator", DataType::Varchar { length: None }),
            ),
        ),
    );
    let mode = UnitemporalDelta {
        merge_strategy: MergeStrategy::DeleteIndicator {
            delete_field: "delete_indicator".to_string(),
            delete_values: vec!["yes".to_string()],
        },
        ..UnitemporalDelta::default()
    };
    let options = PlannerOptions {
        collect_statistics: true,
        ..options()
    };
    let result = compiler_with(options)
        .compile(&IngestMode::UnitemporalDelta(mode), &datasets)
        .unwrap();

    assert_eq!(
        result.ingest_sql[0],
        format!(
            "UPDATE main as sink SET sink.\"batch_id_out\" = {} WHERE ({}) AND (EXISTS (SELECT * FROM staging as stage WHERE (sink.\"id\" = stage.\"id\") AND ((sink.\"digest\" <> stage.\"digest\") OR (stage.\"delete_indicator\" IN ('yes')))))",
            closing_batch_id(),
            LIVE
        )
    );
    assert!(
        result.ingest_sql[1].ends_with(
            "AND (sink.\"id\" = stage.\"id\")))) AND (stage.\"delete_indicator\" NOT IN ('yes')))"
        ),
        "{}",
        result.ingest_sql[1]
    );

    let reopened = format!(
        "(sink.\"batch_id_out\" = {}) AND (EXISTS (SELECT * FROM main as sink2 WHERE (sink2.\"id\" = sink.\"id\") AND (sink2.\"batch_id_in\" = {})))",
        closing_batch_id(),
        NEXT_BATCH_ID
    );
    let stats = &result.post_ingest_statistics_sql;
    assert_eq!(
        stats[&StatisticName::RowsUpdated],
        format!("SELECT COUNT(*) as \"rowsUpdated\" FROM main as sink WHERE {}", reopened)
    );
    assert_eq!(
        stats[&StatisticName::RowsTerminated],
        format!(
            "SELECT (SELECT COUNT(*) FROM main as sink WHERE sink.\"batch_id_out\" = {})-(SELECT COUNT(*) FROM main as sink WHERE {}) as \"rowsTerminated\"",
            closing_batch_id(),
            reopened
        )
    );
}

#[test]
fn test_unitemporal_delta_optimization_filter() {
    let mode = UnitemporalDelta {
        optimization_filters: vec![OptimizationFilter::new(
            "id",
            "{ID_LOWER_BOUND}",
            "{ID_UPPER_BOUND}",
        )],
        ..UnitemporalDelta::default()
    };
    let result = compiler()
        .compile(&IngestMode::UnitemporalDelta(mode), &datasets(base_fields()))
        .unwrap();

    let filter = "(sink.\"id\" >= '{ID_LOWER_BOUND}') AND (sink.\"id\" <= '{ID_UPPER_BOUND}')";
    assert_eq!(
        result.ingest_sql[0],
        format!(
            "UPDATE main as sink SET sink.\"batch_id_out\" = {} WHERE ({}) AND ({}) AND (EXISTS (SELECT * FROM staging as stage WHERE (sink.\"id\" = stage.\"id\") AND (sink.\"digest\" <> stage.\"digest\")))",
            closing_batch_id(),
            LIVE,
            filter
        )
    );
    assert!(result.ingest_sql[1].contains(&format!(
        "WHERE ({}) AND (sink.\"digest\" = stage.\"digest\") AND (sink.\"id\" = stage.\"id\") AND ({}))",
        LIVE, filter
    )));
}

#[test]
fn test_unitemporal_delta_rejects_bad_optimization_filters() {
    let unknown = UnitemporalDelta {
        optimization_filters: vec![OptimizationFilter::new("missing", "{L}", "{U}")],
        ..UnitemporalDelta::default()
    };
    let result = compiler().compile(&IngestMode::UnitemporalDelta(unknown), &datasets(base_fields()));
    assert!(matches!(
        result,
        Err(CompileError::InvalidOptimizationFilter { ref column, .. }) if column == "missing"
    ));

    let wrong_type = UnitemporalDelta {
        optimization_filters: vec![OptimizationFilter::new("name", "{L}", "{U}")],
        ..UnitemporalDelta::default()
    };
    let result =
        compiler().compile(&IngestMode::UnitemporalDelta(wrong_type), &datasets(base_fields()));
    assert!(matches!(
        result,
        Err(CompileError::InvalidOptimizationFilter { ref column, .. }) if column == "name"
    ));
}

#[test]
fn test_unitemporal_delta_batch_id_and_date_time() {
    let mode = UnitemporalDelta {
        transaction_milestoning: TransactionMilestoning::BatchIdAndDateTime {
            batch_id_in_field: "batch_id_in".to_string(),
            batch_id_out_field: "batch_id_out".to_string(),
            date_time_in_field: "batch_time_in".to_string(),
            date_time_out_field: "batch_time_out".to_string(),
        },
        ..UnitemporalDelta::default()
    };
    let result = compiler()
        .compile(&IngestMode::UnitemporalDelta(mode), &datasets(base_fields()))
        .unwrap();

    assert_eq!(
        result.pre_actions_sql[0],
        "CREATE TABLE IF NOT EXISTS main(\"id\" INT NOT NULL,\"name\" VARCHAR,\"amount\" DOUBLE,\"biz_date\" DATE,\"digest\" VARCHAR,\"batch_id_in\" INTEGER NOT NULL,\"batch_id_out\" INTEGER,\"batch_time_in\" DATETIME,\"batch_time_out\" DATETIME,PRIMARY KEY (\"id\", \"batch_id_in\"))"
    );
    assert!(result.ingest_sql[0].starts_with(&format!(
        "UPDATE main as sink SET sink.\"batch_id_out\" = {},sink.\"batch_time_out\" = {} WHERE ({}) AND",
        closing_batch_id(),
        BATCH_START,
        LIVE
    )));
    assert!(result.ingest_sql[1].starts_with(&format!(
        "INSERT INTO main (\"id\", \"name\", \"amount\", \"biz_date\", \"digest\", \"batch_id_in\", \"batch_id_out\", \"batch_time_in\", \"batch_time_out\") (SELECT {},{},999999999,{},'9999-12-31 23:59:59' FROM staging as stage",
        staged_columns("stage"),
        NEXT_BATCH_ID,
        BATCH_START
    )));
}

#[test]
fn test_unitemporal_delta_transaction_date_time() {
    let mode = UnitemporalDelta {
        transaction_milestoning: TransactionMilestoning::TransactionDateTime {
            date_time_in_field: "batch_time_in".to_string(),
            date_time_out_field: "batch_time_out".to_string(),
        },
        ..UnitemporalDelta::default()
    };
    let result = compiler()
        .compile(&IngestMode::UnitemporalDelta(mode), &datasets(base_fields()))
        .unwrap();

    assert_eq!(
        result.pre_actions_sql[0],
        "CREATE TABLE IF NOT EXISTS main(\"id\" INT NOT NULL,\"name\" VARCHAR,\"amount\" DOUBLE,\"biz_date\" DATE,\"digest\" VARCHAR,\"batch_time_in\" DATETIME NOT NULL,\"batch_time_out\" DATETIME,PRIMARY KEY (\"id\", \"batch_time_in\"))"
    );
    assert_eq!(
        result.ingest_sql[0],
        format!(
            "UPDATE main as sink SET sink.\"batch_time_out\" = {} WHERE (sink.\"batch_time_out\" = '9999-12-31 23:59:59') AND (EXISTS (SELECT * FROM staging as stage WHERE (sink.\"id\" = stage.\"id\") AND (sink.\"digest\" <> stage.\"digest\")))",
            BATCH_START
        )
    );
}

#[test]
fn test_unitemporal_snapshot_without_partition() {
    let result = compiler()
        .compile(
            &IngestMode::UnitemporalSnapshot(UnitemporalSnapshot::default()),
            &datasets(base_fields()),
        )
        .unwrap();

    assert_eq!(
        result.ingest_sql,
        vec![
            format!(
                "UPDATE main as sink SET sink.\"batch_id_out\" = {} WHERE ({}) AND (NOT (EXISTS (SELECT * FROM staging as stage WHERE (sink.\"id\" = stage.\"id\") AND (sink.\"digest\" = stage.\"digest\"))))",
                closing_batch_id(),
                LIVE
            ),
            format!(
                "INSERT INTO main (\"id\", \"name\", \"amount\", \"biz_date\", \"digest\", \"batch_id_in\", \"batch_id_out\") (SELECT {},{},999999999 FROM staging as stage WHERE NOT (stage.\"digest\" IN (SELECT sink.\"digest\" FROM main as sink WHERE {})))",
                staged_columns("stage"),
                NEXT_BATCH_ID,
                LIVE
            ),
        ]
    );
}

#[test]
fn test_unitemporal_snapshot_empty_batch_closes_live_rows() {
    let result = compiler()
        .compile_for_empty_batch(
            &IngestMode::UnitemporalSnapshot(UnitemporalSnapshot::default()),
            &datasets(base_fields()),
        )
        .unwrap();
    assert_eq!(
        result.ingest_sql,
        vec![format!(
            "UPDATE main as sink SET sink.\"batch_id_out\" = {} WHERE {}",
            closing_batch_id(),
            LIVE
        )]
    );
}

#[test]
fn test_unitemporal_delta_empty_batch_has_no_ingest() {
    let result = compiler()
        .compile_for_empty_batch(
            &IngestMode::UnitemporalDelta(UnitemporalDelta::default()),
            &datasets(base_fields()),
        )
        .unwrap();
    assert!(result.ingest_sql.is_empty());
    assert_eq!(result.metadata_ingest_sql.len(), 1);
}
