//! Dialect-dependent rendering of whole compiles

mod common;

use common::*;
use ingest_sql_compiler::generator::Compiler;
use ingest_sql_compiler::models::{
    AppendOnly, AuditingStrategy, DataSplitRange, DataType, Dataset, Datasets, Field, IngestMode,
    MergeStrategy, NontemporalDelta, UnitemporalDelta, VersionResolver, VersioningStrategy,
};
use ingest_sql_compiler::{CompileError, Dialect, DialectKind};

#[test]
fn test_upper_case_folds_tables_and_columns() {
    let compiler = Compiler::new(Dialect::ansi().with_upper_case(true), options());
    let result = compiler
        .compile(&IngestMode::AppendOnly(AppendOnly::default()), &datasets(base_fields()))
        .unwrap();

    assert_eq!(
        result.pre_actions_sql[0],
        "CREATE TABLE IF NOT EXISTS MAIN(\"ID\" INT NOT NULL,\"NAME\" VARCHAR,\"AMOUNT\" DOUBLE,\"BIZ_DATE\" DATE,\"DIGEST\" VARCHAR,\"BATCH_ID\" INTEGER,PRIMARY KEY (\"ID\"))"
    );
    assert_eq!(
        result.ingest_sql,
        vec!["INSERT INTO MAIN (\"ID\", \"NAME\", \"AMOUNT\", \"BIZ_DATE\", \"DIGEST\", \"BATCH_ID\") (SELECT stage.\"ID\",stage.\"NAME\",stage.\"AMOUNT\",stage.\"BIZ_DATE\",stage.\"DIGEST\",(SELECT COALESCE(MAX(BATCH_METADATA.\"TABLE_BATCH_ID\"),0)+1 FROM BATCH_METADATA as BATCH_METADATA WHERE UPPER(BATCH_METADATA.\"TABLE_NAME\") = 'MAIN') FROM STAGING as stage)"]
    );
    assert!(result.metadata_ingest_sql[0].contains("(SELECT 'MAIN',"));
}

#[test]
fn test_upper_case_keeps_data_literals() {
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
    let mode = NontemporalDelta {
        merge_strategy: MergeStrategy::DeleteIndicator {
            delete_field: "delete_indicator".to_string(),
            delete_values: vec!["yes".to_string()],
        },
        ..NontemporalDelta::default()
    };
    let compiler = Compiler::new(Dialect::postgres().with_upper_case(true), options());
    let result = compiler
        .compile(&IngestMode::NontemporalDelta(mode), &datasets)
        .unwrap();

    let delete = &result.ingest_sql[2];
    assert!(delete.starts_with("DELETE FROM MAIN as sink WHERE EXISTS"), "{}", delete);
    assert!(delete.contains("stage.\"DELETE_INDICATOR\" IN ('yes')"), "{}", delete);
}

#[test]
fn test_backtick_dialect_drops_without_cascade() {
    let mode = AppendOnly {
        digest_field: Some("digest".to_string()),
        deduplication: ingest_sql_compiler::models::DeduplicationStrategy::FilterDuplicates,
        ..AppendOnly::default()
    };
    let compiler = Compiler::new(Dialect::from_kind(DialectKind::MemSql), options());
    let result = compiler
        .compile(&IngestMode::AppendOnly(mode), &datasets(base_fields()))
        .unwrap();

    assert!(result.ingest_sql[0].starts_with("INSERT INTO main (`id`, `name`,"));
    assert_eq!(
        result.post_cleanup_sql,
        vec!["DROP TABLE IF EXISTS staging_ingest_temp_staging"]
    );
}

#[test]
fn test_versioning_needs_window_functions() {
    let dialect = Dialect {
        supports_window_functions: false,
        ..Dialect::ansi()
    };
    let mode = AppendOnly {
        auditing: AuditingStrategy::DateTimeAuditing {
            date_time_field: "batch_update_time".to_string(),
        },
        versioning: VersioningStrategy::MaxVersion {
            version_field: "version".to_string(),
            resolver: VersionResolver::DigestBased,
            perform_stage_versioning: true,
            fail_on_duplicate_primary_keys: false,
        },
        ..AppendOnly::default()
    };
    let datasets = datasets(with_field(base_fields(), Field::new("version", DataType::Int)));
    let result = Compiler::new(dialect, options()).compile(&IngestMode::AppendOnly(mode), &datasets);
    assert!(matches!(
        result,
        Err(CompileError::MissingDialectFeature { .. })
    ));
}

const BIGQUERY_BATCH_START: &str = "PARSE_DATETIME('%Y-%m-%d %H:%M:%S','2000-01-01 00:00:00')";

fn bigquery() -> Compiler {
    Compiler::new(Dialect::bigquery(), options())
}

#[test]
fn test_bigquery_upserts_with_one_merge() {
    let result = bigquery()
        .compile(
            &IngestMode::NontemporalDelta(NontemporalDelta::default()),
            &datasets(base_fields()),
        )
        .unwrap();

    assert_eq!(
        result.pre_actions_sql[0],
        "CREATE TABLE IF NOT EXISTS main(`id` INT NOT NULL,`name` VARCHAR,`amount` DOUBLE,`biz_date` DATE,`digest` VARCHAR,PRIMARY KEY (`id`) NOT ENFORCED)"
    );
    assert_eq!(
        result.ingest_sql,
        vec![
            "MERGE INTO main as sink USING staging as stage ON sink.`id` = stage.`id` \
             WHEN MATCHED AND sink.`digest` <> stage.`digest` \
             THEN UPDATE SET sink.`id` = stage.`id`,sink.`name` = stage.`name`,sink.`amount` = stage.`amount`,sink.`biz_date` = stage.`biz_date`,sink.`digest` = stage.`digest` \
             WHEN NOT MATCHED THEN INSERT (`id`, `name`, `amount`, `biz_date`, `digest`) \
             VALUES (stage.`id`,stage.`name`,stage.`amount`,stage.`biz_date`,stage.`digest`)"
        ]
    );
    let metadata = &result.metadata_ingest_sql[0];
    assert!(
        metadata.ends_with(&format!(",{BIGQUERY_BATCH_START},CURRENT_DATETIME(),'DONE')")),
        "{}",
        metadata
    );
}

#[test]
fn test_bigquery_merge_skips_and_deletes_flagged_rows() {
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
    let mode = NontemporalDelta {
        auditing: AuditingStrategy::DateTimeAuditing {
            date_time_field: "batch_update_time".to_string(),
        },
        merge_strategy: MergeStrategy::DeleteIndicator {
            delete_field: "delete_indicator".to_string(),
            delete_values: vec!["yes".to_string()],
        },
        ..NontemporalDelta::default()
    };
    let result = bigquery()
        .compile(&IngestMode::NontemporalDelta(mode), &datasets)
        .unwrap();

    assert_eq!(result.ingest_sql.len(), 1);
    let merge = &result.ingest_sql[0];
    assert!(merge.contains(
        "WHEN MATCHED AND (sink.`digest` <> stage.`digest`) AND (stage.`delete_indicator` NOT IN ('yes')) THEN UPDATE SET"
    ), "{}", merge);
    assert!(merge.contains(&format!(
        "sink.`digest` = stage.`digest`,sink.`batch_update_time` = {BIGQUERY_BATCH_START} \
         WHEN MATCHED AND (sink.`digest` = stage.`digest`) AND (stage.`delete_indicator` IN ('yes')) THEN DELETE \
         WHEN NOT MATCHED AND stage.`delete_indicator` NOT IN ('yes') THEN INSERT"
    )), "{}", merge);
    assert!(merge.ends_with(&format!("stage.`digest`,{BIGQUERY_BATCH_START})")), "{}", merge);
}

#[test]
fn test_bigquery_merge_reads_data_split_through_sub_select() {
    let staging = with_field(
        with_field(base_fields(), Field::new("version", DataType::Int)),
        Field::new("data_split", DataType::Int),
    );
    let datasets = Datasets::new(
        Dataset::new("main", with_field(base_fields(), Field::new("version", DataType::Int))),
        Dataset::new("staging", staging),
    );
    let mode = NontemporalDelta {
        auditing: AuditingStrategy::DateTimeAuditing {
            date_time_field: "batch_update_time".to_string(),
        },
        versioning: VersioningStrategy::AllVersions {
            version_field: "version".to_string(),
            data_split_field: "data_split".to_string(),
            resolver: VersionResolver::DigestBased,
            perform_stage_versioning: false,
        },
        ..NontemporalDelta::default()
    };
    let results = bigquery()
        .compile_with_data_splits(
            &IngestMode::NontemporalDelta(mode),
            &datasets,
            &[DataSplitRange::new(2, 3)],
        )
        .unwrap();

    let merge = &results[0].ingest_sql[0];
    assert!(merge.starts_with(&format!(
        "MERGE INTO main as sink USING (SELECT {},stage.`version` FROM staging as stage \
         WHERE (stage.`data_split` >= 2) AND (stage.`data_split` <= 3)) as stage ON sink.`id` = stage.`id` \
         WHEN MATCHED AND sink.`digest` <> stage.`digest` THEN",
        staged_columns("stage").replace('"', "`")
    )), "{}", merge);
}

#[test]
fn test_missing_insert_select_still_upserts() {
    let dialect = Dialect {
        supports_insert_select: false,
        ..Dialect::ansi()
    };
    let compiler = Compiler::new(dialect, options());
    let result = compiler
        .compile(
            &IngestMode::NontemporalDelta(NontemporalDelta::default()),
            &datasets(base_fields()),
        )
        .unwrap();
    assert_eq!(result.ingest_sql.len(), 1);
    assert!(result.ingest_sql[0].starts_with("MERGE INTO main as sink USING staging as stage"));
    assert!(
        result.metadata_ingest_sql[0].starts_with("INSERT INTO batch_metadata (\"table_name\", \"table_batch_id\", \"batch_start_ts_utc\", \"batch_end_ts_utc\", \"batch_status\") VALUES ('main',"),
        "{}",
        result.metadata_ingest_sql[0]
    );

    let milestoned = compiler.compile(
        &IngestMode::UnitemporalDelta(UnitemporalDelta::default()),
        &datasets(base_fields()),
    );
    assert!(matches!(
        milestoned,
        Err(CompileError::MissingDialectFeature { .. })
    ));
}
