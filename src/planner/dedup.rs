//! Deduplication and versioning pipeline
//!
//! Materializes staging into temp staging, grouped with a duplicate count
//! and/or ranked per key by the version field, and builds the error-check
//! queries the execution layer runs against the result.

use std::collections::BTreeMap;

use crate::models::{DedupAndVersionErrorKind, DeduplicationStrategy, VersioningStrategy};
use crate::plan::{
    Condition, FieldRef, FunctionName, LogicalPlan, Operation, Select, SortOrder, Source, TableAlias,
    TableRef, Value,
};
use crate::planner::common::{
    COUNT_FIELD, DISTINCT_ROWS_FIELD, ERROR_COUNT_FIELD, IngestContext, RANK_FIELD,
    generated_data_split,
};

/// Statements filling temp staging, with their error checks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupPlan {
    pub operations: LogicalPlan,
    pub error_checks: BTreeMap<DedupAndVersionErrorKind, Select>,
}

/// Plan the pipeline; `None` when the mode reads staging directly
pub fn plan(ctx: &IngestContext<'_>) -> Option<DedupPlan> {
    let temp = ctx.temp_staging.as_ref()?;
    let temp_table = ctx.temp_staging_table.as_ref()?;
    let stage = &ctx.staging_table;
    let alias = stage_alias(stage);

    let generated_split = generated_data_split(ctx.mode);
    let names: Vec<&str> = ctx
        .staging
        .fields
        .iter()
        .map(|f| f.name.as_str())
        .filter(|n| Some(*n) != generated_split)
        .collect();
    let dedup = ctx.mode.deduplication().collapses_duplicates();

    let mut carried = stage.fields(names.iter().copied());
    let mut rows = None;
    if dedup {
        let mut values = carried.clone();
        values.push(Value::count_all().aliased(COUNT_FIELD));
        rows = Some(Select::from_table(values, stage).group_by(carried.clone()));
        carried.push(stage.field(COUNT_FIELD).aliased(COUNT_FIELD));
    }
    let input = |rows: Option<Select>| match rows {
        Some(select) => Source::sub_select(select, &alias),
        None => Source::Table(stage.clone()),
    };

    let versioning = ctx.mode.versioning();
    let select = match versioning {
        VersioningStrategy::MaxVersion {
            version_field,
            perform_stage_versioning: true,
            ..
        } => {
            let mut ranked_values = carried.clone();
            ranked_values.push(rank(ctx, stage, version_field, SortOrder::Desc).aliased(RANK_FIELD));
            let ranked = Select::new(ranked_values).source(input(rows));
            Select::new(carried)
                .source(Source::sub_select(ranked, &alias))
                .filter(Some(Condition::Equals(
                    stage.field(RANK_FIELD),
                    Value::Integer(1),
                )))
        }
        VersioningStrategy::AllVersions {
            version_field,
            data_split_field,
            perform_stage_versioning: true,
            ..
        } => {
            let mut values = carried;
            values.push(rank(ctx, stage, version_field, SortOrder::Asc).aliased(data_split_field));
            Select::new(values).source(input(rows))
        }
        _ => rows.unwrap_or_else(|| Select::from_table(carried, stage)),
    };

    let operations = vec![
        Operation::delete_all(temp_table),
        Operation::Insert {
            table: temp_table.unaliased(),
            columns: temp.field_names().into_iter().map(str::to_string).collect(),
            select,
        },
    ];

    Some(DedupPlan {
        operations,
        error_checks: error_checks(ctx, temp_table, &names),
    })
}

fn stage_alias(stage: &TableRef) -> String {
    match &stage.alias {
        Some(TableAlias::Verbatim(a) | TableAlias::Identifier(a)) => a.clone(),
        None => stage.name.clone(),
    }
}

fn rank(ctx: &IngestContext<'_>, stage: &TableRef, version_field: &str, order: SortOrder) -> Value {
    Value::DenseRank {
        partition_by: stage.fields(ctx.keys()),
        order_by: vec![(stage.field(version_field), order)],
    }
}

fn error_checks(
    ctx: &IngestContext<'_>,
    temp_table: &TableRef,
    staged_names: &[&str],
) -> BTreeMap<DedupAndVersionErrorKind, Select> {
    let mut checks = BTreeMap::new();
    let sample = ctx.options.sample_row_count;

    if ctx.mode.deduplication() == DeduplicationStrategy::FailOnDuplicates {
        checks.insert(
            DedupAndVersionErrorKind::MaxDuplicates,
            Select::from_table(
                vec![
                    Value::function(FunctionName::Max, vec![temp_table.field(COUNT_FIELD)])
                        .labeled(DedupAndVersionErrorKind::MaxDuplicates.as_str()),
                ],
                temp_table,
            ),
        );
        let keys: Vec<&str> = if ctx.primary_keys.is_empty() {
            staged_names.to_vec()
        } else {
            ctx.keys()
        };
        let mut values: Vec<Value> = keys.iter().map(|k| FieldRef::bare(k)).collect();
        values.push(FieldRef::bare(COUNT_FIELD));
        checks.insert(
            DedupAndVersionErrorKind::DuplicateRows,
            Select::from_table(values, temp_table)
                .filter(Some(Condition::GreaterThan(
                    temp_table.field(COUNT_FIELD),
                    Value::Integer(1),
                )))
                .limit(sample),
        );
    }

    let versioning = ctx.mode.versioning();
    if let Some(version_field) = versioning.version_field()
        && versioning.checks_data_errors()
        && !ctx.primary_keys.is_empty()
    {
        let mut keys = ctx.keys();
        keys.push(version_field);
        let group_by: Vec<Value> = keys.iter().map(|k| FieldRef::bare(k)).collect();
        let distinct = Value::function(FunctionName::CountDistinct, distinct_values(ctx, &keys, staged_names));

        let per_key = Select::from_table(
            vec![distinct.clone().aliased(DISTINCT_ROWS_FIELD)],
            temp_table,
        )
        .group_by(group_by.clone());
        checks.insert(
            DedupAndVersionErrorKind::MaxDataErrors,
            Select::new(vec![
                Value::function(FunctionName::Max, vec![FieldRef::bare(DISTINCT_ROWS_FIELD)])
                    .labeled(DedupAndVersionErrorKind::MaxDataErrors.as_str()),
            ])
            .source(Source::sub_select(per_key, &stage_alias(temp_table))),
        );

        let mut values = group_by.clone();
        values.push(distinct.aliased(ERROR_COUNT_FIELD));
        checks.insert(
            DedupAndVersionErrorKind::DataErrorRows,
            Select::from_table(values, temp_table)
                .group_by(group_by)
                .having(Condition::GreaterThan(
                    FieldRef::bare(ERROR_COUNT_FIELD),
                    Value::Integer(1),
                ))
                .limit(sample),
        );
    }
    checks
}

/// Columns whose distinct combinations reveal conflicting rows of one key and version
fn distinct_values(ctx: &IngestContext<'_>, keys: &[&str], staged_names: &[&str]) -> Vec<Value> {
    if let Some(digest) = ctx.mode.digest_field()
        && ctx.staging.has_field(digest)
    {
        return vec![FieldRef::bare(digest)];
    }
    let split = ctx.mode.data_split_field();
    staged_names
        .iter()
        .copied()
        .filter(|n| !keys.contains(n) && Some(*n) != split)
        .map(FieldRef::bare)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::models::{
        AppendOnly, AuditingStrategy, DataType, Dataset, Datasets, Field, IngestMode,
        VersionResolver,
    };
    use crate::planner::PlannerOptions;
    use crate::render::SqlRenderer;

    fn datasets() -> Datasets {
        let fields = vec![
            Field::new("id", DataType::Int).as_primary_key(),
            Field::new("name", DataType::Varchar { length: None }),
            Field::new("version", DataType::Int),
            Field::new("digest", DataType::Varchar { length: None }),
        ];
        Datasets::new(Dataset::new("main", fields.clone()), Dataset::new("staging", fields))
    }

    fn append_only(
        deduplication: DeduplicationStrategy,
        versioning: VersioningStrategy,
    ) -> IngestMode {
        IngestMode::AppendOnly(AppendOnly {
            digest_field: Some("digest".to_string()),
            auditing: AuditingStrategy::DateTimeAuditing {
                date_time_field: "batch_update_time".to_string(),
            },
            deduplication,
            versioning,
            ..AppendOnly::default()
        })
    }

    #[test]
    fn test_filter_duplicates_groups_all_columns() {
        let mode = append_only(DeduplicationStrategy::FilterDuplicates, VersioningStrategy::NoVersioning);
        let datasets = datasets();
        let options = PlannerOptions::default();
        let dialect = Dialect::ansi();
        let ctx = IngestContext::new(&mode, &datasets, &options, &dialect, true).unwrap();
        let plan = plan(&ctx).unwrap();
        let sql = SqlRenderer::new(&dialect).render_all(&plan.operations);
        assert_eq!(sql[0], "DELETE FROM staging_ingest_temp_staging as stage");
        assert_eq!(
            sql[1],
            "INSERT INTO staging_ingest_temp_staging (\"id\", \"name\", \"version\", \"digest\", \"ingest_count\") \
             (SELECT stage.\"id\",stage.\"name\",stage.\"version\",stage.\"digest\",COUNT(*) as \"ingest_count\" \
             FROM staging as stage GROUP BY stage.\"id\", stage.\"name\", stage.\"version\", stage.\"digest\")"
        );
        assert!(plan.error_checks.is_empty());
    }

    #[test]
    fn test_fail_on_duplicates_with_max_version_emits_all_checks() {
        let mode = append_only(
            DeduplicationStrategy::FailOnDuplicates,
            VersioningStrategy::MaxVersion {
                version_field: "version".to_string(),
                resolver: VersionResolver::DigestBased,
                perform_stage_versioning: true,
                fail_on_duplicate_primary_keys: true,
            },
        );
        let datasets = datasets();
        let options = PlannerOptions::default();
        let dialect = Dialect::ansi();
        let ctx = IngestContext::new(&mode, &datasets, &options, &dialect, true).unwrap();
        let plan = plan(&ctx).unwrap();
        let renderer = SqlRenderer::new(&dialect);

        assert_eq!(
            renderer.render(&plan.operations[1]),
            "INSERT INTO staging_ingest_temp_staging (\"id\", \"name\", \"version\", \"digest\", \"ingest_count\") \
             (SELECT stage.\"id\",stage.\"name\",stage.\"version\",stage.\"digest\",stage.\"ingest_count\" as \"ingest_count\" \
             FROM (SELECT stage.\"id\",stage.\"name\",stage.\"version\",stage.\"digest\",stage.\"ingest_count\" as \"ingest_count\",\
             DENSE_RANK() OVER (PARTITION BY stage.\"id\" ORDER BY stage.\"version\" DESC) as \"ingest_rank\" \
             FROM (SELECT stage.\"id\",stage.\"name\",stage.\"version\",stage.\"digest\",COUNT(*) as \"ingest_count\" \
             FROM staging as stage GROUP BY stage.\"id\", stage.\"name\", stage.\"version\", stage.\"digest\") as stage) as stage \
             WHERE stage.\"ingest_rank\" = 1)"
        );
        assert_eq!(
            renderer.render_select(&plan.error_checks[&DedupAndVersionErrorKind::MaxDuplicates]),
            "SELECT MAX(stage.\"ingest_count\") as \"MAX_DUPLICATES\" FROM staging_ingest_temp_staging as stage"
        );
        assert_eq!(
            renderer.render_select(&plan.error_checks[&DedupAndVersionErrorKind::DuplicateRows]),
            "SELECT \"id\",\"ingest_count\" FROM staging_ingest_temp_staging as stage WHERE stage.\"ingest_count\" > 1 LIMIT 20"
        );
        assert_eq!(
            renderer.render_select(&plan.error_checks[&DedupAndVersionErrorKind::MaxDataErrors]),
            "SELECT MAX(\"ingest_distinct_rows\") as \"MAX_DATA_ERRORS\" FROM (SELECT COUNT(DISTINCT(\"digest\")) as \"ingest_distinct_rows\" \
             FROM staging_ingest_temp_staging as stage GROUP BY \"id\", \"version\") as stage"
        );
        assert_eq!(
            renderer.render_select(&plan.error_checks[&DedupAndVersionErrorKind::DataErrorRows]),
            "SELECT \"id\",\"version\",COUNT(DISTINCT(\"digest\")) as \"ingest_error_count\" FROM staging_ingest_temp_staging as stage \
             GROUP BY \"id\", \"version\" HAVING \"ingest_error_count\" > 1 LIMIT 20"
        );
    }

    #[test]
    fn test_all_versions_ranks_ascending_into_data_split() {
        let mode = append_only(
            DeduplicationStrategy::AllowDuplicates,
            VersioningStrategy::AllVersions {
                version_field: "version".to_string(),
                data_split_field: "data_split".to_string(),
                resolver: VersionResolver::DigestBased,
                perform_stage_versioning: true,
            },
        );
        let datasets = datasets();
        let options = PlannerOptions::default();
        let dialect = Dialect::ansi();
        let ctx = IngestContext::new(&mode, &datasets, &options, &dialect, true).unwrap();
        let plan = plan(&ctx).unwrap();
        assert_eq!(
            SqlRenderer::new(&dialect).render(&plan.operations[1]),
            "INSERT INTO staging_ingest_temp_staging (\"id\", \"name\", \"version\", \"digest\", \"data_split\") \
             (SELECT stage.\"id\",stage.\"name\",stage.\"version\",stage.\"digest\",\
             DENSE_RANK() OVER (PARTITION BY stage.\"id\" ORDER BY stage.\"version\" ASC) as \"data_split\" \
             FROM staging as stage)"
        );
        assert!(plan.error_checks.contains_key(&DedupAndVersionErrorKind::MaxDataErrors));
    }
}
