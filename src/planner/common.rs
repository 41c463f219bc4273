//! Shared planning context
//!
//! [`IngestContext`] resolves everything the mode planners have in common
//! before they run: the enriched main schema, the effective staging relation
//! (staging or temp staging), the primary keys, the batch values and the
//! recurring predicate fragments.

use crate::dialect::Dialect;
use crate::error::{CompileError, CompileResult};
use crate::models::{
    DataType, Dataset, DatasetReference, Datasets, Field, IngestMode, MergeStrategy,
    TransactionMilestoning, VersionResolver, VersioningStrategy,
};
use crate::plan::{Condition, Operation, Select, TableRef, TimestampLiteral, Value};
use crate::planner::PlannerOptions;
use crate::planner::metadata;

/// Batch id marking a live row
pub const INFINITE_BATCH_ID: i64 = 999_999_999;

/// Batch time marking a live row
pub const INFINITE_BATCH_TIME: &str = "9999-12-31 23:59:59";

pub const MAIN_ALIAS: &str = "sink";
pub const STAGING_ALIAS: &str = "stage";
pub const SELF_JOIN_ALIAS: &str = "sink2";
pub const TEMP_ALIAS: &str = "temp";

pub const TEMP_STAGING_SUFFIX: &str = "_ingest_temp_staging";
pub const TEMP_TABLE_SUFFIX: &str = "_ingest_temp";

pub const COUNT_FIELD: &str = "ingest_count";
pub const RANK_FIELD: &str = "ingest_rank";
pub const DISTINCT_ROWS_FIELD: &str = "ingest_distinct_rows";
pub const ERROR_COUNT_FIELD: &str = "ingest_error_count";

pub const DATA_SPLIT_LOWER_BOUND_PLACEHOLDER: &str = "{DATA_SPLIT_LOWER_BOUND_PLACEHOLDER}";
pub const DATA_SPLIT_UPPER_BOUND_PLACEHOLDER: &str = "{DATA_SPLIT_UPPER_BOUND_PLACEHOLDER}";

pub const BATCH_ID_PATTERN: &str = "{BATCH_ID_PATTERN}";
pub const BATCH_START_TS_PATTERN: &str = "{BATCH_START_TS_PATTERN}";
pub const BATCH_END_TS_PATTERN: &str = "{BATCH_END_TS_PATTERN}";

/// Everything a mode planner reads
pub struct IngestContext<'a> {
    pub mode: &'a IngestMode,
    pub options: &'a PlannerOptions,
    pub dialect: &'a Dialect,
    /// Main with the generated audit, batch and milestoning columns added
    pub main: Dataset,
    pub staging: &'a Dataset,
    /// Caller-supplied bitemporal temp table, if any
    pub temp: Option<&'a Dataset>,
    pub main_table: TableRef,
    pub staging_table: TableRef,
    /// Materialized dedup/versioning output, when the mode needs one
    pub temp_staging: Option<Dataset>,
    pub temp_staging_table: Option<TableRef>,
    /// Keys shared by main and staging, in staging order
    pub primary_keys: Vec<String>,
    pub metadata_table: TableRef,
    pub lock_table: TableRef,
}

impl<'a> IngestContext<'a> {
    /// Resolve the context for one compile.
    ///
    /// `with_temp_staging` is false for empty-batch plans, which never read
    /// staging through the dedup pipeline.
    pub fn new(
        mode: &'a IngestMode,
        datasets: &'a Datasets,
        options: &'a PlannerOptions,
        dialect: &'a Dialect,
        with_temp_staging: bool,
    ) -> CompileResult<Self> {
        let main = enrich_main(mode, &datasets.main);
        let staging = &datasets.staging;
        let main_table = TableRef::aliased(&main.reference, MAIN_ALIAS);
        let staging_table = TableRef::aliased(&staging.reference, STAGING_ALIAS);

        let temp_staging = if with_temp_staging {
            temp_staging_dataset(mode, staging)
        } else {
            None
        };
        let temp_staging_table = temp_staging
            .as_ref()
            .map(|t| TableRef::aliased(&t.reference, STAGING_ALIAS));

        let primary_keys = common_primary_keys(&datasets.main, staging);

        Ok(Self {
            mode,
            options,
            dialect,
            main,
            staging,
            temp: datasets.temp.as_ref(),
            main_table,
            staging_table,
            temp_staging,
            temp_staging_table,
            primary_keys,
            metadata_table: TableRef::self_aliased(&datasets.metadata_reference()),
            lock_table: TableRef::self_aliased(&datasets.lock_reference()),
        })
    }

    pub fn main_name(&self) -> &str {
        self.main.name()
    }

    /// The relation the ingest statements read staged rows from
    pub fn stage_dataset(&self) -> &Dataset {
        self.temp_staging.as_ref().unwrap_or(self.staging)
    }

    pub fn stage_table(&self) -> &TableRef {
        self.temp_staging_table.as_ref().unwrap_or(&self.staging_table)
    }

    /// Whether the effective staging relation carries a duplicate count
    pub fn stage_has_count(&self) -> bool {
        self.temp_staging.is_some() && self.mode.deduplication().collapses_duplicates()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.primary_keys.iter().map(String::as_str).collect()
    }

    /// Next batch id, read from the metadata table
    pub fn next_batch_id(&self) -> Value {
        if self.options.placeholder_mode {
            Value::Placeholder(BATCH_ID_PATTERN.to_string())
        } else {
            metadata::next_batch_id(&self.metadata_table, self.main_name())
        }
    }

    /// Batch id stamped on rows closed by this batch
    pub fn closing_batch_id(&self) -> Value {
        self.next_batch_id().minus(Value::Integer(1))
    }

    pub fn batch_start(&self) -> Value {
        if self.options.placeholder_mode {
            Value::Timestamp(TimestampLiteral::Pattern(BATCH_START_TS_PATTERN.to_string()))
        } else {
            Value::Timestamp(TimestampLiteral::At(self.options.batch_start_timestamp))
        }
    }

    pub fn batch_end(&self) -> Value {
        if self.options.placeholder_mode {
            Value::Timestamp(TimestampLiteral::Pattern(BATCH_END_TS_PATTERN.to_string()))
        } else {
            Value::CurrentTimestamp
        }
    }

    /// `(t.split >= lower) AND (t.split <= upper)` for all-versions ingests
    pub fn data_split_condition(&self, table: &TableRef) -> Option<Condition> {
        let field = self.mode.data_split_field()?;
        Some(Condition::And(vec![
            Condition::GreaterThanOrEqual(
                table.field(field),
                Value::String(DATA_SPLIT_LOWER_BOUND_PLACEHOLDER.to_string()),
            ),
            Condition::LessThanOrEqual(
                table.field(field),
                Value::String(DATA_SPLIT_UPPER_BOUND_PLACEHOLDER.to_string()),
            ),
        ]))
    }

    pub fn pk_match(&self, left: &TableRef, right: &TableRef) -> Option<Condition> {
        key_match(&self.keys(), left, right)
    }

    /// Condition under which a staged row replaces the live row it is matched with
    pub fn stage_supersedes(&self, sink: &TableRef, stage: &TableRef) -> Option<Condition> {
        match self.mode.versioning().resolver() {
            VersionResolver::DigestBased => self
                .mode
                .digest_field()
                .map(|d| Condition::NotEquals(sink.field(d), stage.field(d))),
            VersionResolver::GreaterThanActiveVersion => self
                .version_field()
                .map(|v| Condition::GreaterThan(stage.field(v), sink.field(v))),
            VersionResolver::GreaterThanEqualToActiveVersion => self
                .version_field()
                .map(|v| Condition::GreaterThanOrEqual(stage.field(v), sink.field(v))),
        }
    }

    /// Complement of [`Self::stage_supersedes`]: the live row already holds the staged content
    pub fn stage_matches(&self, sink: &TableRef, stage: &TableRef) -> Option<Condition> {
        match self.mode.versioning().resolver() {
            VersionResolver::DigestBased => self
                .mode
                .digest_field()
                .map(|d| Condition::Equals(sink.field(d), stage.field(d))),
            VersionResolver::GreaterThanActiveVersion => self
                .version_field()
                .map(|v| Condition::LessThanOrEqual(stage.field(v), sink.field(v))),
            VersionResolver::GreaterThanEqualToActiveVersion => self
                .version_field()
                .map(|v| Condition::LessThan(stage.field(v), sink.field(v))),
        }
    }

    fn version_field(&self) -> Option<&str> {
        self.mode.versioning().version_field()
    }

    /// `t.indicator IN (values)` under a delete-indicator merge
    pub fn deleted_rows(&self, table: &TableRef) -> Option<Condition> {
        let (field, values) = self.delete_indicator()?;
        Some(Condition::In(table.field(field), values))
    }

    /// `t.indicator NOT IN (values)` under a delete-indicator merge
    pub fn live_rows(&self, table: &TableRef) -> Option<Condition> {
        let (field, values) = self.delete_indicator()?;
        Some(Condition::NotIn(table.field(field), values))
    }

    fn delete_indicator(&self) -> Option<(&str, Vec<Value>)> {
        let merge = self.mode.merge_strategy()?;
        let MergeStrategy::DeleteIndicator {
            delete_field,
            delete_values,
        } = merge
        else {
            return None;
        };
        let data_type = self
            .staging
            .field(delete_field)
            .map(|f| f.data_type.clone())
            .unwrap_or(DataType::Varchar { length: None });
        let values = delete_values
            .iter()
            .map(|v| Value::typed_literal(v, &data_type))
            .collect();
        Some((delete_field.as_str(), values))
    }

    /// Staged columns copied into main, as `(main column, staged value)`.
    ///
    /// Generated staging columns are dropped, the delete indicator is kept
    /// only when main stores it, and bitemporal source validity columns are
    /// mapped onto their main counterparts.
    pub fn insert_projection(&self) -> CompileResult<Vec<(String, Value)>> {
        let stage = self.stage_table();
        let split = self.mode.data_split_field();
        let delete = self.mode.delete_indicator_field();
        let mut projection = Vec::new();
        for field in &self.stage_dataset().fields {
            let name = field.name.as_str();
            if Some(name) == split || (self.stage_has_count() && name == COUNT_FIELD) {
                continue;
            }
            if Some(name) == delete && !self.main.has_field(name) {
                continue;
            }
            let target = self.validity_target(name).unwrap_or(name);
            if !self.main.has_field(target) {
                return Err(CompileError::missing_field(self.main_name(), target));
            }
            projection.push((target.to_string(), stage.field(name)));
        }
        Ok(projection)
    }

    fn validity_target(&self, source: &str) -> Option<&str> {
        let IngestMode::BitemporalDelta(mode) = self.mode else {
            return None;
        };
        let validity = &mode.validity_milestoning;
        if validity.derivation.source_from_field() == source {
            Some(&validity.date_time_from_field)
        } else if validity.derivation.source_thru_field() == Some(source) {
            Some(&validity.date_time_thru_field)
        } else {
            None
        }
    }
}

/// Rows still open in transaction time
pub fn live_condition(tm: &TransactionMilestoning, table: &TableRef) -> Condition {
    match tm.batch_id_fields() {
        Some((_, batch_out)) => {
            Condition::Equals(table.field(batch_out), Value::Integer(INFINITE_BATCH_ID))
        }
        None => {
            let (_, time_out) = tm.date_time_fields().unwrap_or_default();
            Condition::Equals(
                table.field(time_out),
                Value::String(INFINITE_BATCH_TIME.to_string()),
            )
        }
    }
}

/// Assignments closing a live row in this batch
pub fn close_assignments(ctx: &IngestContext<'_>, tm: &TransactionMilestoning) -> Vec<(String, Value)> {
    let mut assignments = Vec::new();
    if let Some((_, batch_out)) = tm.batch_id_fields() {
        assignments.push((batch_out.to_string(), ctx.closing_batch_id()));
    }
    if let Some((_, time_out)) = tm.date_time_fields() {
        assignments.push((time_out.to_string(), ctx.batch_start()));
    }
    assignments
}

/// Milestoning columns of a row opened in this batch, in column order
pub fn open_values(ctx: &IngestContext<'_>, tm: &TransactionMilestoning) -> Vec<(String, Value)> {
    let mut values = Vec::new();
    if let Some((batch_in, batch_out)) = tm.batch_id_fields() {
        values.push((batch_in.to_string(), ctx.next_batch_id()));
        values.push((batch_out.to_string(), Value::Integer(INFINITE_BATCH_ID)));
    }
    if let Some((time_in, time_out)) = tm.date_time_fields() {
        values.push((time_in.to_string(), ctx.batch_start()));
        values.push((
            time_out.to_string(),
            Value::String(INFINITE_BATCH_TIME.to_string()),
        ));
    }
    values
}

/// `INSERT INTO main (columns) (SELECT values FROM stage [WHERE condition])`
pub fn insert_into_main(
    ctx: &IngestContext<'_>,
    projection: Vec<(String, Value)>,
    condition: Option<Condition>,
) -> Operation {
    let (columns, values): (Vec<String>, Vec<Value>) = projection.into_iter().unzip();
    Operation::Insert {
        table: ctx.main_table.unaliased(),
        columns,
        select: Select::from_table(values, ctx.stage_table()).filter(condition),
    }
}

/// `((l.k1 = r.k1) AND (l.k2 = r.k2))`; `None` without keys
pub fn key_match(keys: &[&str], left: &TableRef, right: &TableRef) -> Option<Condition> {
    Condition::all(
        keys.iter()
            .map(|k| Condition::Equals(left.field(k), right.field(k)))
            .collect(),
    )
}

fn common_primary_keys(main: &Dataset, staging: &Dataset) -> Vec<String> {
    let main_keys = main.primary_keys();
    staging
        .primary_keys()
        .into_iter()
        .filter(|k| main_keys.contains(k))
        .map(str::to_string)
        .collect()
}

/// Copy of main with every generated column the mode writes.
///
/// Columns already present are kept as declared.
pub fn enrich_main(mode: &IngestMode, main: &Dataset) -> Dataset {
    let mut enriched = main.clone();
    let mut add = |field: Field| {
        if !enriched.has_field(&field.name) {
            enriched.fields.push(field);
        }
    };

    match mode {
        IngestMode::AppendOnly(m) => {
            if let Some(audit) = m.auditing.audit_field() {
                let field = Field::new(audit, DataType::DateTime);
                if main.primary_keys().is_empty() {
                    add(field);
                } else {
                    add(field.as_primary_key());
                }
            }
            if let Some(batch_id) = &m.batch_id_field {
                add(Field::new(batch_id, DataType::Integer));
            }
        }
        IngestMode::NontemporalSnapshot(_) | IngestMode::NontemporalDelta(_) => {
            if let Some(audit) = mode.auditing().and_then(|a| a.audit_field()) {
                add(Field::new(audit, DataType::DateTime));
            }
        }
        IngestMode::UnitemporalSnapshot(_)
        | IngestMode::UnitemporalDelta(_)
        | IngestMode::BitemporalDelta(_) => {
            if let Some(tm) = mode.transaction_milestoning() {
                for field in milestoning_fields(tm) {
                    add(field);
                }
            }
            if let IngestMode::BitemporalDelta(m) = mode {
                let validity = &m.validity_milestoning;
                add(Field::new(&validity.date_time_from_field, DataType::DateTime).as_primary_key());
                add(Field::new(&validity.date_time_thru_field, DataType::DateTime));
            }
        }
    }
    enriched
}

fn milestoning_fields(tm: &TransactionMilestoning) -> Vec<Field> {
    let mut fields = Vec::new();
    if let Some((batch_in, batch_out)) = tm.batch_id_fields() {
        fields.push(Field::new(batch_in, DataType::Integer).as_primary_key());
        fields.push(Field::new(batch_out, DataType::Integer));
    }
    if let Some((time_in, time_out)) = tm.date_time_fields() {
        let time_in = Field::new(time_in, DataType::DateTime);
        if matches!(tm, TransactionMilestoning::TransactionDateTime { .. }) {
            fields.push(time_in.as_primary_key());
        } else {
            fields.push(time_in);
        }
        fields.push(Field::new(time_out, DataType::DateTime));
    }
    fields
}

/// Whether staged rows are materialized into temp staging first
pub fn needs_temp_staging(mode: &IngestMode) -> bool {
    mode.deduplication().collapses_duplicates() || mode.versioning().performs_stage_versioning()
}

/// Name of the data split column generated by stage versioning, if any
pub fn generated_data_split(mode: &IngestMode) -> Option<&str> {
    match mode.versioning() {
        VersioningStrategy::AllVersions {
            data_split_field,
            perform_stage_versioning: true,
            ..
        } => Some(data_split_field),
        _ => None,
    }
}

/// Schema of the temp staging table.
///
/// Staging columns lose their key flags; a generated data split replaces any
/// staged one.
pub fn temp_staging_dataset(mode: &IngestMode, staging: &Dataset) -> Option<Dataset> {
    if !needs_temp_staging(mode) {
        return None;
    }
    let generated_split = generated_data_split(mode);
    let mut fields: Vec<Field> = staging
        .fields
        .iter()
        .filter(|f| Some(f.name.as_str()) != generated_split)
        .map(|f| Field {
            nullable: f.nullable && !f.primary_key,
            primary_key: false,
            ..f.clone()
        })
        .collect();
    if mode.deduplication().collapses_duplicates() {
        fields.push(Field::new(COUNT_FIELD, DataType::Integer));
    }
    if let Some(split) = generated_split {
        fields.push(Field::new(split, DataType::Integer).not_null());
    }

    let name = format!("{}{}", staging.name(), TEMP_STAGING_SUFFIX);
    let reference: DatasetReference = staging
        .reference
        .sibling(name, staging.reference.alias.clone());
    Some(Dataset { reference, fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AppendOnly, AuditingStrategy, DeduplicationStrategy, NontemporalDelta, UnitemporalDelta,
    };

    fn staging() -> Dataset {
        Dataset::new(
            "staging",
            vec![
                Field::new("id", DataType::Int).as_primary_key(),
                Field::new("name", DataType::Varchar { length: None }),
                Field::new("digest", DataType::Varchar { length: None }),
            ],
        )
    }

    #[test]
    fn test_enrich_append_only_adds_audit_key_and_batch_id() {
        let mode = IngestMode::AppendOnly(AppendOnly {
            auditing: AuditingStrategy::DateTimeAuditing {
                date_time_field: "batch_update_time".to_string(),
            },
            ..AppendOnly::default()
        });
        let main = enrich_main(&mode, &staging().with_name("main"));
        assert_eq!(
            main.field_names(),
            vec!["id", "name", "digest", "batch_update_time", "batch_id"]
        );
        assert_eq!(main.primary_keys(), vec!["id", "batch_update_time"]);
    }

    #[test]
    fn test_enrich_unitemporal_keeps_existing_columns() {
        let mode = IngestMode::UnitemporalDelta(UnitemporalDelta::default());
        let mut main = staging().with_name("main");
        main.fields.push(Field::new("batch_id_in", DataType::BigInt).as_primary_key());
        let enriched = enrich_main(&mode, &main);
        assert_eq!(enriched.field("batch_id_in").map(|f| &f.data_type), Some(&DataType::BigInt));
        assert!(enriched.has_field("batch_id_out"));
    }

    #[test]
    fn test_temp_staging_clears_keys_and_adds_count() {
        let mode = IngestMode::NontemporalDelta(NontemporalDelta {
            deduplication: DeduplicationStrategy::FilterDuplicates,
            ..NontemporalDelta::default()
        });
        let temp = temp_staging_dataset(&mode, &staging()).unwrap();
        assert_eq!(temp.name(), "staging_ingest_temp_staging");
        assert!(temp.primary_keys().is_empty());
        assert!(!temp.fields[0].nullable);
        assert_eq!(temp.fields.last().map(|f| f.name.as_str()), Some(COUNT_FIELD));
    }

    #[test]
    fn test_no_temp_staging_without_dedup_or_versioning() {
        let mode = IngestMode::AppendOnly(AppendOnly::default());
        assert!(temp_staging_dataset(&mode, &staging()).is_none());
    }
}
