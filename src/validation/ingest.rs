//! Ingest configuration validation
//!
//! Checks an ingest mode against the datasets it will run on before any plan
//! is built. The first failing rule is reported; no partial plan exists.

use tracing::debug;

use crate::dialect::{Dialect, DialectFeature};
use crate::error::{CompileError, CompileResult};
use crate::models::{Dataset, Datasets, IngestMode, MergeStrategy, TransactionMilestoning};
use crate::planner::common::{generated_data_split, needs_temp_staging};
use crate::validation::input::{validate_dataset_name, validate_field_name};

/// Validator for one compile request
#[derive(Default)]
pub struct IngestModeValidator;

impl IngestModeValidator {
    /// Create a new ingest mode validator
    ///
    /// # Example
    ///
    /// ```rust
    /// use ingest_sql_compiler::validation::ingest::IngestModeValidator;
    ///
    /// let validator = IngestModeValidator::new();
    /// ```
    pub fn new() -> Self {
        Self
    }

    /// Run every rule for `mode` over `datasets` targeting `dialect`
    pub fn validate(
        &self,
        mode: &IngestMode,
        datasets: &Datasets,
        dialect: &Dialect,
    ) -> CompileResult<()> {
        self.validate_identifiers(datasets)?;
        mode.validate()?;

        let main = &datasets.main;
        let staging = &datasets.staging;
        let kind = mode.kind().to_string();

        if let Some(digest) = mode.digest_field() {
            require_field(main, digest)?;
            require_field(staging, digest)?;
        }

        let keys = common_keys(main, staging);
        let keyed_mode = matches!(
            mode,
            IngestMode::NontemporalDelta(_)
                | IngestMode::UnitemporalDelta(_)
                | IngestMode::BitemporalDelta(_)
        );
        if keys.is_empty() && (keyed_mode || mode.versioning().is_versioned()) {
            return Err(CompileError::unsupported(
                kind,
                "primary keys shared by main and staging are required",
            ));
        }
        if let IngestMode::AppendOnly(m) = mode
            && m.filter_existing_records
            && keys.is_empty()
        {
            return Err(CompileError::unsupported(
                kind,
                "filter_existing_records requires primary keys",
            ));
        }

        self.validate_versioning(mode, staging, dialect)?;

        // A plain delta upsert has a MERGE form; every other ingest inserts from a SELECT
        let merge_only = matches!(mode, IngestMode::NontemporalDelta(_)) && !needs_temp_staging(mode);
        if !merge_only {
            dialect.require(DialectFeature::InsertSelect)?;
        }

        if let Some(MergeStrategy::DeleteIndicator { delete_field, .. }) = mode.merge_strategy() {
            require_field(staging, delete_field)?;
        }

        if let Some(tm) = mode.transaction_milestoning() {
            validate_milestoning_keys(tm, main)?;
        }

        match mode {
            IngestMode::BitemporalDelta(m) => {
                let derivation = &m.validity_milestoning.derivation;
                require_field(staging, derivation.source_from_field())?;
                if let Some(thru) = derivation.source_thru_field() {
                    require_field(staging, thru)?;
                }
                if let Some(temp) = &datasets.temp {
                    require_field(temp, &m.validity_milestoning.date_time_from_field)?;
                    require_field(temp, &m.validity_milestoning.date_time_thru_field)?;
                }
            }
            IngestMode::UnitemporalDelta(m) => {
                for filter in &m.optimization_filters {
                    let field = main.field(&filter.field_name).ok_or_else(|| {
                        CompileError::InvalidOptimizationFilter {
                            column: filter.field_name.clone(),
                            reason: format!("not a field of \"{}\"", main.name()),
                        }
                    })?;
                    if !field.data_type.is_range_comparable() {
                        return Err(CompileError::InvalidOptimizationFilter {
                            column: filter.field_name.clone(),
                            reason: format!("type {} is not supported", field.data_type),
                        });
                    }
                }
            }
            IngestMode::UnitemporalSnapshot(m) => {
                if let Some(partition) = &m.partition {
                    for field in &partition.fields {
                        require_field(main, field)?;
                        require_field(staging, field)?;
                    }
                    if let Some(field) = partition
                        .values
                        .keys()
                        .find(|f| !partition.fields.contains(f))
                    {
                        return Err(CompileError::unsupported(
                            field.clone(),
                            "partition values given for a field that is not a partition field",
                        ));
                    }
                }
            }
            _ => {}
        }

        debug!(mode = %mode.kind(), main = main.name(), staging = staging.name(), "Ingest configuration valid");
        Ok(())
    }

    fn validate_identifiers(&self, datasets: &Datasets) -> CompileResult<()> {
        let datasets = [Some(&datasets.main), Some(&datasets.staging), datasets.temp.as_ref()];
        for dataset in datasets.into_iter().flatten() {
            let reference = &dataset.reference;
            validate_dataset_name(&reference.name)?;
            for qualifier in reference.database.iter().chain(reference.group.iter()) {
                validate_dataset_name(qualifier)?;
            }
            for field in &dataset.fields {
                validate_field_name(&field.name)?;
            }
        }
        Ok(())
    }

    fn validate_versioning(
        &self,
        mode: &IngestMode,
        staging: &Dataset,
        dialect: &Dialect,
    ) -> CompileResult<()> {
        let versioning = mode.versioning();
        let Some(version) = versioning.version_field() else {
            return Ok(());
        };
        let field = staging
            .field(version)
            .ok_or_else(|| CompileError::missing_field(staging.name(), version))?;
        if field.primary_key {
            return Err(CompileError::unsupported(
                version,
                "the versioning field cannot be a primary key",
            ));
        }
        if !field.data_type.is_version_comparable() {
            return Err(CompileError::unsupported(
                version,
                format!("versioning on type {} is not supported", field.data_type),
            ));
        }

        if let Some(split) = versioning.data_split_field()
            && generated_data_split(mode).is_none()
        {
            require_field(staging, split)?;
        }
        if versioning.performs_stage_versioning() {
            dialect.require(DialectFeature::WindowFunctions)?;
        }
        Ok(())
    }
}

fn require_field(dataset: &Dataset, field: &str) -> CompileResult<()> {
    if dataset.has_field(field) {
        Ok(())
    } else {
        Err(CompileError::missing_field(dataset.name(), field))
    }
}

fn common_keys<'a>(main: &Dataset, staging: &'a Dataset) -> Vec<&'a str> {
    let main_keys = main.primary_keys();
    staging
        .primary_keys()
        .into_iter()
        .filter(|k| main_keys.contains(k))
        .collect()
}

/// An opening marker already declared on main must be part of its key
fn validate_milestoning_keys(tm: &TransactionMilestoning, main: &Dataset) -> CompileResult<()> {
    let in_field = tm.in_field();
    match main.field(in_field) {
        Some(field) if !field.primary_key => Err(CompileError::unsupported(
            in_field,
            format!("must be a primary key of \"{}\"", main.name()),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DataType, Field, NontemporalDelta, OptimizationFilter, UnitemporalDelta, VersionResolver,
        VersioningStrategy,
    };

    fn datasets() -> Datasets {
        let fields = vec![
            Field::new("id", DataType::Int).as_primary_key(),
            Field::new("name", DataType::Varchar { length: None }),
            Field::new("version", DataType::Int),
            Field::new("digest", DataType::Varchar { length: None }),
        ];
        Datasets::new(Dataset::new("main", fields.clone()), Dataset::new("staging", fields))
    }

    fn max_version() -> VersioningStrategy {
        VersioningStrategy::MaxVersion {
            version_field: "version".to_string(),
            resolver: VersionResolver::DigestBased,
            perform_stage_versioning: true,
            fail_on_duplicate_primary_keys: true,
        }
    }

    #[test]
    fn test_valid_delta_passes() {
        let mode = IngestMode::UnitemporalDelta(UnitemporalDelta::default());
        let validator = IngestModeValidator::new();
        assert_eq!(validator.validate(&mode, &datasets(), &Dialect::ansi()), Ok(()));
    }

    #[test]
    fn test_missing_digest_is_reported() {
        let mode = IngestMode::NontemporalDelta(NontemporalDelta {
            digest_field: "hash".to_string(),
            ..NontemporalDelta::default()
        });
        let result = IngestModeValidator::new().validate(&mode, &datasets(), &Dialect::ansi());
        assert_eq!(result, Err(CompileError::missing_field("main", "hash")));
    }

    #[test]
    fn test_delta_without_keys_is_rejected() {
        let mut datasets = datasets();
        datasets.staging.fields[0].primary_key = false;
        let mode = IngestMode::UnitemporalDelta(UnitemporalDelta::default());
        let result = IngestModeValidator::new().validate(&mode, &datasets, &Dialect::ansi());
        assert!(matches!(result, Err(CompileError::UnsupportedConfiguration { .. })));
    }

    #[test]
    fn test_optimization_filter_type_checked() {
        let mode = IngestMode::UnitemporalDelta(UnitemporalDelta {
            optimization_filters: vec![OptimizationFilter::new("name", "{L}", "{U}")],
            ..UnitemporalDelta::default()
        });
        let result = IngestModeValidator::new().validate(&mode, &datasets(), &Dialect::ansi());
        assert!(matches!(
            result,
            Err(CompileError::InvalidOptimizationFilter { ref column, .. }) if column == "name"
        ));
    }

    #[test]
    fn test_stage_versioning_needs_window_functions() {
        let mode = IngestMode::UnitemporalDelta(UnitemporalDelta {
            versioning: max_version(),
            ..UnitemporalDelta::default()
        });
        let dialect = Dialect {
            supports_window_functions: false,
            ..Dialect::ansi()
        };
        let result = IngestModeValidator::new().validate(&mode, &datasets(), &dialect);
        assert!(matches!(result, Err(CompileError::MissingDialectFeature { .. })));
    }

    #[test]
    fn test_insert_select_required_outside_plain_upserts() {
        let dialect = Dialect {
            supports_insert_select: false,
            ..Dialect::ansi()
        };
        let validator = IngestModeValidator::new();
        let upsert = IngestMode::NontemporalDelta(NontemporalDelta::default());
        assert_eq!(validator.validate(&upsert, &datasets(), &dialect), Ok(()));

        let milestoned = IngestMode::UnitemporalDelta(UnitemporalDelta::default());
        assert_eq!(
            validator.validate(&milestoned, &datasets(), &dialect),
            Err(CompileError::MissingDialectFeature {
                dialect: "ansi".to_string(),
                feature: "INSERT ... SELECT".to_string(),
            })
        );
    }

    #[test]
    fn test_existing_in_marker_must_be_key() {
        let mut datasets = datasets();
        datasets
            .main
            .fields
            .push(Field::new("batch_id_in", DataType::Integer));
        let mode = IngestMode::UnitemporalDelta(UnitemporalDelta::default());
        let result = IngestModeValidator::new().validate(&mode, &datasets, &Dialect::ansi());
        assert_eq!(
            result,
            Err(CompileError::unsupported(
                "batch_id_in",
                "must be a primary key of \"main\""
            ))
        );
    }

    #[test]
    fn test_quote_in_field_name_is_rejected() {
        let mut datasets = datasets();
        datasets
            .staging
            .fields
            .push(Field::new("bad\"name", DataType::Int));
        let mode = IngestMode::UnitemporalDelta(UnitemporalDelta::default());
        let result = IngestModeValidator::new().validate(&mode, &datasets, &Dialect::ansi());
        assert!(matches!(result, Err(CompileError::InvalidIdentifier(_))));
    }
}
