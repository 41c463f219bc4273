//! Compiler entry point
//!
//! [`Compiler`] validates a compile request, plans it and renders the plan
//! for its dialect. Compiles are pure: the same request always yields the
//! same [`GeneratorResult`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dialect::{Dialect, DialectFeature};
use crate::error::{CompileError, CompileResult};
use crate::models::{DataSplitRange, Datasets, GeneratorResult, IngestMode};
use crate::planner::common::{DATA_SPLIT_LOWER_BOUND_PLACEHOLDER, DATA_SPLIT_UPPER_BOUND_PLACEHOLDER};
use crate::planner::{self, IngestPlan, PlannerOptions};
use crate::render::SqlRenderer;
use crate::validation::IngestModeValidator;

/// One compile as described in a request file
///
/// ```yaml
/// mode:
///   mode: append_only
/// datasets:
///   main: { name: main, fields: [{ name: id, type: INT }] }
///   staging: { name: staging, fields: [{ name: id, type: INT }] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileRequest {
    pub mode: IngestMode,
    pub datasets: Datasets,
    /// Required for all-versions ingests, one result per range
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_split_ranges: Vec<DataSplitRange>,
    /// Compile for a batch with no staged rows
    #[serde(default)]
    pub empty_batch: bool,
}

/// Compiles ingest modes into SQL for one dialect
///
/// # Example
///
/// ```rust
/// use ingest_sql_compiler::dialect::Dialect;
/// use ingest_sql_compiler::generator::Compiler;
/// use ingest_sql_compiler::models::{AppendOnly, DataType, Dataset, Datasets, Field, IngestMode};
/// use ingest_sql_compiler::planner::PlannerOptions;
///
/// let fields = vec![Field::new("id", DataType::Int), Field::new("name", DataType::String)];
/// let datasets = Datasets::new(
///     Dataset::new("main", fields.clone()),
///     Dataset::new("staging", fields),
/// );
/// let compiler = Compiler::new(Dialect::ansi(), PlannerOptions::default());
/// let result = compiler
///     .compile(&IngestMode::AppendOnly(AppendOnly::default()), &datasets)
///     .unwrap();
/// assert_eq!(result.ingest_sql.len(), 1);
/// ```
pub struct Compiler {
    dialect: Dialect,
    options: PlannerOptions,
    validator: IngestModeValidator,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(Dialect::default(), PlannerOptions::default())
    }
}

impl Compiler {
    pub fn new(dialect: Dialect, options: PlannerOptions) -> Self {
        Self {
            dialect,
            options,
            validator: IngestModeValidator::new(),
        }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    /// Compile a regular batch.
    ///
    /// All-versions ingests need their data split ranges; use
    /// [`Compiler::compile_with_data_splits`] for them.
    pub fn compile(&self, mode: &IngestMode, datasets: &Datasets) -> CompileResult<GeneratorResult> {
        self.log_request(mode, datasets);
        if let Some(split) = mode.data_split_field() {
            return Err(CompileError::unsupported(
                mode.kind().to_string(),
                format!("all-versions ingest on \"{}\" needs data split ranges", split),
            ));
        }
        self.validate(mode, datasets)?;
        let plan = planner::plan(mode, datasets, &self.options, &self.dialect)?;
        Ok(self.render(&plan))
    }

    /// Compile an all-versions batch, one result per data split range
    pub fn compile_with_data_splits(
        &self,
        mode: &IngestMode,
        datasets: &Datasets,
        ranges: &[DataSplitRange],
    ) -> CompileResult<Vec<GeneratorResult>> {
        self.log_request(mode, datasets);
        if mode.data_split_field().is_none() {
            return Err(CompileError::InvalidDataSplit(format!(
                "{} ingest has no data split field",
                mode.kind()
            )));
        }
        validate_ranges(ranges)?;
        self.validate(mode, datasets)?;

        let plan = planner::plan(mode, datasets, &self.options, &self.dialect)?;
        let template = self.render(&plan);
        let results: Vec<GeneratorResult> = ranges
            .iter()
            .map(|range| with_data_split(&template, *range))
            .collect();
        debug!(ranges = results.len(), "Rendered data split results");
        Ok(results)
    }

    /// Compile a batch known to have no staged rows
    pub fn compile_for_empty_batch(
        &self,
        mode: &IngestMode,
        datasets: &Datasets,
    ) -> CompileResult<GeneratorResult> {
        self.log_request(mode, datasets);
        if !matches!(
            mode,
            IngestMode::NontemporalSnapshot(_) | IngestMode::UnitemporalSnapshot(_)
        ) {
            warn!(mode = %mode.kind(), "Empty batch yields no ingest statements for this mode");
        }
        self.validate(mode, datasets)?;
        let plan = planner::plan_empty_batch(mode, datasets, &self.options, &self.dialect)?;
        Ok(self.render(&plan))
    }

    /// Dispatch a [`CompileRequest`] to the matching compile operation
    pub fn compile_request(&self, request: &CompileRequest) -> CompileResult<Vec<GeneratorResult>> {
        if request.empty_batch {
            return Ok(vec![self.compile_for_empty_batch(&request.mode, &request.datasets)?]);
        }
        if request.mode.data_split_field().is_some() {
            return self.compile_with_data_splits(
                &request.mode,
                &request.datasets,
                &request.data_split_ranges,
            );
        }
        if !request.data_split_ranges.is_empty() {
            warn!(
                mode = %request.mode.kind(),
                "Data split ranges ignored for an ingest without a data split field"
            );
        }
        Ok(vec![self.compile(&request.mode, &request.datasets)?])
    }

    fn validate(&self, mode: &IngestMode, datasets: &Datasets) -> CompileResult<()> {
        self.validator.validate(mode, datasets, &self.dialect)?;
        // Lock initialization is a guarded INSERT ... SELECT
        if self.options.enable_concurrent_safety {
            self.dialect.require(DialectFeature::InsertSelect)?;
        }
        Ok(())
    }

    fn log_request(&self, mode: &IngestMode, datasets: &Datasets) {
        info!(
            mode = %mode.kind(),
            main = datasets.main.name(),
            staging = datasets.staging.name(),
            dialect = %self.dialect,
            "Compiling ingest"
        );
    }

    fn render(&self, plan: &IngestPlan) -> GeneratorResult {
        let renderer = SqlRenderer::new(&self.dialect);
        let result = GeneratorResult {
            pre_actions_sql: renderer.render_all(&plan.pre_actions),
            initialize_lock_sql: renderer.render_all(&plan.initialize_lock),
            acquire_lock_sql: renderer.render_all(&plan.acquire_lock),
            deduplication_and_versioning_sql: renderer
                .render_all(&plan.deduplication_and_versioning),
            deduplication_and_versioning_error_checks_sql: plan
                .error_checks
                .iter()
                .map(|(kind, select)| (*kind, renderer.render_select(select)))
                .collect(),
            ingest_sql: renderer.render_all(&plan.ingest),
            metadata_ingest_sql: renderer.render_all(&plan.metadata_ingest),
            post_actions_sql: renderer.render_all(&plan.post_actions),
            post_cleanup_sql: renderer.render_all(&plan.post_cleanup),
            pre_ingest_statistics_sql: plan
                .pre_ingest_statistics
                .iter()
                .map(|(name, select)| (*name, renderer.render_select(select)))
                .collect(),
            post_ingest_statistics_sql: plan
                .post_ingest_statistics
                .iter()
                .map(|(name, select)| (*name, renderer.render_select(select)))
                .collect(),
            data_split_range: None,
        };
        debug!(
            statements = result.all_statements().count(),
            "Rendered ingest for {}", self.dialect
        );
        result
    }
}

/// Ranges must be non-empty, ordered within themselves and pairwise disjoint
fn validate_ranges(ranges: &[DataSplitRange]) -> CompileResult<()> {
    if ranges.is_empty() {
        return Err(CompileError::InvalidDataSplit(
            "at least one range is required".to_string(),
        ));
    }
    if let Some(range) = ranges.iter().find(|r| r.lower_bound > r.upper_bound) {
        return Err(CompileError::InvalidDataSplit(format!(
            "lower bound {} exceeds upper bound {}",
            range.lower_bound, range.upper_bound
        )));
    }
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|r| r.lower_bound);
    if let Some(pair) = sorted
        .windows(2)
        .find(|pair| pair[1].lower_bound <= pair[0].upper_bound)
    {
        return Err(CompileError::InvalidDataSplit(format!(
            "ranges [{}, {}] and [{}, {}] overlap",
            pair[0].lower_bound, pair[0].upper_bound, pair[1].lower_bound, pair[1].upper_bound
        )));
    }
    Ok(())
}

/// Copy of `template` with the quoted split placeholders replaced by `range`
fn with_data_split(template: &GeneratorResult, range: DataSplitRange) -> GeneratorResult {
    let lower = format!("'{}'", DATA_SPLIT_LOWER_BOUND_PLACEHOLDER);
    let upper = format!("'{}'", DATA_SPLIT_UPPER_BOUND_PLACEHOLDER);
    let substitute = |sql: &String| {
        sql.replace(&lower, &range.lower_bound.to_string())
            .replace(&upper, &range.upper_bound.to_string())
    };
    let all = |statements: &[String]| statements.iter().map(&substitute).collect::<Vec<_>>();

    GeneratorResult {
        pre_actions_sql: all(&template.pre_actions_sql),
        initialize_lock_sql: all(&template.initialize_lock_sql),
        acquire_lock_sql: all(&template.acquire_lock_sql),
        deduplication_and_versioning_sql: all(&template.deduplication_and_versioning_sql),
        deduplication_and_versioning_error_checks_sql: template
            .deduplication_and_versioning_error_checks_sql
            .iter()
            .map(|(kind, sql)| (*kind, substitute(sql)))
            .collect(),
        ingest_sql: all(&template.ingest_sql),
        metadata_ingest_sql: all(&template.metadata_ingest_sql),
        post_actions_sql: all(&template.post_actions_sql),
        post_cleanup_sql: all(&template.post_cleanup_sql),
        pre_ingest_statistics_sql: template
            .pre_ingest_statistics_sql
            .iter()
            .map(|(name, sql)| (*name, substitute(sql)))
            .collect(),
        post_ingest_statistics_sql: template
            .post_ingest_statistics_sql
            .iter()
            .map(|(name, sql)| (*name, substitute(sql)))
            .collect(),
        data_split_range: Some(range),
    }
}
