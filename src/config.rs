//! Compiler configuration file support
//!
//! Handles parsing of `ingest-compiler.toml` configuration files and
//! environment variable overrides. The configuration supplies the defaults a
//! [`crate::generator::Compiler`] is built from; a compile request may still
//! name its own metadata table.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::dialect::{Dialect, DialectKind};
use crate::models::MetadataDataset;
use crate::models::dataset::DEFAULT_METADATA_TABLE;
use crate::planner::{DEFAULT_BATCH_SUCCESS_STATUS, DEFAULT_SAMPLE_ROW_COUNT, PlannerOptions};
use crate::validation::input::validate_dataset_name;

/// Default configuration filename
pub const CONFIG_FILENAME: &str = "ingest-compiler.toml";

/// Environment variable for the target dialect
pub const ENV_DIALECT: &str = "INGEST_COMPILER_DIALECT";

/// Environment variable for upper-case identifier folding
pub const ENV_UPPER_CASE: &str = "INGEST_COMPILER_UPPER_CASE";

/// Environment variable for statistics collection
pub const ENV_COLLECT_STATISTICS: &str = "INGEST_COMPILER_COLLECT_STATISTICS";

/// Environment variable for staging cleanup
pub const ENV_CLEANUP_STAGING: &str = "INGEST_COMPILER_CLEANUP_STAGING";

/// Environment variable for lock table statements
pub const ENV_CONCURRENT_SAFETY: &str = "INGEST_COMPILER_CONCURRENT_SAFETY";

/// Environment variable for the error-check sample size
pub const ENV_SAMPLE_ROWS: &str = "INGEST_COMPILER_SAMPLE_ROWS";

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Target dialect section
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DialectSection {
    /// Dialect preset name
    #[serde(default)]
    pub name: DialectKind,

    /// Fold identifiers to upper case
    #[serde(default)]
    pub upper_case: bool,
}

/// Planner options section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerSection {
    #[serde(default = "default_true")]
    pub cleanup_staging_data: bool,

    #[serde(default)]
    pub collect_statistics: bool,

    #[serde(default)]
    pub create_staging_dataset: bool,

    #[serde(default)]
    pub enable_concurrent_safety: bool,

    /// Rows returned by the duplicate and data error sample queries
    #[serde(default = "default_sample_row_count")]
    pub sample_row_count: u64,

    /// Status written to the metadata table
    #[serde(default = "default_batch_success_status")]
    pub batch_success_status: String,
}

fn default_true() -> bool {
    true
}

fn default_sample_row_count() -> u64 {
    DEFAULT_SAMPLE_ROW_COUNT
}

fn default_batch_success_status() -> String {
    DEFAULT_BATCH_SUCCESS_STATUS.to_string()
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            cleanup_staging_data: default_true(),
            collect_statistics: false,
            create_staging_dataset: false,
            enable_concurrent_safety: false,
            sample_row_count: default_sample_row_count(),
            batch_success_status: default_batch_success_status(),
        }
    }
}

/// Batch metadata table section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSection {
    #[serde(default = "default_metadata_table")]
    pub table_name: String,
}

fn default_metadata_table() -> String {
    DEFAULT_METADATA_TABLE.to_string()
}

impl Default for MetadataSection {
    fn default() -> Self {
        Self {
            table_name: default_metadata_table(),
        }
    }
}

/// Main configuration structure
///
/// Represents the `ingest-compiler.toml` configuration file format.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default)]
    pub dialect: DialectSection,

    #[serde(default)]
    pub planner: PlannerSection,

    #[serde(default)]
    pub metadata: MetadataSection,
}

impl CompilerConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a directory
    ///
    /// Looks for `ingest-compiler.toml` in `dir` and falls back to defaults
    /// if it is not there. Environment overrides are applied either way.
    pub fn load(dir: &Path) -> ConfigResult<Self> {
        let config_path = dir.join(CONFIG_FILENAME);

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Read and parse one configuration file, without environment overrides
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Io(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a directory
    pub fn save(&self, dir: &Path) -> ConfigResult<()> {
        let config_path = dir.join(CONFIG_FILENAME);
        let content = self.to_toml()?;

        std::fs::write(&config_path, content)
            .map_err(|e| ConfigError::Io(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`; values that do not parse are ignored
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup(ENV_DIALECT)
            && let Ok(kind) = name.parse()
        {
            self.dialect.name = kind;
        }

        if let Some(value) = lookup(ENV_UPPER_CASE)
            && let Some(flag) = parse_flag(&value)
        {
            self.dialect.upper_case = flag;
        }

        if let Some(value) = lookup(ENV_COLLECT_STATISTICS)
            && let Some(flag) = parse_flag(&value)
        {
            self.planner.collect_statistics = flag;
        }

        if let Some(value) = lookup(ENV_CLEANUP_STAGING)
            && let Some(flag) = parse_flag(&value)
        {
            self.planner.cleanup_staging_data = flag;
        }

        if let Some(value) = lookup(ENV_CONCURRENT_SAFETY)
            && let Some(flag) = parse_flag(&value)
        {
            self.planner.enable_concurrent_safety = flag;
        }

        if let Some(value) = lookup(ENV_SAMPLE_ROWS)
            && let Ok(rows) = value.parse()
        {
            self.planner.sample_row_count = rows;
        }
    }

    /// Check values that parse but cannot be used
    pub fn validate(&self) -> ConfigResult<()> {
        if self.planner.sample_row_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "planner.sample_row_count".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.planner.batch_success_status.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "planner.batch_success_status".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        validate_dataset_name(&self.metadata.table_name).map_err(|e| {
            ConfigError::InvalidValue {
                key: "metadata.table_name".to_string(),
                reason: e.to_string(),
            }
        })
    }

    /// Dialect preset with the configured case policy
    pub fn dialect(&self) -> Dialect {
        Dialect::from_kind(self.dialect.name).with_upper_case(self.dialect.upper_case)
    }

    /// Planner options; the batch start timestamp is the current time
    pub fn planner_options(&self) -> PlannerOptions {
        PlannerOptions {
            cleanup_staging_data: self.planner.cleanup_staging_data,
            collect_statistics: self.planner.collect_statistics,
            create_staging_dataset: self.planner.create_staging_dataset,
            enable_concurrent_safety: self.planner.enable_concurrent_safety,
            sample_row_count: self.planner.sample_row_count,
            batch_success_status: self.planner.batch_success_status.clone(),
            ..PlannerOptions::default()
        }
    }

    /// Metadata table used when a request does not name one
    pub fn metadata_dataset(&self) -> MetadataDataset {
        MetadataDataset {
            name: self.metadata.table_name.clone(),
            ..MetadataDataset::default()
        }
    }

    /// Check if configuration exists in a directory
    pub fn exists(dir: &Path) -> bool {
        dir.join(CONFIG_FILENAME).exists()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# Ingest SQL Compiler Configuration

[dialect]
# One of: ansi, h2, postgres, memsql, bigquery, snowflake, duckdb
name = "ansi"

# Fold identifiers, table names and generated aliases to upper case
upper_case = false

[planner]
# Empty staging once the ingest has succeeded
cleanup_staging_data = true

# Emit pre and post ingest statistics queries
collect_statistics = false

# Create the staging table in the pre-actions
create_staging_dataset = false

# Emit lock table statements
enable_concurrent_safety = false

# Rows returned by the duplicate and data error sample queries
sample_row_count = 20

# Status written to the batch metadata table
batch_success_status = "DONE"

[metadata]
table_name = "batch_metadata"
"#
}
