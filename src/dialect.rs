//! Dialect capability record
//!
//! The planner is dialect-agnostic. Everything that varies between target
//! databases (identifier quoting, case folding, optional SQL features) is
//! captured here and consulted by the validator and the renderer. The
//! delta planner also reads the upsert preference.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CompileError, CompileResult};

/// Supported target databases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Ansi,
    H2,
    Postgres,
    MemSql,
    BigQuery,
    Snowflake,
    DuckDb,
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ansi" => Ok(DialectKind::Ansi),
            "h2" => Ok(DialectKind::H2),
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "memsql" | "singlestore" => Ok(DialectKind::MemSql),
            "bigquery" => Ok(DialectKind::BigQuery),
            "snowflake" => Ok(DialectKind::Snowflake),
            "duckdb" => Ok(DialectKind::DuckDb),
            _ => Err(format!(
                "Unknown dialect: {}. Use one of ansi, h2, postgres, memsql, bigquery, snowflake, duckdb.",
                s
            )),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectKind::Ansi => write!(f, "ansi"),
            DialectKind::H2 => write!(f, "h2"),
            DialectKind::Postgres => write!(f, "postgres"),
            DialectKind::MemSql => write!(f, "memsql"),
            DialectKind::BigQuery => write!(f, "bigquery"),
            DialectKind::Snowflake => write!(f, "snowflake"),
            DialectKind::DuckDb => write!(f, "duckdb"),
        }
    }
}

/// Case policy applied to identifiers at render time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseConversion {
    #[default]
    None,
    ToUpper,
}

/// Optional capabilities the planner may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectFeature {
    WindowFunctions,
    InsertSelect,
}

impl fmt::Display for DialectFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectFeature::WindowFunctions => write!(f, "window functions"),
            DialectFeature::InsertSelect => write!(f, "INSERT ... SELECT"),
        }
    }
}

/// strftime format of batch timestamp literals
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Capabilities of one target database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    pub name: DialectKind,
    pub case_conversion: CaseConversion,
    /// Identifier quote; either `"` or `` ` ``
    pub quote_char: char,
    pub supports_window_functions: bool,
    pub supports_if_not_exists: bool,
    pub supports_cascade: bool,
    /// `INSERT INTO t (cols) (SELECT ...)` runs as a single statement.
    /// Without it, upserts go through MERGE and constant rows use `VALUES`.
    pub supports_insert_select: bool,
    /// Upsert with one MERGE instead of UPDATE then INSERT ... WHERE NOT EXISTS
    pub prefers_merge: bool,
    /// Key constraints are informational and rendered `NOT ENFORCED`
    pub primary_key_not_enforced: bool,
    /// Expression rendered for the batch end timestamp
    pub current_timestamp_function: String,
    pub timestamp_format: String,
    /// Batch timestamps render as `PARSE_DATETIME('<format>','<ts>')`
    pub parse_timestamps: bool,
}

impl Dialect {
    fn preset(name: DialectKind, quote_char: char, current_timestamp: &str) -> Self {
        Self {
            name,
            case_conversion: CaseConversion::None,
            quote_char,
            supports_window_functions: true,
            supports_if_not_exists: true,
            supports_cascade: true,
            supports_insert_select: true,
            prefers_merge: false,
            primary_key_not_enforced: false,
            current_timestamp_function: current_timestamp.to_string(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            parse_timestamps: false,
        }
    }

    pub fn ansi() -> Self {
        Self::preset(DialectKind::Ansi, '"', "CURRENT_TIMESTAMP()")
    }

    pub fn h2() -> Self {
        Self::preset(DialectKind::H2, '"', "CURRENT_TIMESTAMP()")
    }

    pub fn postgres() -> Self {
        Self::preset(DialectKind::Postgres, '"', "CURRENT_TIMESTAMP")
    }

    pub fn memsql() -> Self {
        Self {
            supports_cascade: false,
            ..Self::preset(DialectKind::MemSql, '`', "CURRENT_TIMESTAMP()")
        }
    }

    pub fn bigquery() -> Self {
        Self {
            supports_cascade: false,
            prefers_merge: true,
            primary_key_not_enforced: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            parse_timestamps: true,
            ..Self::preset(DialectKind::BigQuery, '`', "CURRENT_DATETIME()")
        }
    }

    pub fn snowflake() -> Self {
        Self::preset(DialectKind::Snowflake, '"', "CURRENT_TIMESTAMP()")
    }

    pub fn duckdb() -> Self {
        Self::preset(DialectKind::DuckDb, '"', "CURRENT_TIMESTAMP")
    }

    pub fn from_kind(kind: DialectKind) -> Self {
        match kind {
            DialectKind::Ansi => Self::ansi(),
            DialectKind::H2 => Self::h2(),
            DialectKind::Postgres => Self::postgres(),
            DialectKind::MemSql => Self::memsql(),
            DialectKind::BigQuery => Self::bigquery(),
            DialectKind::Snowflake => Self::snowflake(),
            DialectKind::DuckDb => Self::duckdb(),
        }
    }

    /// Switch identifier case folding on or off
    pub fn with_upper_case(mut self, upper_case: bool) -> Self {
        self.case_conversion = if upper_case {
            CaseConversion::ToUpper
        } else {
            CaseConversion::None
        };
        self
    }

    pub fn is_upper_case(&self) -> bool {
        self.case_conversion == CaseConversion::ToUpper
    }

    pub fn supports(&self, feature: DialectFeature) -> bool {
        match feature {
            DialectFeature::WindowFunctions => self.supports_window_functions,
            DialectFeature::InsertSelect => self.supports_insert_select,
        }
    }

    /// Whether delta upserts are emitted as a single MERGE
    pub fn upserts_by_merge(&self) -> bool {
        self.prefers_merge || !self.supports_insert_select
    }

    /// Fail with [`CompileError::MissingDialectFeature`] unless `feature` is available
    pub fn require(&self, feature: DialectFeature) -> CompileResult<()> {
        if self.supports(feature) {
            Ok(())
        } else {
            Err(CompileError::MissingDialectFeature {
                dialect: self.name.to_string(),
                feature: feature.to_string(),
            })
        }
    }

    /// Apply the case policy to an identifier or identifier-derived literal
    pub fn fold(&self, identifier: &str) -> String {
        match self.case_conversion {
            CaseConversion::None => identifier.to_string(),
            CaseConversion::ToUpper => identifier.to_uppercase(),
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::ansi()
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<DialectKind>().map(Self::from_kind)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("MemSQL".parse::<Dialect>().unwrap().quote_char, '`');
        assert_eq!("postgresql".parse::<Dialect>().unwrap().name, DialectKind::Postgres);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_require_missing_feature() {
        let dialect = Dialect {
            supports_window_functions: false,
            ..Dialect::h2()
        };
        assert_eq!(
            dialect.require(DialectFeature::WindowFunctions),
            Err(CompileError::MissingDialectFeature {
                dialect: "h2".to_string(),
                feature: "window functions".to_string(),
            })
        );
    }

    #[test]
    fn test_bigquery_merges_with_informational_keys() {
        let dialect = Dialect::bigquery();
        assert!(dialect.upserts_by_merge());
        assert!(dialect.primary_key_not_enforced);
        assert!(dialect.parse_timestamps);
        assert!(!Dialect::ansi().upserts_by_merge());
    }

    #[test]
    fn test_missing_insert_select_forces_merge() {
        let dialect = Dialect {
            supports_insert_select: false,
            ..Dialect::postgres()
        };
        assert!(dialect.upserts_by_merge());
        assert!(dialect.require(DialectFeature::InsertSelect).is_err());
    }

    #[test]
    fn test_fold_respects_case_policy() {
        assert_eq!(Dialect::ansi().fold("main"), "main");
        assert_eq!(Dialect::ansi().with_upper_case(true).fold("main"), "MAIN");
    }
}
