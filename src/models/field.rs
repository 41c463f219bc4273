//! Field model for dataset schemas

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static DATA_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_ ]*?)\s*(?:\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\))?\s*$")
        .expect("Invalid regex")
});

/// Semantic type of a field.
///
/// Rendered verbatim into `CREATE TABLE` statements, so the textual form is
/// the canonical upper-case SQL spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    Int,
    Integer,
    BigInt,
    SmallInt,
    TinyInt,
    Float,
    Double,
    Decimal {
        precision: Option<u32>,
        scale: Option<u32>,
    },
    Varchar {
        length: Option<u32>,
    },
    Char {
        length: Option<u32>,
    },
    String,
    Boolean,
    Date,
    Time,
    Timestamp,
    DateTime,
    Json,
    Variant,
}

impl DataType {
    /// Whether optimization filters may compare this type against range bounds
    pub fn is_range_comparable(&self) -> bool {
        matches!(
            self,
            DataType::Int
                | DataType::Integer
                | DataType::BigInt
                | DataType::SmallInt
                | DataType::TinyInt
                | DataType::Float
                | DataType::Double
                | DataType::Decimal { .. }
                | DataType::Date
        )
    }

    /// Whether a versioning field of this type can be ordered
    pub fn is_version_comparable(&self) -> bool {
        self.is_range_comparable()
            || matches!(
                self,
                DataType::Time
                    | DataType::Timestamp
                    | DataType::DateTime
                    | DataType::Varchar { .. }
                    | DataType::Char { .. }
                    | DataType::String
            )
    }

    /// Whether literals of this type render unquoted
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int
                | DataType::Integer
                | DataType::BigInt
                | DataType::SmallInt
                | DataType::TinyInt
                | DataType::Float
                | DataType::Double
                | DataType::Decimal { .. }
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Integer => write!(f, "INTEGER"),
            DataType::BigInt => write!(f, "BIGINT"),
            DataType::SmallInt => write!(f, "SMALLINT"),
            DataType::TinyInt => write!(f, "TINYINT"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Double => write!(f, "DOUBLE"),
            DataType::Decimal {
                precision: Some(p),
                scale: Some(s),
            } => write!(f, "DECIMAL({},{})", p, s),
            DataType::Decimal {
                precision: Some(p),
                scale: None,
            } => write!(f, "DECIMAL({})", p),
            DataType::Decimal { .. } => write!(f, "DECIMAL"),
            DataType::Varchar { length: Some(n) } => write!(f, "VARCHAR({})", n),
            DataType::Varchar { length: None } => write!(f, "VARCHAR"),
            DataType::Char { length: Some(n) } => write!(f, "CHAR({})", n),
            DataType::Char { length: None } => write!(f, "CHAR"),
            DataType::String => write!(f, "STRING"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Date => write!(f, "DATE"),
            DataType::Time => write!(f, "TIME"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::DateTime => write!(f, "DATETIME"),
            DataType::Json => write!(f, "JSON"),
            DataType::Variant => write!(f, "VARIANT"),
        }
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = DATA_TYPE_RE
            .captures(s)
            .ok_or_else(|| format!("Unknown data type: {}", s))?;
        let name = caps
            .get(1)
            .map(|m| m.as_str().to_uppercase())
            .unwrap_or_default();
        let arg = |i: usize| -> Result<Option<u32>, String> {
            caps.get(i)
                .map(|m| m.as_str().parse::<u32>().map_err(|e| e.to_string()))
                .transpose()
        };
        let first = arg(2)?;
        let second = arg(3)?;

        let data_type = match name.as_str() {
            "INT" => DataType::Int,
            "INTEGER" => DataType::Integer,
            "BIGINT" => DataType::BigInt,
            "SMALLINT" => DataType::SmallInt,
            "TINYINT" => DataType::TinyInt,
            "FLOAT" => DataType::Float,
            "DOUBLE" => DataType::Double,
            "DECIMAL" | "NUMERIC" => DataType::Decimal {
                precision: first,
                scale: second,
            },
            "VARCHAR" => DataType::Varchar { length: first },
            "CHAR" => DataType::Char { length: first },
            "STRING" | "TEXT" => DataType::String,
            "BOOLEAN" | "BOOL" => DataType::Boolean,
            "DATE" => DataType::Date,
            "TIME" => DataType::Time,
            "TIMESTAMP" => DataType::Timestamp,
            "DATETIME" => DataType::DateTime,
            "JSON" => DataType::Json,
            "VARIANT" => DataType::Variant,
            _ => return Err(format!("Unknown data type: {}", s)),
        };
        Ok(data_type)
    }
}

impl TryFrom<String> for DataType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.to_string()
    }
}

/// A single column of a dataset schema
///
/// # Example
///
/// ```rust
/// use ingest_sql_compiler::models::{DataType, Field};
///
/// let id = Field::new("id", DataType::Int).as_primary_key();
/// assert!(!id.nullable);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Semantic type
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Whether the field allows NULL values (default: true)
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Whether this field is part of the primary key (default: false)
    #[serde(default)]
    pub primary_key: bool,
    /// Whether the field carries a UNIQUE constraint (default: false)
    #[serde(default)]
    pub unique: bool,
}

fn default_true() -> bool {
    true
}

impl Field {
    /// Create a nullable, non-key field
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            primary_key: false,
            unique: false,
        }
    }

    /// Mark the field as part of the primary key; key fields are never nullable
    pub fn as_primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parameterised_types() {
        assert_eq!(
            "varchar(255)".parse::<DataType>(),
            Ok(DataType::Varchar { length: Some(255) })
        );
        assert_eq!(
            "DECIMAL(10, 2)".parse::<DataType>(),
            Ok(DataType::Decimal {
                precision: Some(10),
                scale: Some(2)
            })
        );
        assert_eq!(
            DataType::Decimal {
                precision: Some(10),
                scale: Some(2)
            }
            .to_string(),
            "DECIMAL(10,2)"
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!("GEOGRAPHY".parse::<DataType>().is_err());
        assert!("INT; DROP".parse::<DataType>().is_err());
    }

    #[test]
    fn test_field_deserializes_type_string() {
        let field: Field =
            serde_json::from_str(r#"{"name":"amount","type":"DOUBLE"}"#).unwrap();
        assert_eq!(field.data_type, DataType::Double);
        assert!(field.nullable);
        assert!(!field.primary_key);
    }

    #[test]
    fn test_range_comparable_types() {
        assert!(DataType::Date.is_range_comparable());
        assert!(!DataType::Timestamp.is_range_comparable());
        assert!(DataType::Timestamp.is_version_comparable());
        assert!(!DataType::Json.is_version_comparable());
    }
}
