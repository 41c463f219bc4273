//! Dataset model: a named, optionally qualified table and its schema

use serde::{Deserialize, Serialize};

use super::field::Field;

/// Default name of the batch metadata table
pub const DEFAULT_METADATA_TABLE: &str = "batch_metadata";

/// Suffix appended to the main table name to derive the lock table
pub const LOCK_TABLE_SUFFIX: &str = "_ingest_lock";

/// Location of a dataset: optional database and group (schema) qualifiers,
/// the table name and an optional alias used in generated SQL.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatasetReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl DatasetReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Alias to use in SQL, falling back to `default` when none was given
    pub fn alias_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.alias.as_deref().unwrap_or(default)
    }

    /// Reference to a sibling table in the same database and group
    pub fn sibling(&self, name: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            database: self.database.clone(),
            group: self.group.clone(),
            name: name.into(),
            alias,
        }
    }
}

/// Dataset model representing a table taking part in an ingest
///
/// The dataset is owned by the caller and never mutated by the compiler;
/// schema enrichment works on a copy.
///
/// # Example
///
/// ```rust
/// use ingest_sql_compiler::models::{DataType, Dataset, Field};
///
/// let main = Dataset::new("main", vec![
///     Field::new("id", DataType::Int).as_primary_key(),
///     Field::new("name", DataType::Varchar { length: None }),
/// ])
/// .with_database("mydb");
///
/// assert_eq!(main.primary_keys(), vec!["id"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(flatten)]
    pub reference: DatasetReference,
    /// Ordered schema
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Dataset {
    /// Create an unqualified dataset with the given fields
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            reference: DatasetReference::new(name),
            fields,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.reference.database = Some(database.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.reference.group = Some(group.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.reference.alias = Some(alias.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.reference.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    /// Names of the primary key fields, in schema order
    pub fn primary_keys(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Location of the batch metadata table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDataset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default = "default_metadata_table")]
    pub name: String,
}

fn default_metadata_table() -> String {
    DEFAULT_METADATA_TABLE.to_string()
}

impl Default for MetadataDataset {
    fn default() -> Self {
        Self {
            database: None,
            group: None,
            name: default_metadata_table(),
        }
    }
}

impl MetadataDataset {
    /// The metadata table is always aliased by its own name
    pub fn reference(&self) -> DatasetReference {
        DatasetReference {
            database: self.database.clone(),
            group: self.group.clone(),
            name: self.name.clone(),
            alias: Some(self.name.clone()),
        }
    }
}

/// Location of the lock table; the name defaults to `<main>_ingest_lock`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LockDataset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl LockDataset {
    /// Resolve the lock table for `main`, inheriting its qualifiers when unset
    pub fn reference_for(&self, main: &DatasetReference) -> DatasetReference {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("{}{}", main.name, LOCK_TABLE_SUFFIX));
        DatasetReference {
            database: self.database.clone().or_else(|| main.database.clone()),
            group: self.group.clone().or_else(|| main.group.clone()),
            alias: Some(name.clone()),
            name,
        }
    }
}

/// The datasets taking part in one ingest
///
/// `temp` is only consulted by bitemporal ingests whose validity is derived
/// from the source from-date; when absent a temp table is derived from main.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datasets {
    pub main: Dataset,
    pub staging: Dataset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<Dataset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataDataset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<LockDataset>,
}

impl Datasets {
    pub fn new(main: Dataset, staging: Dataset) -> Self {
        Self {
            main,
            staging,
            temp: None,
            metadata: None,
            lock: None,
        }
    }

    pub fn with_temp(mut self, temp: Dataset) -> Self {
        self.temp = Some(temp);
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataDataset) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_lock(mut self, lock: LockDataset) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn metadata_reference(&self) -> DatasetReference {
        self.metadata.clone().unwrap_or_default().reference()
    }

    pub fn lock_reference(&self) -> DatasetReference {
        self.lock
            .clone()
            .unwrap_or_default()
            .reference_for(&self.main.reference)
    }
}
