//! Logical plan
//!
//! Dialect-agnostic building blocks the planners combine into statements:
//! table references, values, conditions, selections and operations. Nothing
//! here knows about quoting or case; see [`crate::render`].

use chrono::NaiveDateTime;

use crate::models::{DataType, DatasetReference, Field};

/// How a table alias is rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableAlias {
    /// Rendered as written (`sink`, `stage`)
    Verbatim(String),
    /// Derived from a table name and folded like one (lock and metadata tables)
    Identifier(String),
}

impl TableAlias {
    pub fn verbatim(alias: impl Into<String>) -> Self {
        TableAlias::Verbatim(alias.into())
    }
}

/// A table occurrence in a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub database: Option<String>,
    pub group: Option<String>,
    pub name: String,
    pub alias: Option<TableAlias>,
}

impl TableRef {
    /// Reference aliased by the dataset alias, or `default_alias` when unset
    pub fn aliased(reference: &DatasetReference, default_alias: &str) -> Self {
        Self {
            database: reference.database.clone(),
            group: reference.group.clone(),
            name: reference.name.clone(),
            alias: Some(TableAlias::verbatim(reference.alias_or(default_alias))),
        }
    }

    /// Reference whose alias is its own table name
    pub fn self_aliased(reference: &DatasetReference) -> Self {
        Self {
            database: reference.database.clone(),
            group: reference.group.clone(),
            name: reference.name.clone(),
            alias: Some(TableAlias::Identifier(
                reference.alias.clone().unwrap_or_else(|| reference.name.clone()),
            )),
        }
    }

    /// Same table under another alias (self-joins)
    pub fn realias(&self, alias: &str) -> Self {
        Self {
            alias: Some(TableAlias::verbatim(alias)),
            ..self.clone()
        }
    }

    /// The table without its alias, for `INSERT INTO` and DDL targets
    pub fn unaliased(&self) -> Self {
        Self {
            alias: None,
            ..self.clone()
        }
    }

    /// Field qualified by this table's alias
    pub fn field(&self, name: &str) -> Value {
        Value::Field(FieldRef {
            qualifier: self.alias.clone(),
            name: name.to_string(),
        })
    }

    pub fn fields<'a, I>(&self, names: I) -> Vec<Value>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names.into_iter().map(|n| self.field(n)).collect()
    }
}

/// Reference to a column, optionally qualified by a table alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub qualifier: Option<TableAlias>,
    pub name: String,
}

impl FieldRef {
    pub fn qualified(alias: &str, name: &str) -> Value {
        Value::Field(FieldRef {
            qualifier: Some(TableAlias::verbatim(alias)),
            name: name.to_string(),
        })
    }

    pub fn bare(name: &str) -> Value {
        Value::Field(FieldRef {
            qualifier: None,
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionName {
    Count,
    CountDistinct,
    Max,
    Min,
    Sum,
    Coalesce,
    Upper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Plus,
    Minus,
}

/// Scalar expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Field(FieldRef),
    /// `*`
    All,
    /// Quoted data literal, never case-folded
    String(String),
    Integer(i64),
    Boolean(bool),
    /// Inserted verbatim
    Placeholder(String),
    /// Quoted literal spelled like an identifier, folded with identifiers
    TableName(String),
    CurrentTimestamp,
    /// Batch timestamp; its literal syntax is chosen by the dialect
    Timestamp(TimestampLiteral),
    Function {
        name: FunctionName,
        args: Vec<Value>,
    },
    DenseRank {
        partition_by: Vec<Value>,
        order_by: Vec<(Value, SortOrder)>,
    },
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Value>,
        right: Box<Value>,
    },
    SubQuery(Box<Select>),
    /// `value as "name"`; the name is folded with identifiers
    Aliased(Box<Value>, String),
    /// `value as "name"`; the name is rendered as written
    Labeled(Box<Value>, String),
}

impl Value {
    pub fn function(name: FunctionName, args: Vec<Value>) -> Self {
        Value::Function { name, args }
    }

    pub fn count_all() -> Self {
        Value::function(FunctionName::Count, vec![Value::All])
    }

    pub fn minus(self, right: Value) -> Self {
        Value::Arithmetic {
            op: ArithmeticOp::Minus,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn plus(self, right: Value) -> Self {
        Value::Arithmetic {
            op: ArithmeticOp::Plus,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn aliased(self, alias: &str) -> Self {
        Value::Aliased(Box::new(self), alias.to_string())
    }

    pub fn labeled(self, label: &str) -> Self {
        Value::Labeled(Box::new(self), label.to_string())
    }

    pub fn sub_query(select: Select) -> Self {
        Value::SubQuery(Box::new(select))
    }

    /// Literal matching the semantic type of the column it is compared with
    pub fn typed_literal(raw: &str, data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean => match raw.to_lowercase().as_str() {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                _ => Value::String(raw.to_string()),
            },
            t if t.is_numeric() => match raw.parse::<i64>() {
                Ok(n) => Value::Integer(n),
                Err(_) => Value::Placeholder(raw.to_string()),
            },
            _ => Value::String(raw.to_string()),
        }
    }
}

/// A point in time known when planning, or the pattern standing in for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampLiteral {
    At(NaiveDateTime),
    Pattern(String),
}

/// Boolean predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Equals(Value, Value),
    NotEquals(Value, Value),
    GreaterThan(Value, Value),
    GreaterThanOrEqual(Value, Value),
    LessThan(Value, Value),
    LessThanOrEqual(Value, Value),
    In(Value, Vec<Value>),
    NotIn(Value, Vec<Value>),
    InSelect(Value, Box<Select>),
    Exists(Box<Select>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    IsNull(Value),
    IsNotNull(Value),
}

impl Condition {
    /// Conjunction of `conditions`; `None` when empty, the sole operand when single
    pub fn all(mut conditions: Vec<Condition>) -> Option<Condition> {
        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(Condition::And(conditions)),
        }
    }

    /// Like [`Condition::all`] for callers that always supply operands
    pub fn and(mut conditions: Vec<Condition>) -> Condition {
        if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Condition::And(conditions)
        }
    }

    pub fn or(mut conditions: Vec<Condition>) -> Condition {
        if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Condition::Or(conditions)
        }
    }

    pub fn exists(select: Select) -> Condition {
        Condition::Exists(Box::new(select))
    }

    pub fn not_exists(select: Select) -> Condition {
        Condition::not(Condition::exists(select))
    }

    pub fn not(condition: Condition) -> Condition {
        Condition::Not(Box::new(condition))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

/// `FROM` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Table(TableRef),
    /// `(SELECT ...) as alias`
    SubSelect(Box<Select>, String),
    Join {
        left: Box<Source>,
        kind: JoinKind,
        right: Box<Source>,
        on: Condition,
    },
}

impl Source {
    pub fn sub_select(select: Select, alias: &str) -> Self {
        Source::SubSelect(Box::new(select), alias.to_string())
    }

    pub fn join(left: Source, kind: JoinKind, right: Source, on: Condition) -> Self {
        Source::Join {
            left: Box::new(left),
            kind,
            right: Box::new(right),
            on,
        }
    }
}

/// `SELECT values FROM source WHERE condition GROUP BY ... HAVING ... LIMIT n`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Select {
    pub values: Vec<Value>,
    pub source: Option<Source>,
    pub condition: Option<Condition>,
    pub group_by: Vec<Value>,
    pub having: Option<Condition>,
    pub limit: Option<u64>,
}

impl Select {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            ..Default::default()
        }
    }

    pub fn from_table(values: Vec<Value>, table: &TableRef) -> Self {
        Self::new(values).source(Source::Table(table.clone()))
    }

    /// `SELECT * FROM table WHERE condition`
    pub fn all_from(table: &TableRef, condition: Option<Condition>) -> Self {
        Self {
            condition,
            ..Self::from_table(vec![Value::All], table)
        }
    }

    pub fn source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn filter(mut self, condition: Option<Condition>) -> Self {
        self.condition = condition;
        self
    }

    pub fn group_by(mut self, group_by: Vec<Value>) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn having(mut self, condition: Condition) -> Self {
        self.having = Some(condition);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    pub table: TableRef,
    pub fields: Vec<Field>,
}

/// Executable statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create(CreateTable),
    Drop(TableRef),
    /// `DELETE FROM table as alias [WHERE condition]`
    Delete {
        table: TableRef,
        condition: Option<Condition>,
    },
    /// `INSERT INTO table (columns) (select)`
    Insert {
        table: TableRef,
        columns: Vec<String>,
        select: Select,
    },
    /// `UPDATE table as alias SET alias.col = value, ... [WHERE condition]`
    Update {
        table: TableRef,
        assignments: Vec<(String, Value)>,
        condition: Option<Condition>,
    },
    /// Single-statement upsert:
    /// `MERGE INTO target USING source ON on WHEN MATCHED ... WHEN NOT MATCHED ...`
    Merge {
        target: TableRef,
        source: Source,
        on: Condition,
        /// Guard of the `WHEN MATCHED ... THEN UPDATE` clause
        matched_condition: Option<Condition>,
        assignments: Vec<(String, Value)>,
        /// Guard of an optional `WHEN MATCHED ... THEN DELETE` clause
        delete_condition: Option<Condition>,
        insert: MergeInsert,
    },
}

/// `WHEN NOT MATCHED [AND condition] THEN INSERT (columns) VALUES (values)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeInsert {
    pub condition: Option<Condition>,
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl Operation {
    pub fn create(table: &TableRef, fields: Vec<Field>) -> Self {
        Operation::Create(CreateTable {
            table: table.unaliased(),
            fields,
        })
    }

    pub fn delete_all(table: &TableRef) -> Self {
        Operation::Delete {
            table: table.clone(),
            condition: None,
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Operation::Delete { .. } | Operation::Update { .. } | Operation::Merge { .. }
        )
    }
}

/// Ordered statements of one phase
pub type LogicalPlan = Vec<Operation>;
