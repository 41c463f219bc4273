//! SQL renderer
//!
//! Turns [`crate::plan`] nodes into SQL text for one [`Dialect`]. Rendering
//! is infallible: every plan the planners build is renderable, and all
//! configuration checks happen before planning.
//!
//! Formatting rules:
//! - qualified tables quote every part, unqualified tables are bare
//! - projected values and IN lists join with `,`; column, GROUP BY and
//!   PRIMARY KEY lists join with `, `
//! - each operand of AND/OR is parenthesised, a top-level condition is not

use sqlparser::ast::{Ident, Value as SqlValue};

use crate::dialect::Dialect;
use crate::models::Field;
use crate::plan::{
    ArithmeticOp, Condition, CreateTable, FieldRef, FunctionName, JoinKind, MergeInsert,
    Operation, Select, SortOrder, Source, TableAlias, TableRef, TimestampLiteral, Value,
};

/// Renders logical plan nodes for a dialect
pub struct SqlRenderer<'a> {
    dialect: &'a Dialect,
}

impl<'a> SqlRenderer<'a> {
    pub fn new(dialect: &'a Dialect) -> Self {
        Self { dialect }
    }

    /// Render every operation of a phase, in order
    pub fn render_all(&self, operations: &[Operation]) -> Vec<String> {
        operations.iter().map(|op| self.render(op)).collect()
    }

    pub fn render(&self, operation: &Operation) -> String {
        match operation {
            Operation::Create(create) => self.render_create(create),
            Operation::Drop(table) => {
                let mut sql = String::from("DROP TABLE ");
                if self.dialect.supports_if_not_exists {
                    sql.push_str("IF EXISTS ");
                }
                sql.push_str(&self.table_name(table));
                if self.dialect.supports_cascade {
                    sql.push_str(" CASCADE");
                }
                sql
            }
            Operation::Delete { table, condition } => {
                let mut sql = format!("DELETE FROM {}", self.table(table));
                self.push_where(&mut sql, condition.as_ref());
                sql
            }
            Operation::Insert {
                table,
                columns,
                select,
            } => {
                let columns = self.column_list(columns);
                // A constant row needs no SELECT where INSERT ... SELECT is unavailable
                if !self.dialect.supports_insert_select
                    && select.source.is_none()
                    && select.condition.is_none()
                {
                    format!(
                        "INSERT INTO {} ({}) VALUES ({})",
                        self.table_name(table),
                        columns,
                        self.list(&select.values)
                    )
                } else {
                    format!(
                        "INSERT INTO {} ({}) ({})",
                        self.table_name(table),
                        columns,
                        self.render_select(select)
                    )
                }
            }
            Operation::Update {
                table,
                assignments,
                condition,
            } => {
                let mut sql = format!(
                    "UPDATE {} SET {}",
                    self.table(table),
                    self.assignments(table, assignments)
                );
                self.push_where(&mut sql, condition.as_ref());
                sql
            }
            Operation::Merge {
                target,
                source,
                on,
                matched_condition,
                assignments,
                delete_condition,
                insert,
            } => {
                let mut sql = format!(
                    "MERGE INTO {} USING {} ON {}",
                    self.table(target),
                    self.render_source(source),
                    self.render_condition(on)
                );
                sql.push_str(" WHEN MATCHED");
                self.push_guard(&mut sql, matched_condition.as_ref());
                sql.push_str(" THEN UPDATE SET ");
                sql.push_str(&self.assignments(target, assignments));
                if let Some(condition) = delete_condition {
                    sql.push_str(" WHEN MATCHED");
                    self.push_guard(&mut sql, Some(condition));
                    sql.push_str(" THEN DELETE");
                }
                sql.push_str(&self.merge_insert(insert));
                sql
            }
        }
    }

    fn merge_insert(&self, insert: &MergeInsert) -> String {
        let mut sql = String::from(" WHEN NOT MATCHED");
        self.push_guard(&mut sql, insert.condition.as_ref());
        sql.push_str(&format!(
            " THEN INSERT ({}) VALUES ({})",
            self.column_list(&insert.columns),
            self.list(&insert.values)
        ));
        sql
    }

    /// `alias.col = value` pairs, comma separated
    fn assignments(&self, table: &TableRef, assignments: &[(String, Value)]) -> String {
        assignments
            .iter()
            .map(|(column, value)| {
                format!(
                    "{} = {}",
                    self.render_value(&table.field(column)),
                    self.render_value(value)
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn render_create(&self, create: &CreateTable) -> String {
        let mut sql = String::from("CREATE TABLE ");
        if self.dialect.supports_if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&self.table_name(&create.table));

        let mut parts: Vec<String> = create.fields.iter().map(|f| self.column_def(f)).collect();
        let keys: Vec<String> = create
            .fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| self.ident(&f.name))
            .collect();
        if !keys.is_empty() {
            let mut key = format!("PRIMARY KEY ({})", keys.join(", "));
            if self.dialect.primary_key_not_enforced {
                key.push_str(" NOT ENFORCED");
            }
            parts.push(key);
        }
        sql.push('(');
        sql.push_str(&parts.join(","));
        sql.push(')');
        sql
    }

    fn column_def(&self, field: &Field) -> String {
        let mut def = format!("{} {}", self.ident(&field.name), field.data_type);
        if field.primary_key || !field.nullable {
            def.push_str(" NOT NULL");
        }
        if field.unique {
            def.push_str(" UNIQUE");
        }
        def
    }

    pub fn render_select(&self, select: &Select) -> String {
        let values = select
            .values
            .iter()
            .map(|v| self.render_value(v))
            .collect::<Vec<_>>()
            .join(",");
        let mut sql = format!("SELECT {}", values);
        if let Some(source) = &select.source {
            sql.push_str(" FROM ");
            sql.push_str(&self.render_source(source));
        }
        self.push_where(&mut sql, select.condition.as_ref());
        if !select.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(
                &select
                    .group_by
                    .iter()
                    .map(|v| self.render_value(v))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }
        if let Some(having) = &select.having {
            sql.push_str(" HAVING ");
            sql.push_str(&self.render_condition(having));
        }
        if let Some(limit) = select.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        sql
    }

    fn render_source(&self, source: &Source) -> String {
        match source {
            Source::Table(table) => self.table(table),
            Source::SubSelect(select, alias) => {
                format!("({}) as {}", self.render_select(select), alias)
            }
            Source::Join {
                left,
                kind,
                right,
                on,
            } => {
                let keyword = match kind {
                    JoinKind::Inner => "INNER JOIN",
                    JoinKind::LeftOuter => "LEFT OUTER JOIN",
                };
                format!(
                    "{} {} {} ON {}",
                    self.render_source(left),
                    keyword,
                    self.render_source(right),
                    self.render_condition(on)
                )
            }
        }
    }

    pub fn render_condition(&self, condition: &Condition) -> String {
        match condition {
            Condition::Equals(l, r) => self.binary(l, "=", r),
            Condition::NotEquals(l, r) => self.binary(l, "<>", r),
            Condition::GreaterThan(l, r) => self.binary(l, ">", r),
            Condition::GreaterThanOrEqual(l, r) => self.binary(l, ">=", r),
            Condition::LessThan(l, r) => self.binary(l, "<", r),
            Condition::LessThanOrEqual(l, r) => self.binary(l, "<=", r),
            Condition::In(v, list) => format!("{} IN ({})", self.render_value(v), self.list(list)),
            Condition::NotIn(v, list) => {
                format!("{} NOT IN ({})", self.render_value(v), self.list(list))
            }
            Condition::InSelect(v, select) => {
                format!("{} IN ({})", self.render_value(v), self.render_select(select))
            }
            Condition::Exists(select) => format!("EXISTS ({})", self.render_select(select)),
            Condition::And(conditions) => self.junction(conditions, " AND "),
            Condition::Or(conditions) => self.junction(conditions, " OR "),
            Condition::Not(inner) => format!("NOT ({})", self.render_condition(inner)),
            Condition::IsNull(v) => format!("{} IS NULL", self.render_value(v)),
            Condition::IsNotNull(v) => format!("{} IS NOT NULL", self.render_value(v)),
        }
    }

    pub fn render_value(&self, value: &Value) -> String {
        match value {
            Value::Field(field) => self.field(field),
            Value::All => "*".to_string(),
            Value::String(s) => SqlValue::SingleQuotedString(s.clone()).to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Placeholder(raw) => raw.clone(),
            Value::TableName(name) => {
                SqlValue::SingleQuotedString(self.dialect.fold(name)).to_string()
            }
            Value::CurrentTimestamp => self.dialect.current_timestamp_function.clone(),
            Value::Timestamp(ts) => self.timestamp(ts),
            Value::Function { name, args } => {
                let args = self.list(args);
                match name {
                    FunctionName::Count => format!("COUNT({})", args),
                    FunctionName::CountDistinct => format!("COUNT(DISTINCT({}))", args),
                    FunctionName::Max => format!("MAX({})", args),
                    FunctionName::Min => format!("MIN({})", args),
                    FunctionName::Sum => format!("SUM({})", args),
                    FunctionName::Coalesce => format!("COALESCE({})", args),
                    FunctionName::Upper => format!("UPPER({})", args),
                }
            }
            Value::DenseRank {
                partition_by,
                order_by,
            } => {
                let mut window = Vec::new();
                if !partition_by.is_empty() {
                    window.push(format!("PARTITION BY {}", self.list(partition_by)));
                }
                if !order_by.is_empty() {
                    let order = order_by
                        .iter()
                        .map(|(v, order)| {
                            let dir = match order {
                                SortOrder::Asc => "ASC",
                                SortOrder::Desc => "DESC",
                            };
                            format!("{} {}", self.render_value(v), dir)
                        })
                        .collect::<Vec<_>>()
                        .join(",");
                    window.push(format!("ORDER BY {}", order));
                }
                format!("DENSE_RANK() OVER ({})", window.join(" "))
            }
            Value::Arithmetic { op, left, right } => {
                let op = match op {
                    ArithmeticOp::Plus => "+",
                    ArithmeticOp::Minus => "-",
                };
                format!("{}{}{}", self.render_value(left), op, self.render_value(right))
            }
            Value::SubQuery(select) => format!("({})", self.render_select(select)),
            Value::Aliased(inner, alias) => {
                format!("{} as {}", self.render_value(inner), self.ident(alias))
            }
            Value::Labeled(inner, label) => format!(
                "{} as {}",
                self.render_value(inner),
                Ident::with_quote(self.dialect.quote_char, label.as_str())
            ),
        }
    }

    fn timestamp(&self, ts: &TimestampLiteral) -> String {
        let text = match ts {
            TimestampLiteral::At(at) => at.format(&self.dialect.timestamp_format).to_string(),
            TimestampLiteral::Pattern(pattern) => pattern.clone(),
        };
        let literal = SqlValue::SingleQuotedString(text).to_string();
        if self.dialect.parse_timestamps {
            format!(
                "PARSE_DATETIME({},{})",
                SqlValue::SingleQuotedString(self.dialect.timestamp_format.clone()),
                literal
            )
        } else {
            literal
        }
    }

    /// ` AND condition` after a MERGE clause keyword
    fn push_guard(&self, sql: &mut String, condition: Option<&Condition>) {
        if let Some(condition) = condition {
            sql.push_str(" AND ");
            sql.push_str(&self.render_condition(condition));
        }
    }

    fn push_where(&self, sql: &mut String, condition: Option<&Condition>) {
        if let Some(condition) = condition {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_condition(condition));
        }
    }

    fn binary(&self, left: &Value, op: &str, right: &Value) -> String {
        format!("{} {} {}", self.render_value(left), op, self.render_value(right))
    }

    fn junction(&self, conditions: &[Condition], separator: &str) -> String {
        conditions
            .iter()
            .map(|c| format!("({})", self.render_condition(c)))
            .collect::<Vec<_>>()
            .join(separator)
    }

    fn list(&self, values: &[Value]) -> String {
        values
            .iter()
            .map(|v| self.render_value(v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Quoted, case-folded identifier
    fn ident(&self, name: &str) -> String {
        Ident::with_quote(self.dialect.quote_char, self.dialect.fold(name)).to_string()
    }

    fn alias(&self, alias: &TableAlias) -> String {
        match alias {
            TableAlias::Verbatim(a) => a.clone(),
            TableAlias::Identifier(a) => self.dialect.fold(a),
        }
    }

    fn field(&self, field: &FieldRef) -> String {
        match &field.qualifier {
            Some(alias) => format!("{}.{}", self.alias(alias), self.ident(&field.name)),
            None => self.ident(&field.name),
        }
    }

    /// Table name without alias
    fn table_name(&self, table: &TableRef) -> String {
        if table.database.is_none() && table.group.is_none() {
            return self.dialect.fold(&table.name);
        }
        table
            .database
            .iter()
            .chain(table.group.iter())
            .chain(std::iter::once(&table.name))
            .map(|part| self.ident(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Table name followed by its alias, if any
    fn table(&self, table: &TableRef) -> String {
        match &table.alias {
            Some(alias) => format!("{} as {}", self.table_name(table), self.alias(alias)),
            None => self.table_name(table),
        }
    }
}
