//! Result types returned by statement execution

use std::collections::VecDeque;
use std::fmt::{self, Display};

use serde::de::DeserializeOwned;

use crate::{Error, Result, Value};

/// Broad classification of a column's declared MySQL type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Integer,
    UnsignedInteger,
    Float,
    Double,
    Decimal,
    String,
    Bytes,
    Bit,
    Json,
    Date,
    Time,
    DateTime,
    Other,
}

impl ColumnType {
    /// Classify a server type name such as `BIGINT UNSIGNED` or `VARCHAR`
    pub fn from_type_name(name: &str) -> Self {
        let upper = name.to_ascii_uppercase();
        match upper.as_str() {
            "BOOLEAN" | "BOOL" => return Self::Bool,
            "FLOAT" => return Self::Float,
            "DOUBLE" | "REAL" => return Self::Double,
            "DECIMAL" | "NUMERIC" => return Self::Decimal,
            "JSON" => return Self::Json,
            "DATE" => return Self::Date,
            "TIME" => return Self::Time,
            "DATETIME" | "TIMESTAMP" => return Self::DateTime,
            "BIT" => return Self::Bit,
            _ => {}
        }
        let integer = ["TINYINT", "SMALLINT", "MEDIUMINT", "INT", "INTEGER", "BIGINT", "YEAR"]
            .iter()
            .any(|t| upper == *t || upper.starts_with(&format!("{t} ")));
        if integer {
            return if upper.ends_with("UNSIGNED") {
                Self::UnsignedInteger
            } else {
                Self::Integer
            };
        }
        if upper.contains("BLOB") || upper.contains("BINARY") || upper == "GEOMETRY" {
            return Self::Bytes;
        }
        if upper.contains("CHAR") || upper.contains("TEXT") || upper == "ENUM" || upper == "SET" {
            return Self::String;
        }
        Self::Other
    }
}

/// Metadata of one result column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    type_name: String,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type name reported by the server
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn column_type(&self) -> ColumnType {
        ColumnType::from_type_name(&self.type_name)
    }
}

/// One row of a `RowResult`
///
/// Values are looked up by position with [`Row::get`] or by column name with
/// [`Row::get_field`]. There is no attribute style access, so a column named
/// like one of the accessor methods is still reachable by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    names: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(names: Vec<String>, values: Vec<Value>) -> Self {
        Self { names, values }
    }

    /// Get a value by column position
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name
    pub fn get_field(&self, name: &str) -> Result<&Value> {
        let mut matches = self
            .names
            .iter()
            .enumerate()
            .filter(|(_, n)| n.as_str() == name)
            .map(|(i, _)| i);
        match (matches.next(), matches.next()) {
            (Some(i), None) => self
                .values
                .get(i)
                .ok_or_else(|| Error::column_not_found(name)),
            (Some(_), Some(_)) => Err(Error::AmbiguousColumn {
                column: name.to_string(),
            }),
            (None, _) => Err(Error::column_not_found(name)),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Render the row as a JSON object keyed by column name
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .names
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Rows returned by a select statement, consumed front to back
#[derive(Debug, Clone, Default)]
pub struct RowResult {
    columns: Vec<Column>,
    rows: VecDeque<Row>,
}

impl RowResult {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let rows = rows
            .into_iter()
            .map(|values| Row::new(names.clone(), values))
            .collect();
        Self { columns, rows }
    }

    /// Take the next row, `None` once the result is drained
    pub fn fetch_one(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    /// Take every remaining row
    pub fn fetch_all(&mut self) -> Vec<Row> {
        self.rows.drain(..).collect()
    }

    /// Take every remaining row and deserialize each JSON rendering into `T`
    ///
    /// # Examples
    /// ```
    /// use serde::Deserialize;
    /// use xdevapi_core::{Column, RowResult, Value};
    ///
    /// #[derive(Deserialize)]
    /// struct Person { name: String, age: i64 }
    ///
    /// let mut result = RowResult::new(
    ///     vec![Column::new("name", "VARCHAR"), Column::new("age", "INT")],
    ///     vec![vec![Value::from("adam"), Value::from(15)]],
    /// );
    /// let people: Vec<Person> = result.fetch_all_as().unwrap();
    /// assert_eq!(people[0].name, "adam");
    /// assert_eq!(people[0].age, 15);
    /// ```
    pub fn fetch_all_as<T: DeserializeOwned>(&mut self) -> Result<Vec<T>> {
        self.fetch_all()
            .iter()
            .map(|row| serde_json::from_value(row.to_json()).map_err(Error::from))
            .collect()
    }

    /// True while rows remain to be fetched
    pub fn has_data(&self) -> bool {
        !self.rows.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

impl Iterator for RowResult {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.fetch_one()
    }
}

/// Outcome of an insert, update or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MutationResult {
    affected_items: u64,
    auto_increment: Option<u64>,
}

impl MutationResult {
    pub fn new(affected_items: u64, auto_increment: Option<u64>) -> Self {
        Self {
            affected_items,
            auto_increment,
        }
    }

    pub fn affected_items_count(&self) -> u64 {
        self.affected_items
    }

    /// First auto-increment value generated by an insert, if any
    pub fn auto_increment_value(&self) -> Option<u64> {
        self.auto_increment
    }
}

/// Outcome of a raw SQL statement
#[derive(Debug, Clone)]
pub enum SqlResult {
    Rows(RowResult),
    Mutation(MutationResult),
}

impl SqlResult {
    pub fn has_data(&self) -> bool {
        matches!(self, Self::Rows(rows) if rows.has_data())
    }

    pub fn affected_items_count(&self) -> u64 {
        match self {
            Self::Rows(_) => 0,
            Self::Mutation(m) => m.affected_items_count(),
        }
    }

    pub fn auto_increment_value(&self) -> Option<u64> {
        match self {
            Self::Rows(_) => None,
            Self::Mutation(m) => m.auto_increment_value(),
        }
    }

    /// The rows of a query, `None` for statements that return no result set
    pub fn into_rows(self) -> Option<RowResult> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::Mutation(_) => None,
        }
    }
}
