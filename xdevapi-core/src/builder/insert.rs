//! Table insert statement builder

use std::collections::{BTreeMap, HashMap};

use super::common::{
    column_list, context, ensure_allowed, push_value, quote_identifier, Bindings, IntoColumns,
    Operation, QueryBuilder, Stage, TableRef,
};
use crate::executor::{CompiledStatement, StatementKind};
use crate::{Error, Result, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertStage {
    Insert,
    Values,
    Document,
    Executed,
}

impl Stage for InsertStage {
    const STATEMENT: &'static str = "TableInsert";

    fn allowed(self) -> &'static [Operation] {
        match self {
            Self::Insert => &[Operation::Values],
            Self::Values => &[Operation::Values, Operation::Execute],
            Self::Document => &[Operation::Execute],
            Self::Executed => &[Operation::Execute],
        }
    }
}

/// Insert statement on a table, created by `Table::insert*`
///
/// # Examples
/// ```
/// use xdevapi_core::{QueryBuilder, Schema};
///
/// let table = Schema::new("test").get_table("people");
/// let insert = table
///     .insert_columns(["name", "age"]).unwrap()
///     .values(("jack", 17)).unwrap()
///     .values(("adam", 15)).unwrap();
///
/// assert_eq!(
///     insert.to_sql().unwrap(),
///     "INSERT INTO `test`.`people` (`name`, `age`) VALUES (?, ?), (?, ?)"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct TableInsert {
    table: TableRef,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    stage: InsertStage,
}

impl TableInsert {
    /// Insert without a column list, every row must cover all table columns
    pub(crate) fn new(table: TableRef) -> Self {
        Self {
            table,
            columns: Vec::new(),
            rows: Vec::new(),
            stage: InsertStage::Insert,
        }
    }

    /// Insert into the given columns
    pub(crate) fn with_columns<C: IntoColumns>(table: TableRef, columns: C) -> Result<Self> {
        let columns = column_list("Table.insert", "Column list", columns)?;
        Ok(Self {
            columns,
            ..Self::new(table)
        })
    }

    /// Insert one row described as column/value pairs
    pub(crate) fn with_document<D: IntoInsertDocument>(table: TableRef, document: D) -> Result<Self> {
        let pairs = document.into_insert_document("Table.insert")?;
        if pairs.is_empty() {
            return Err(Error::invalid_argument(
                "Table.insert",
                "Document can not be empty",
            ));
        }
        let (columns, row): (Vec<String>, Vec<Value>) = pairs.into_iter().unzip();
        Ok(Self {
            table,
            columns,
            rows: vec![row],
            stage: InsertStage::Document,
        })
    }

    /// Add one row of values
    pub fn values<V: IntoValues>(mut self, row: V) -> Result<Self> {
        ensure_allowed(self.stage, Operation::Values)?;
        let ctx = context::<InsertStage>(Operation::Values);
        let row = row.into_values();
        if row.is_empty() {
            return Err(Error::invalid_argument(ctx, "Values can not be empty"));
        }
        self.rows.push(row);
        self.stage = InsertStage::Values;
        Ok(self)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Every row must match the column list, or the first row when there is none
    fn check_row_shapes(&self, ctx: &str) -> Result<()> {
        let expected = if self.columns.is_empty() {
            self.rows.first().map_or(0, Vec::len)
        } else {
            self.columns.len()
        };
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != expected {
                return Err(Error::invalid_argument(
                    ctx,
                    format!(
                        "Row #{} has {} values, expected {}",
                        i + 1,
                        row.len(),
                        expected
                    ),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn prepare_execute(&self) -> Result<CompiledStatement> {
        ensure_allowed(self.stage, Operation::Execute)?;
        self.compile()
    }

    pub(crate) fn mark_executed(&mut self) {
        self.stage = InsertStage::Executed;
    }
}

impl QueryBuilder for TableInsert {
    fn compile(&self) -> Result<CompiledStatement> {
        let ctx = context::<InsertStage>(Operation::Execute);
        if self.rows.is_empty() {
            return Err(Error::invalid_argument(
                ctx,
                "INSERT requires values to be specified with .values()",
            ));
        }
        self.check_row_shapes(&ctx)?;

        let mut sql = String::from("INSERT INTO ");
        let mut params = Vec::new();
        sql.push_str(&self.table.to_sql());

        if !self.columns.is_empty() {
            let quoted: Vec<String> = self.columns.iter().map(|c| quote_identifier(c)).collect();
            sql.push_str(" (");
            sql.push_str(&quoted.join(", "));
            sql.push(')');
        }

        // Insert statements take no bind() calls
        let bindings = Bindings::default();
        sql.push_str(" VALUES ");
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for (j, value) in row.iter().enumerate() {
                if j > 0 {
                    sql.push_str(", ");
                }
                push_value(&ctx, value, &bindings, &mut sql, &mut params)?;
            }
            sql.push(')');
        }

        Ok(CompiledStatement::new(StatementKind::Insert, sql, params))
    }

    fn valid_operations(&self) -> &'static [Operation] {
        self.stage.allowed()
    }
}

/// Trait for types that can be converted into one row of insert values
pub trait IntoValues {
    fn into_values(self) -> Vec<Value>;
}

impl<T: Into<Value>> IntoValues for Vec<T> {
    fn into_values(self) -> Vec<Value> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Value>, const N: usize> IntoValues for [T; N] {
    fn into_values(self) -> Vec<Value> {
        self.into_iter().map(Into::into).collect()
    }
}

macro_rules! impl_into_values_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: Into<Value>),+> IntoValues for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_values(self) -> Vec<Value> {
                let ($($name,)+) = self;
                vec![$($name.into()),+]
            }
        }
    };
}

impl_into_values_for_tuple!(A);
impl_into_values_for_tuple!(A, B);
impl_into_values_for_tuple!(A, B, C);
impl_into_values_for_tuple!(A, B, C, D);
impl_into_values_for_tuple!(A, B, C, D, E);
impl_into_values_for_tuple!(A, B, C, D, E, F);
impl_into_values_for_tuple!(A, B, C, D, E, F, G);
impl_into_values_for_tuple!(A, B, C, D, E, F, G, H);

/// Trait for types that describe a row as column/value pairs
pub trait IntoInsertDocument {
    fn into_insert_document(self, context: &str) -> Result<Vec<(String, Value)>>;
}

/// Keys are sorted so the generated column order is stable
impl<V: Into<Value>> IntoInsertDocument for HashMap<String, V> {
    fn into_insert_document(self, _context: &str) -> Result<Vec<(String, Value)>> {
        let mut pairs: Vec<(String, Value)> = self.into_iter().map(|(k, v)| (k, v.into())).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pairs)
    }
}

impl<V: Into<Value>> IntoInsertDocument for BTreeMap<String, V> {
    fn into_insert_document(self, _context: &str) -> Result<Vec<(String, Value)>> {
        Ok(self.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl IntoInsertDocument for serde_json::Map<String, serde_json::Value> {
    fn into_insert_document(self, _context: &str) -> Result<Vec<(String, Value)>> {
        Ok(self.into_iter().map(|(k, v)| (k, json_to_value(v))).collect())
    }
}

impl IntoInsertDocument for serde_json::Value {
    fn into_insert_document(self, context: &str) -> Result<Vec<(String, Value)>> {
        match self {
            serde_json::Value::Object(map) => map.into_insert_document(context),
            _ => Err(Error::invalid_argument(
                context,
                "Argument #1 is expected to be an object",
            )),
        }
    }
}

/// Scalars become plain values, arrays and objects are stored as JSON
fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::I64(i)
            } else if let Some(u) = n.as_u64() {
                Value::U64(u)
            } else {
                n.as_f64().map_or(Value::Null, Value::F64)
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        other => Value::Json(other),
    }
}
