//! Common types and traits shared across all statement builders

use std::collections::HashMap;
use std::fmt::{self, Display};

use crate::executor::CompiledStatement;
use crate::expr::ParsedExpr;
use crate::{Error, Result, Value};

/// Core trait for all statement builders
pub trait QueryBuilder {
    /// Compile the statement into SQL text and ordered parameters
    fn compile(&self) -> Result<CompiledStatement>;

    /// Generate the SQL query string
    fn to_sql(&self) -> Result<String> {
        Ok(self.compile()?.sql)
    }

    /// The operations that may be called next
    fn valid_operations(&self) -> &'static [Operation];
}

/// A chainable call on a statement builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Offset,
    LockShared,
    LockExclusive,
    Values,
    Set,
    Bind,
    Execute,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Where => "where",
            Operation::GroupBy => "group_by",
            Operation::Having => "having",
            Operation::OrderBy => "order_by",
            Operation::Limit => "limit",
            Operation::Offset => "offset",
            Operation::LockShared => "lock_shared",
            Operation::LockExclusive => "lock_exclusive",
            Operation::Values => "values",
            Operation::Set => "set",
            Operation::Bind => "bind",
            Operation::Execute => "execute",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position in a builder's state machine
pub(crate) trait Stage: Copy {
    /// Name used as error context prefix, e.g. `TableSelect`
    const STATEMENT: &'static str;

    /// Transition table: operations callable from this stage
    fn allowed(self) -> &'static [Operation];
}

/// Fail with `InvalidState` unless `op` is allowed from `stage`
pub(crate) fn ensure_allowed<S: Stage>(stage: S, op: Operation) -> Result<()> {
    let allowed = stage.allowed();
    if allowed.contains(&op) {
        Ok(())
    } else {
        Err(Error::invalid_state(context::<S>(op), op, allowed))
    }
}

/// Error context in the `TableSelect.where` form
pub(crate) fn context<S: Stage>(op: Operation) -> String {
    format!("{}.{}", S::STATEMENT, op.as_str())
}

/// Placeholders referenced by a statement and the values bound to them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    referenced: Vec<String>,
    values: HashMap<String, Value>,
}

impl Bindings {
    /// Record the placeholders an expression refers to
    pub(crate) fn register(&mut self, expr: &ParsedExpr) {
        for name in expr.placeholder_names() {
            if !self.referenced.iter().any(|r| r == name) {
                self.referenced.push(name.to_string());
            }
        }
    }

    /// Bind a value, replacing any previous value for the same name
    pub(crate) fn bind(&mut self, context: &str, name: &str, value: Value) -> Result<()> {
        if !self.referenced.iter().any(|r| r == name) {
            return Err(Error::unknown_placeholder(context, name));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Forget placeholders outside `used`, together with their bound values
    pub(crate) fn retain(&mut self, used: &[String]) {
        self.referenced.retain(|name| used.contains(name));
        self.values.retain(|name, _| used.contains(name));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Placeholder names in order of first reference
    pub fn referenced(&self) -> &[String] {
        &self.referenced
    }

    /// Referenced placeholders that have no value yet
    pub fn missing(&self) -> Vec<String> {
        self.referenced
            .iter()
            .filter(|name| !self.values.contains_key(*name))
            .cloned()
            .collect()
    }

    /// Fail with `UnboundPlaceholders` if anything is missing
    pub(crate) fn ensure_complete(&self, context: &str) -> Result<()> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::unbound_placeholders(context, missing))
        }
    }
}

/// Parse an expression argument and register its placeholders
pub(crate) fn parse_expression(
    context: &str,
    text: String,
    bindings: &mut Bindings,
) -> Result<ParsedExpr> {
    let parsed = ParsedExpr::parse(context, text)?;
    bindings.register(&parsed);
    Ok(parsed)
}

/// Register placeholders of a server expression used as a column value
pub(crate) fn register_value(context: &str, value: &Value, bindings: &mut Bindings) -> Result<()> {
    if let Value::Expr(e) = value {
        parse_expression(context, e.data().to_string(), bindings)?;
    }
    Ok(())
}

/// Append a column value: expressions are inlined, everything else becomes `?`
pub(crate) fn push_value(
    context: &str,
    value: &Value,
    bindings: &Bindings,
    sql: &mut String,
    params: &mut Vec<Value>,
) -> Result<()> {
    match value {
        Value::Expr(e) => {
            let parsed = ParsedExpr::parse(context, e.data().to_string())?;
            sql.push('(');
            parsed.render(context, bindings, sql, params)?;
            sql.push(')');
            Ok(())
        }
        other => {
            sql.push('?');
            params.push(other.clone());
            Ok(())
        }
    }
}

/// Quote an identifier with backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// A schema-qualified table name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn to_sql(&self) -> String {
        if self.schema.is_empty() {
            quote_identifier(&self.name)
        } else {
            format!(
                "{}.{}",
                quote_identifier(&self.schema),
                quote_identifier(&self.name)
            )
        }
    }
}

/// Trait to convert various types into column or criteria lists
pub trait IntoColumns {
    fn into_columns(self, context: &str) -> Result<Vec<String>>;
}

impl IntoColumns for &str {
    fn into_columns(self, _context: &str) -> Result<Vec<String>> {
        Ok(vec![self.to_string()])
    }
}

impl IntoColumns for String {
    fn into_columns(self, _context: &str) -> Result<Vec<String>> {
        Ok(vec![self])
    }
}

impl IntoColumns for Vec<String> {
    fn into_columns(self, _context: &str) -> Result<Vec<String>> {
        Ok(self)
    }
}

impl IntoColumns for Vec<&str> {
    fn into_columns(self, _context: &str) -> Result<Vec<String>> {
        Ok(self.into_iter().map(|s| s.to_string()).collect())
    }
}

impl IntoColumns for &[&str] {
    fn into_columns(self, _context: &str) -> Result<Vec<String>> {
        Ok(self.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> IntoColumns for [&str; N] {
    fn into_columns(self, _context: &str) -> Result<Vec<String>> {
        Ok(self.iter().map(|s| s.to_string()).collect())
    }
}

macro_rules! impl_into_columns_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: AsRef<str>),+> IntoColumns for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_columns(self, _context: &str) -> Result<Vec<String>> {
                let ($($name,)+) = self;
                Ok(vec![$($name.as_ref().to_string()),+])
            }
        }
    };
}

impl_into_columns_for_tuple!(A);
impl_into_columns_for_tuple!(A, B);
impl_into_columns_for_tuple!(A, B, C);
impl_into_columns_for_tuple!(A, B, C, D);
impl_into_columns_for_tuple!(A, B, C, D, E);
impl_into_columns_for_tuple!(A, B, C, D, E, F);
impl_into_columns_for_tuple!(A, B, C, D, E, F, G);
impl_into_columns_for_tuple!(A, B, C, D, E, F, G, H);

/// Dynamically typed list, every element must be a string
impl IntoColumns for Vec<Value> {
    fn into_columns(self, context: &str) -> Result<Vec<String>> {
        self.into_iter()
            .enumerate()
            .map(|(i, value)| match value {
                Value::String(s) => Ok(s),
                _ => Err(Error::invalid_argument(
                    context,
                    format!("Element #{} is expected to be a string", i + 1),
                )),
            })
            .collect()
    }
}

impl IntoColumns for Value {
    fn into_columns(self, context: &str) -> Result<Vec<String>> {
        match self {
            Value::String(s) => Ok(vec![s]),
            _ => Err(Error::invalid_argument(
                context,
                "Argument #1 is expected to be a string or an array of strings",
            )),
        }
    }
}

/// Convert and validate a column list: it must be non-empty with no blank entries
pub(crate) fn column_list<C: IntoColumns>(
    context: &str,
    criteria_name: &str,
    columns: C,
) -> Result<Vec<String>> {
    let columns = columns.into_columns(context)?;
    if columns.is_empty() {
        return Err(Error::invalid_argument(
            context,
            format!("{criteria_name} can not be empty"),
        ));
    }
    if let Some(i) = columns.iter().position(|c| c.trim().is_empty()) {
        return Err(Error::invalid_argument(
            context,
            format!("Element #{} is expected to be a non-empty string", i + 1),
        ));
    }
    Ok(columns)
}

/// Sort direction for ORDER BY clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// An ORDER BY criterion
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByClause {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderByClause {
    /// Parse `columnName [ASC|DESC]`
    pub fn parse(criterion: &str) -> Self {
        let trimmed = criterion.trim();
        if let Some((column, last)) = trimmed.rsplit_once(char::is_whitespace) {
            let direction = if last.eq_ignore_ascii_case("asc") {
                Some(SortDirection::Asc)
            } else if last.eq_ignore_ascii_case("desc") {
                Some(SortDirection::Desc)
            } else {
                None
            };
            if let Some(direction) = direction {
                return Self {
                    column: column.trim_end().to_string(),
                    direction,
                };
            }
        }
        Self {
            column: trimmed.to_string(),
            direction: SortDirection::Asc,
        }
    }
}

/// Validate and parse order criteria
pub(crate) fn order_criteria<C: IntoColumns>(context: &str, criteria: C) -> Result<Vec<OrderByClause>> {
    Ok(column_list(context, "Order criteria", criteria)?
        .iter()
        .map(|c| OrderByClause::parse(c))
        .collect())
}

pub(crate) fn push_order_by(sql: &mut String, clauses: &[OrderByClause]) {
    if clauses.is_empty() {
        return;
    }
    sql.push_str(" ORDER BY ");
    let parts: Vec<String> = clauses
        .iter()
        .map(|c| format!("{} {}", c.column, c.direction))
        .collect();
    sql.push_str(&parts.join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_by_parse() {
        assert_eq!(
            OrderByClause::parse("name"),
            OrderByClause { column: "name".into(), direction: SortDirection::Asc }
        );
        assert_eq!(
            OrderByClause::parse("name desc"),
            OrderByClause { column: "name".into(), direction: SortDirection::Desc }
        );
        assert_eq!(
            OrderByClause::parse("  age   ASC "),
            OrderByClause { column: "age".into(), direction: SortDirection::Asc }
        );
        // Only a trailing ASC/DESC word is a direction
        assert_eq!(
            OrderByClause::parse("age + 1"),
            OrderByClause { column: "age + 1".into(), direction: SortDirection::Asc }
        );
    }

    #[test]
    fn test_column_list_validation() {
        let ctx = "TableSelect.order_by";
        assert_eq!(column_list(ctx, "Order criteria", ["name", "age"]).unwrap(), vec!["name", "age"]);

        let err = column_list(ctx, "Order criteria", Vec::<String>::new()).unwrap_err();
        assert_eq!(err.to_string(), "TableSelect.order_by: Order criteria can not be empty");

        let err = column_list(ctx, "Order criteria", vec![Value::from("name"), Value::I64(5)]).unwrap_err();
        assert_eq!(err.to_string(), "TableSelect.order_by: Element #2 is expected to be a string");

        let err = column_list(ctx, "Order criteria", Value::I64(5)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));

        assert!(column_list(ctx, "Order criteria", vec!["name", " "]).is_err());
    }

    #[test]
    fn test_bindings() {
        let parsed = ParsedExpr::parse("ctx", "a = :x and b = :y or c = :x".to_string()).unwrap();
        let mut bindings = Bindings::default();
        bindings.register(&parsed);
        assert_eq!(bindings.referenced(), &["x".to_string(), "y".to_string()]);
        assert_eq!(bindings.missing(), vec!["x".to_string(), "y".to_string()]);

        bindings.bind("ctx", "y", 1.into()).unwrap();
        bindings.bind("ctx", "y", 2.into()).unwrap();
        assert_eq!(bindings.get("y"), Some(&Value::I64(2)));
        assert_eq!(bindings.missing(), vec!["x".to_string()]);

        let err = bindings.bind("ctx", "z", 1.into()).unwrap_err();
        assert!(matches!(err, Error::UnknownPlaceholder { .. }));
        assert!(bindings.ensure_complete("ctx").is_err());
    }

    #[test]
    fn test_bindings_retain() {
        let parsed = ParsedExpr::parse("ctx", "a = :x and b = :y".to_string()).unwrap();
        let mut bindings = Bindings::default();
        bindings.register(&parsed);
        bindings.bind("ctx", "x", 1.into()).unwrap();

        bindings.retain(&["y".to_string()]);
        assert_eq!(bindings.referenced(), &["y".to_string()]);
        assert_eq!(bindings.get("x"), None);
        assert!(matches!(
            bindings.bind("ctx", "x", 1.into()),
            Err(Error::UnknownPlaceholder { .. })
        ));
    }

    #[test]
    fn test_tuple_columns() {
        let cols = ("a", "b", "c", "d", "e", "f").into_columns("ctx").unwrap();
        assert_eq!(cols, vec!["a", "b", "c", "d", "e", "f"]);
        let cols = ("a", String::from("b")).into_columns("ctx").unwrap();
        assert_eq!(cols, vec!["a", "b"]);
    }

    #[test]
    fn test_push_value_groups_expressions() {
        let bindings = Bindings::default();
        let mut sql = String::new();
        let mut params = Vec::new();
        push_value("ctx", &Value::from(crate::expr("1, 2")), &bindings, &mut sql, &mut params).unwrap();
        sql.push_str(", ");
        push_value("ctx", &Value::from("x"), &bindings, &mut sql, &mut params).unwrap();
        assert_eq!(sql, "(1, 2), ?");
        assert_eq!(params, vec![Value::from("x")]);
    }

    #[test]
    fn test_table_ref_quoting() {
        assert_eq!(TableRef::new("test", "table1").to_sql(), "`test`.`table1`");
        assert_eq!(TableRef::new("", "we`ird").to_sql(), "`we``ird`");
    }
}
