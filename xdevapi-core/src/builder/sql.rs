//! Raw SQL statements with positional `?` parameters

use std::future::Future;

use super::common::{Operation, QueryBuilder};
use crate::executor::{run, CompiledStatement, Session, StatementKind};
use crate::expr::count_positional_markers;
use crate::result::SqlResult;
use crate::{Error, Result, Value};

const CONTEXT: &str = "SqlStatement.execute";

/// A raw SQL statement, bound positionally and executable any number of times
///
/// # Examples
/// ```
/// use xdevapi_core::{QueryBuilder, SqlStatement};
///
/// let stmt = SqlStatement::new("SELECT * FROM test.people WHERE age > ?").bind(13);
/// assert_eq!(stmt.compile().unwrap().params.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SqlStatement {
    sql: String,
    params: Vec<Value>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append a value for the next `?` marker
    pub fn bind<V: Into<Value>>(mut self, value: V) -> Self {
        self.params.push(value.into());
        self
    }

    /// Append a value for every remaining `?` marker, in order
    pub fn bind_all<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.params.extend(values.into_iter().map(Into::into));
        self
    }

    /// Forget the bound values so the statement can be bound again
    pub fn clear_bindings(&mut self) {
        self.params.clear();
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Run the statement, returning rows or an affected item count
    pub fn execute<'a, S: Session>(
        &'a self,
        session: &'a S,
    ) -> impl Future<Output = Result<SqlResult>> + Send + 'a {
        async move {
            let statement = self.compile()?;
            let reply = run(session, &statement).await?;
            Ok(reply.into_sql_result())
        }
    }
}

impl QueryBuilder for SqlStatement {
    fn compile(&self) -> Result<CompiledStatement> {
        if self.sql.trim().is_empty() {
            return Err(Error::invalid_argument(CONTEXT, "SQL can not be empty"));
        }
        let markers = count_positional_markers(CONTEXT, &self.sql)?;
        if markers != self.params.len() {
            return Err(Error::invalid_argument(
                CONTEXT,
                format!(
                    "Statement has {} placeholders but {} values were bound",
                    markers,
                    self.params.len()
                ),
            ));
        }
        if self.params.iter().any(|p| matches!(p, Value::Expr(_))) {
            return Err(Error::invalid_argument(
                CONTEXT,
                "Expressions can not be bound to raw SQL placeholders",
            ));
        }
        Ok(CompiledStatement::new(
            StatementKind::Sql,
            self.sql.clone(),
            self.params.clone(),
        ))
    }

    fn valid_operations(&self) -> &'static [Operation] {
        &[Operation::Bind, Operation::Execute]
    }
}
