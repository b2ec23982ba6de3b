//! XDevAPI Core - fluent table statement builders for MySQL
//!
//! Statements are created from a [`Table`], accumulate clauses through a
//! chain of calls checked against a per-statement state machine, and run
//! against a [`Session`]. Named `:placeholders` in expressions are filled
//! with `bind` before `execute`.

pub mod builder;
pub mod config;
pub mod error;
pub mod executor;
pub mod expr;
pub mod lock;
pub mod result;
pub mod schema;
pub mod value;

// Re-export main types
pub use builder::{
    Bindings, IntoColumns, IntoInsertDocument, IntoValues, Operation, QueryBuilder,
    SortDirection, SqlStatement, TableDelete, TableInsert, TableSelect, TableUpdate,
};
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use executor::{
    CompiledStatement, ExecutableModification, ExecutableQuery, ServerReply, Session,
    StatementKind,
};
pub use expr::{expr, Expression, IntoExpression};
pub use lock::{IntoLockContention, LockContention, LockMode};
pub use result::{Column, ColumnType, MutationResult, Row, RowResult, SqlResult};
pub use schema::{Schema, Table};
pub use value::Value;

#[cfg(feature = "mysql")]
pub use executor::mysql::MySqlSession;

/// Create a raw SQL statement with positional `?` parameters
pub fn sql(text: impl Into<String>) -> SqlStatement {
    SqlStatement::new(text)
}
