//! Statement builder module

pub mod common;
pub mod delete;
pub mod insert;
pub mod select;
pub mod sql;
pub mod update;

// Re-export types from submodules
pub use common::{
    quote_identifier, Bindings, IntoColumns, Operation, OrderByClause, QueryBuilder,
    SortDirection, TableRef,
};
pub use delete::TableDelete;
pub use insert::{IntoInsertDocument, IntoValues, TableInsert};
pub use select::TableSelect;
pub use sql::SqlStatement;
pub use update::TableUpdate;
