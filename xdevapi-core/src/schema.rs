//! Schema and table handles, the factories for table statements

use crate::builder::common::{IntoColumns, TableRef};
use crate::builder::insert::IntoInsertDocument;
use crate::executor::{run, CompiledStatement, Session, StatementKind};
use crate::result::RowResult;
use crate::{Error, Result, TableDelete, TableInsert, TableSelect, TableUpdate, Value};

async fn query<S: Session>(session: &S, sql: String, params: Vec<Value>) -> Result<RowResult> {
    let statement = CompiledStatement::new(StatementKind::Select, sql, params);
    Ok(run(session, &statement).await?.into_row_result())
}

/// Read a single unsigned count from the first column of the first row
fn first_count(mut rows: RowResult, what: &str) -> Result<u64> {
    rows.fetch_one()
        .and_then(|row| row.get(0).and_then(Value::as_u64))
        .ok_or_else(|| Error::decode(what, "expected a non-negative count"))
}

/// A database schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a table handle without checking that it exists
    pub fn get_table(&self, name: impl Into<String>) -> Table {
        Table {
            table: TableRef::new(self.name.clone(), name),
            is_view: false,
        }
    }

    /// Get a table handle, failing with `TableNotFound` if the server has no such table
    pub async fn get_table_checked<S: Session>(&self, session: &S, name: &str) -> Result<Table> {
        let mut rows = query(
            session,
            "SELECT TABLE_TYPE FROM information_schema.tables WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?"
                .to_string(),
            vec![Value::from(self.name.as_str()), Value::from(name)],
        )
        .await?;
        let row = rows
            .fetch_one()
            .ok_or_else(|| Error::table_not_found(&self.name, name))?;
        let is_view = row.get(0).and_then(Value::as_str) == Some("VIEW");
        Ok(Table {
            table: TableRef::new(self.name.clone(), name),
            is_view,
        })
    }

    /// Every table and view of the schema, ordered by name
    pub async fn get_tables<S: Session>(&self, session: &S) -> Result<Vec<Table>> {
        let rows = query(
            session,
            "SELECT TABLE_NAME, TABLE_TYPE FROM information_schema.tables WHERE TABLE_SCHEMA = ? ORDER BY TABLE_NAME"
                .to_string(),
            vec![Value::from(self.name.as_str())],
        )
        .await?;
        rows.map(|row| {
            let name = row
                .get(0)
                .and_then(Value::as_str)
                .ok_or_else(|| Error::decode("TABLE_NAME", "expected a string"))?;
            Ok(Table {
                table: TableRef::new(self.name.clone(), name),
                is_view: row.get(1).and_then(Value::as_str) == Some("VIEW"),
            })
        })
        .collect()
    }

    pub async fn exists_in_database<S: Session>(&self, session: &S) -> Result<bool> {
        let rows = query(
            session,
            "SELECT COUNT(*) FROM information_schema.schemata WHERE SCHEMA_NAME = ?".to_string(),
            vec![Value::from(self.name.as_str())],
        )
        .await?;
        Ok(first_count(rows, "COUNT(*)")? > 0)
    }
}

/// A table or view in a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    table: TableRef,
    is_view: bool,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.table.name
    }

    pub fn schema_name(&self) -> &str {
        &self.table.schema
    }

    /// True when the handle was looked up on the server and is a view
    pub fn is_view(&self) -> bool {
        self.is_view
    }

    /// Start a select statement over the given columns or expressions
    pub fn select<C: IntoColumns>(&self, columns: C) -> Result<TableSelect> {
        TableSelect::new(self.table.clone(), columns)
    }

    /// Start a select statement over every column
    pub fn select_all(&self) -> TableSelect {
        TableSelect::all(self.table.clone())
    }

    /// Start an insert whose rows cover every column of the table
    pub fn insert(&self) -> TableInsert {
        TableInsert::new(self.table.clone())
    }

    /// Start an insert into the given columns
    pub fn insert_columns<C: IntoColumns>(&self, columns: C) -> Result<TableInsert> {
        TableInsert::with_columns(self.table.clone(), columns)
    }

    /// Insert a single row given as column/value pairs
    pub fn insert_document<D: IntoInsertDocument>(&self, document: D) -> Result<TableInsert> {
        TableInsert::with_document(self.table.clone(), document)
    }

    pub fn update(&self) -> TableUpdate {
        TableUpdate::new(self.table.clone())
    }

    pub fn delete(&self) -> TableDelete {
        TableDelete::new(self.table.clone())
    }

    /// Number of rows in the table
    pub async fn count<S: Session>(&self, session: &S) -> Result<u64> {
        let rows = query(
            session,
            format!("SELECT COUNT(*) FROM {}", self.table.to_sql()),
            Vec::new(),
        )
        .await?;
        first_count(rows, "COUNT(*)")
    }

    pub async fn exists_in_database<S: Session>(&self, session: &S) -> Result<bool> {
        let rows = query(
            session,
            "SELECT COUNT(*) FROM information_schema.tables WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?"
                .to_string(),
            vec![
                Value::from(self.table.schema.as_str()),
                Value::from(self.table.name.as_str()),
            ],
        )
        .await?;
        Ok(first_count(rows, "COUNT(*)")? > 0)
    }

    /// Quoted, schema-qualified name
    pub fn qualified_name(&self) -> String {
        self.table.to_sql()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ServerReply;
    use crate::result::Column;
    use std::sync::Mutex;

    // Replies with a fixed result set and records the SQL it saw
    struct ScriptedSession {
        rows: Vec<Vec<Value>>,
        seen: Mutex<Vec<CompiledStatement>>,
    }

    impl ScriptedSession {
        fn new(rows: Vec<Vec<Value>>) -> Self {
            Self {
                rows,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Session for ScriptedSession {
        async fn execute(&self, statement: &CompiledStatement) -> Result<ServerReply> {
            self.seen.lock().unwrap().push(statement.clone());
            Ok(ServerReply::Rows {
                columns: vec![Column::new("c0", "VARCHAR"), Column::new("c1", "VARCHAR")],
                rows: self.rows.clone(),
            })
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }

        fn current_schema(&self) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_table_factories() {
        let table = Schema::new("test").get_table("people");
        assert_eq!(table.name(), "people");
        assert_eq!(table.schema_name(), "test");
        assert!(!table.is_view());
        assert_eq!(table.qualified_name(), "`test`.`people`");
        assert!(table.select(Vec::<String>::new()).is_err());
        assert!(table.insert_columns(["a"]).is_ok());
    }

    #[tokio::test]
    async fn test_count() {
        let session = ScriptedSession::new(vec![vec![Value::I64(5)]]);
        let table = Schema::new("test").get_table("people");
        assert_eq!(table.count(&session).await.unwrap(), 5);
        assert_eq!(
            session.seen.lock().unwrap()[0].sql,
            "SELECT COUNT(*) FROM `test`.`people`"
        );
    }

    #[tokio::test]
    async fn test_get_table_checked() {
        let session = ScriptedSession::new(vec![vec![Value::from("VIEW")]]);
        let table = Schema::new("test").get_table_checked(&session, "v").await.unwrap();
        assert!(table.is_view());

        let session = ScriptedSession::new(Vec::new());
        let err = Schema::new("test")
            .get_table_checked(&session, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TableNotFound { .. }));
    }

    #[tokio::test]
    async fn test_exists_in_database() {
        let session = ScriptedSession::new(vec![vec![Value::I64(0)]]);
        let table = Schema::new("test").get_table("people");
        assert!(!table.exists_in_database(&session).await.unwrap());

        let session = ScriptedSession::new(vec![vec![Value::I64(1)]]);
        assert!(Schema::new("test").exists_in_database(&session).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_tables() {
        let session = ScriptedSession::new(vec![
            vec![Value::from("people"), Value::from("BASE TABLE")],
            vec![Value::from("adults"), Value::from("VIEW")],
        ]);
        let tables = Schema::new("test").get_tables(&session).await.unwrap();
        assert_eq!(tables.len(), 2);
        assert!(!tables[0].is_view());
        assert!(tables[1].is_view());
        assert_eq!(tables[1].name(), "adults");
    }
}
