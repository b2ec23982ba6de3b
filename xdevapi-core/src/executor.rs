//! Statement execution and the session interface

use std::fmt::{self, Display};
use std::future::Future;

use crate::result::{Column, MutationResult, RowResult, SqlResult};
use crate::{QueryBuilder, Result, Value};

#[cfg(feature = "mysql")]
pub mod mysql;

/// What a compiled statement does, used by sessions to pick a protocol path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// Raw SQL of unknown shape
    Sql,
    /// Transaction control, sent without parameters
    Control,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Sql => "sql",
            Self::Control => "control",
        }
    }
}

impl Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL text with `?` markers and the values for them, in order
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<Value>,
    pub kind: StatementKind,
}

impl CompiledStatement {
    pub fn new(kind: StatementKind, sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
            kind,
        }
    }

    /// A parameterless transaction control statement
    pub fn control(sql: impl Into<String>) -> Self {
        Self::new(StatementKind::Control, sql, Vec::new())
    }
}

/// What the server sent back for one statement
#[derive(Debug, Clone, PartialEq)]
pub enum ServerReply {
    Rows {
        columns: Vec<Column>,
        rows: Vec<Vec<Value>>,
    },
    Ok {
        affected_items: u64,
        last_insert_id: Option<u64>,
    },
}

impl ServerReply {
    pub(crate) fn into_row_result(self) -> RowResult {
        match self {
            Self::Rows { columns, rows } => RowResult::new(columns, rows),
            Self::Ok { .. } => RowResult::default(),
        }
    }

    pub(crate) fn into_mutation_result(self) -> MutationResult {
        match self {
            Self::Rows { .. } => MutationResult::default(),
            Self::Ok {
                affected_items,
                last_insert_id,
            } => MutationResult::new(affected_items, last_insert_id),
        }
    }

    pub(crate) fn into_sql_result(self) -> SqlResult {
        match self {
            rows @ Self::Rows { .. } => SqlResult::Rows(rows.into_row_result()),
            ok @ Self::Ok { .. } => SqlResult::Mutation(ok.into_mutation_result()),
        }
    }
}

/// A server session that runs compiled statements
///
/// Implementations serialize statements issued on one session, so the
/// transaction methods apply to every statement executed through it.
pub trait Session: Send + Sync {
    /// Run one statement and return the server's reply
    fn execute(
        &self,
        statement: &CompiledStatement,
    ) -> impl Future<Output = Result<ServerReply>> + Send;

    /// Close the session, later executions fail with `SessionClosed`
    fn close(&self) -> impl Future<Output = Result<()>> + Send;

    fn is_open(&self) -> bool;

    /// Default schema of the session, if one was selected
    fn current_schema(&self) -> Option<String>;

    fn start_transaction(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.execute(&CompiledStatement::control("START TRANSACTION"))
                .await
                .map(|_| ())
        }
    }

    fn commit(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.execute(&CompiledStatement::control("COMMIT"))
                .await
                .map(|_| ())
        }
    }

    fn rollback(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.execute(&CompiledStatement::control("ROLLBACK"))
                .await
                .map(|_| ())
        }
    }
}

/// Send a statement to the session with logging around it
pub(crate) async fn run<S: Session>(
    session: &S,
    statement: &CompiledStatement,
) -> Result<ServerReply> {
    tracing::debug!(
        target: "xdevapi.sql",
        kind = %statement.kind,
        params = statement.params.len(),
        sql = %statement.sql,
        "executing statement"
    );
    match session.execute(statement).await {
        Ok(reply) => Ok(reply),
        Err(err) => {
            tracing::warn!(
                target: "xdevapi.sql",
                kind = %statement.kind,
                error = %err,
                "statement failed"
            );
            Err(err)
        }
    }
}

/// Extension trait for statements that return rows
pub trait ExecutableQuery: QueryBuilder {
    /// Execute the statement and return its rows
    ///
    /// The statement stays usable: it can be re-bound and executed again.
    fn execute<S>(&mut self, session: &S) -> impl Future<Output = Result<RowResult>> + Send
    where
        S: Session;
}

/// Extension trait for modification statements (insert, update, delete)
pub trait ExecutableModification: QueryBuilder {
    /// Execute the statement and return the affected item count
    fn execute<S>(&mut self, session: &S) -> impl Future<Output = Result<MutationResult>> + Send
    where
        S: Session;
}

impl ExecutableQuery for crate::TableSelect {
    async fn execute<S>(&mut self, session: &S) -> Result<RowResult>
    where
        S: Session,
    {
        let statement = self.prepare_execute()?;
        let reply = run(session, &statement).await?;
        self.mark_executed();
        Ok(reply.into_row_result())
    }
}

impl ExecutableModification for crate::TableInsert {
    async fn execute<S>(&mut self, session: &S) -> Result<MutationResult>
    where
        S: Session,
    {
        let statement = self.prepare_execute()?;
        let reply = run(session, &statement).await?;
        self.mark_executed();
        Ok(reply.into_mutation_result())
    }
}

impl ExecutableModification for crate::TableUpdate {
    async fn execute<S>(&mut self, session: &S) -> Result<MutationResult>
    where
        S: Session,
    {
        let statement = self.prepare_execute()?;
        let reply = run(session, &statement).await?;
        self.mark_executed();
        Ok(reply.into_mutation_result())
    }
}

impl ExecutableModification for crate::TableDelete {
    async fn execute<S>(&mut self, session: &S) -> Result<MutationResult>
    where
        S: Session,
    {
        let statement = self.prepare_execute()?;
        let reply = run(session, &statement).await?;
        self.mark_executed();
        Ok(reply.into_mutation_result())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::common::Operation;
    use crate::{expr, Error, LockContention, Schema};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    // Mock session recording every statement it receives
    struct MockSession {
        should_fail: bool,
        open: AtomicBool,
        seen: Mutex<Vec<CompiledStatement>>,
    }

    impl MockSession {
        fn new() -> Self {
            Self {
                should_fail: false,
                open: AtomicBool::new(true),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn with_failure() -> Self {
            Self {
                should_fail: true,
                ..Self::new()
            }
        }

        fn last(&self) -> CompiledStatement {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }

        fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl Session for MockSession {
        async fn execute(&self, statement: &CompiledStatement) -> Result<ServerReply> {
            if !self.open.load(Ordering::SeqCst) {
                return Err(Error::SessionClosed);
            }
            self.seen.lock().unwrap().push(statement.clone());
            if self.should_fail {
                return Err(Error::server(Some(3572), Some("HY000".into()), "Mock lock failure"));
            }
            match statement.kind {
                StatementKind::Select => Ok(ServerReply::Rows {
                    columns: vec![Column::new("name", "VARCHAR"), Column::new("age", "INT")],
                    rows: vec![vec![Value::from("jack"), Value::from(17)]],
                }),
                _ => Ok(ServerReply::Ok {
                    affected_items: 1,
                    last_insert_id: Some(7),
                }),
            }
        }

        async fn close(&self) -> Result<()> {
            self.open.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn current_schema(&self) -> Option<String> {
            Some("test".to_string())
        }
    }

    fn table() -> crate::Table {
        Schema::new("test").get_table("table1")
    }

    #[tokio::test]
    async fn test_select_execute() {
        let session = MockSession::new();
        let mut select = table()
            .select(["name", "age"])
            .unwrap()
            .where_("age > :years")
            .unwrap()
            .bind("years", 13)
            .unwrap();

        let mut result = select.execute(&session).await.unwrap();
        let row = result.fetch_one().unwrap();
        assert_eq!(row.get_field("name").unwrap(), &Value::from("jack"));

        let seen = session.last();
        assert_eq!(seen.kind, StatementKind::Select);
        assert_eq!(seen.sql, "SELECT name, age FROM `test`.`table1` WHERE age > ?");
        assert_eq!(seen.params, vec![Value::I64(13)]);
    }

    #[tokio::test]
    async fn test_select_rebind_and_reexecute() {
        let session = MockSession::new();
        let mut select = table()
            .select_all()
            .where_("age > :years")
            .unwrap()
            .bind("years", 13)
            .unwrap();

        select.execute(&session).await.unwrap();
        assert_eq!(
            select.valid_operations(),
            &[Operation::Limit, Operation::Bind, Operation::Execute]
        );

        let mut select = select.bind("years", 15).unwrap();
        select.execute(&session).await.unwrap();
        assert_eq!(session.last().params, vec![Value::I64(15)]);
        assert_eq!(session.count(), 2);
    }

    #[tokio::test]
    async fn test_unbound_placeholder_is_not_sent() {
        let session = MockSession::new();
        let mut select = table()
            .select_all()
            .where_("name = :data and age > :years")
            .unwrap()
            .bind("years", 13)
            .unwrap();

        let err = select.execute(&session).await.unwrap_err();
        assert!(matches!(err, Error::UnboundPlaceholders { ref names, .. } if names == &vec!["data".to_string()]));
        assert_eq!(session.count(), 0);

        // Still bindable after the failure
        let mut select = select.bind("data", "adam").unwrap();
        assert!(select.execute(&session).await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_keeps_stage() {
        let session = MockSession::with_failure();
        let mut select = table()
            .select_all()
            .lock_exclusive(LockContention::NoWait)
            .unwrap();

        let err = select.execute(&session).await.unwrap_err();
        assert!(err.is_lock_contention());
        assert_eq!(select.valid_operations(), &[Operation::Bind, Operation::Execute]);
        assert!(session.last().sql.ends_with(" FOR UPDATE NOWAIT"));
    }

    #[tokio::test]
    async fn test_insert_execute() {
        let session = MockSession::new();
        let mut insert = table()
            .insert_columns(["name", "age"])
            .unwrap()
            .values(("jack", 17))
            .unwrap()
            .values(("adam", expr("10 + 5")))
            .unwrap();

        let result = insert.execute(&session).await.unwrap();
        assert_eq!(result.affected_items_count(), 1);
        assert_eq!(result.auto_increment_value(), Some(7));

        let seen = session.last();
        assert_eq!(
            seen.sql,
            "INSERT INTO `test`.`table1` (`name`, `age`) VALUES (?, ?), (?, (10 + 5))"
        );
        assert_eq!(
            seen.params,
            vec![Value::from("jack"), Value::I64(17), Value::from("adam")]
        );
    }

    #[tokio::test]
    async fn test_update_execute() {
        let session = MockSession::new();
        let mut update = table()
            .update()
            .set("age", expr("age + 1"))
            .unwrap()
            .where_("name = :data")
            .unwrap()
            .limit(1)
            .unwrap()
            .bind("data", "jack")
            .unwrap();

        update.execute(&session).await.unwrap();
        let seen = session.last();
        assert_eq!(seen.kind, StatementKind::Update);
        assert_eq!(
            seen.sql,
            "UPDATE `test`.`table1` SET `age` = (age + 1) WHERE name = ? LIMIT 1"
        );
    }

    #[tokio::test]
    async fn test_delete_execute() {
        let session = MockSession::new();
        let mut delete = table()
            .delete()
            .where_("age < :years")
            .unwrap()
            .order_by("age desc")
            .unwrap()
            .bind("years", 18)
            .unwrap();

        let result = delete.execute(&session).await.unwrap();
        assert_eq!(result.affected_items_count(), 1);
        assert_eq!(
            session.last().sql,
            "DELETE FROM `test`.`table1` WHERE age < ? ORDER BY age DESC"
        );
    }

    #[tokio::test]
    async fn test_transaction_statements() {
        let session = MockSession::new();
        session.start_transaction().await.unwrap();
        assert_eq!(session.last().sql, "START TRANSACTION");
        session.commit().await.unwrap();
        assert_eq!(session.last().sql, "COMMIT");
        session.rollback().await.unwrap();
        assert_eq!(session.last().kind, StatementKind::Control);
    }

    #[tokio::test]
    async fn test_closed_session() {
        let session = MockSession::new();
        session.close().await.unwrap();
        assert!(!session.is_open());

        let mut delete = table().delete();
        let err = delete.execute(&session).await.unwrap_err();
        assert!(matches!(err, Error::SessionClosed));
    }
}
