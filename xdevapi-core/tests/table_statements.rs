//! End-to-end statement flows against a scripted session

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio_test::{assert_err, assert_ok};
use xdevapi_core::{
    expr, sql, Column, CompiledStatement, Error, ExecutableModification, ExecutableQuery,
    LockContention, Operation, QueryBuilder, Result, Schema, ServerReply, Session, SqlResult,
    StatementKind, Table, Value,
};

/// Session that answers with queued replies and records every statement
struct ScriptedSession {
    replies: Mutex<VecDeque<Result<ServerReply>>>,
    seen: Mutex<Vec<CompiledStatement>>,
}

impl ScriptedSession {
    fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn reply(self, reply: Result<ServerReply>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    fn statements(&self) -> Vec<CompiledStatement> {
        self.seen.lock().unwrap().clone()
    }
}

impl Session for ScriptedSession {
    async fn execute(&self, statement: &CompiledStatement) -> Result<ServerReply> {
        self.seen.lock().unwrap().push(statement.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ServerReply::Ok {
                affected_items: 0,
                last_insert_id: None,
            }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }

    fn current_schema(&self) -> Option<String> {
        Some("test".to_string())
    }
}

fn people() -> Table {
    Schema::new("test").get_table("people")
}

fn people_rows() -> ServerReply {
    ServerReply::Rows {
        columns: vec![
            Column::new("name", "VARCHAR"),
            Column::new("age", "INT"),
            Column::new("like", "VARCHAR"),
        ],
        rows: vec![
            vec![Value::from("jack"), Value::from(17), Value::from("data")],
            vec![Value::from("adam"), Value::from(15), Value::Null],
        ],
    }
}

#[tokio::test]
async fn test_select_round_trip() {
    let session = ScriptedSession::new().reply(Ok(people_rows()));
    let mut select = people()
        .select(["name", "age", "`like`"])
        .unwrap()
        .where_("age > :years")
        .unwrap()
        .order_by("age desc")
        .unwrap()
        .bind("years", 13)
        .unwrap();

    let mut result = assert_ok!(select.execute(&session).await);
    assert_eq!(result.column_names(), vec!["name", "age", "like"]);

    let first = result.fetch_one().unwrap();
    assert_eq!(first.get_field("like").unwrap(), &Value::from("data"));
    let rest = result.fetch_all();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].get(2), Some(&Value::Null));
    assert!(result.fetch_one().is_none());

    let seen = session.statements();
    assert_eq!(
        seen[0].sql,
        "SELECT name, age, `like` FROM `test`.`people` WHERE age > ? ORDER BY age DESC"
    );
}

#[tokio::test]
async fn test_offset_accepted_group_by_rejected_after_limit() {
    let select = people()
        .select_all()
        .where_("age > 13")
        .unwrap()
        .group_by(["name"])
        .unwrap()
        .having("age > 10")
        .unwrap()
        .order_by(["age"])
        .unwrap()
        .limit(1)
        .unwrap();

    let err = assert_err!(select.clone().group_by(["name"]));
    assert!(matches!(err, Error::InvalidState { .. }));
    assert_ok!(select.offset(1));
}

#[tokio::test]
async fn test_insert_value_count_mismatch() {
    let session = ScriptedSession::new();
    let mut insert = people()
        .insert_columns(["name", "age", "gender"])
        .unwrap()
        .values(vec![5])
        .unwrap();

    let err = assert_err!(insert.execute(&session).await);
    assert!(matches!(err, Error::InvalidArgument { .. }));
    assert!(session.statements().is_empty());
}

#[tokio::test]
async fn test_update_missing_binding() {
    let session = ScriptedSession::new();
    let mut update = people()
        .update()
        .set("name", "jack")
        .unwrap()
        .where_("name = :data and age > :years")
        .unwrap()
        .bind("years", 13)
        .unwrap();

    let err = assert_err!(update.execute(&session).await);
    match err {
        Error::UnboundPlaceholders { names, .. } => assert_eq!(names, vec!["data".to_string()]),
        other => panic!("unexpected error: {other}"),
    }

    let mut update = update.bind("data", "adam").unwrap();
    assert_ok!(update.execute(&session).await);
    assert_eq!(
        session.statements()[0].params,
        vec![Value::from("jack"), Value::from("adam"), Value::I64(13)]
    );
}

#[tokio::test]
async fn test_insert_auto_increment() {
    let session = ScriptedSession::new().reply(Ok(ServerReply::Ok {
        affected_items: 2,
        last_insert_id: Some(41),
    }));
    let mut insert = people()
        .insert_columns(["name", "age"])
        .unwrap()
        .values(("jack", 17))
        .unwrap()
        .values(("adam", 15))
        .unwrap();

    let result = assert_ok!(insert.execute(&session).await);
    assert_eq!(result.affected_items_count(), 2);
    assert_eq!(result.auto_increment_value(), Some(41));
    assert_eq!(insert.valid_operations(), &[Operation::Execute]);
}

#[tokio::test]
async fn test_nowait_lock_contention() {
    let session = ScriptedSession::new().reply(Err(Error::server(
        Some(3572),
        Some("HY000".to_string()),
        "Statement aborted because lock(s) could not be acquired immediately and NOWAIT is set.",
    )));
    let mut select = people()
        .select_all()
        .where_("name = :name")
        .unwrap()
        .lock_exclusive("NOWAIT")
        .unwrap()
        .bind("name", "jack")
        .unwrap();

    let err = assert_err!(select.execute(&session).await);
    assert!(err.is_lock_contention());
    assert_eq!(
        session.statements()[0].sql,
        "SELECT * FROM `test`.`people` WHERE name = ? FOR UPDATE NOWAIT"
    );
}

#[tokio::test]
async fn test_skip_locked_inside_transaction() {
    let session = ScriptedSession::new()
        .reply(Ok(ServerReply::Ok {
            affected_items: 0,
            last_insert_id: None,
        }))
        .reply(Ok(people_rows()));

    assert_ok!(session.start_transaction().await);
    let mut select = people()
        .select_all()
        .lock_shared(LockContention::SkipLocked)
        .unwrap();
    let rows = assert_ok!(select.execute(&session).await);
    assert!(rows.has_data());
    assert_ok!(session.commit().await);

    let kinds: Vec<StatementKind> = session.statements().iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![StatementKind::Control, StatementKind::Select, StatementKind::Control]
    );
    assert_eq!(
        session.statements()[1].sql,
        "SELECT * FROM `test`.`people` FOR SHARE SKIP LOCKED"
    );
}

#[tokio::test]
async fn test_delete_with_expression_binding() {
    let session = ScriptedSession::new().reply(Ok(ServerReply::Ok {
        affected_items: 3,
        last_insert_id: None,
    }));
    let mut delete = people()
        .delete()
        .where_("age < :limit")
        .unwrap()
        .bind("limit", expr("10 + 8"))
        .unwrap();

    let result = assert_ok!(delete.execute(&session).await);
    assert_eq!(result.affected_items_count(), 3);
    let seen = &session.statements()[0];
    assert_eq!(seen.sql, "DELETE FROM `test`.`people` WHERE age < (10 + 8)");
    assert!(seen.params.is_empty());
}

#[tokio::test]
async fn test_raw_sql() {
    let session = ScriptedSession::new().reply(Ok(people_rows()));
    let stmt = sql("SELECT * FROM test.people WHERE age > ?").bind(13);
    let result = assert_ok!(stmt.execute(&session).await);
    assert!(result.has_data());
    match result {
        SqlResult::Rows(mut rows) => assert_eq!(rows.fetch_all().len(), 2),
        SqlResult::Mutation(_) => panic!("expected rows"),
    }

    let err = assert_err!(sql("SELECT ?").execute(&session).await);
    assert!(matches!(err, Error::InvalidArgument { .. }));
}

#[tokio::test]
async fn test_rows_deserialize() {
    #[derive(serde::Deserialize)]
    struct Person {
        name: String,
        age: i64,
    }

    let session = ScriptedSession::new().reply(Ok(people_rows()));
    let mut select = people().select(["name", "age"]).unwrap();
    let mut result = assert_ok!(select.execute(&session).await);
    let people: Vec<Person> = assert_ok!(result.fetch_all_as());
    assert_eq!(people.len(), 2);
    assert_eq!(people[1].name, "adam");
    assert_eq!(people[1].age, 15);
}
