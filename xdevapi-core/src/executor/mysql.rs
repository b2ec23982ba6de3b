//! MySQL session over a single sqlx connection

use std::sync::atomic::{AtomicBool, Ordering};

use futures::TryStreamExt;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column as _, Connection, Executor, Row as _, Statement as _, TypeInfo as _, ValueRef as _};
use tokio::sync::Mutex;

use super::{CompiledStatement, ServerReply, Session, StatementKind};
use crate::config::SessionConfig;
use crate::error::ER_UNSUPPORTED_PS;
use crate::result::{Column, ColumnType};
use crate::{Error, Result, Value};

/// A `Session` backed by one MySQL connection
///
/// Statements issued through the same session run one at a time on the same
/// connection, so `start_transaction` / `commit` / `rollback` cover them.
pub struct MySqlSession {
    conn: Mutex<Option<MySqlConnection>>,
    open: AtomicBool,
    schema: Option<String>,
}

impl MySqlSession {
    /// Open a session with the given configuration
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let conn = MySqlConnection::connect_with(&config.to_connect_options())
            .await
            .map_err(Error::from_sqlx)?;
        tracing::info!(target: "xdevapi.session", uri = %config, "session opened");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            open: AtomicBool::new(true),
            schema: config.schema.clone(),
        })
    }

    /// Open a session from a `mysql://` or `mysqlx://` URI
    pub async fn connect_uri(uri: &str) -> Result<Self> {
        Self::connect(&SessionConfig::from_uri(uri)?).await
    }

    async fn run_statement(conn: &mut MySqlConnection, statement: &CompiledStatement) -> Result<ServerReply> {
        if statement.kind == StatementKind::Control {
            return run_text(conn, &statement.sql).await;
        }

        let columns = match describe(conn, &statement.sql).await {
            Ok(columns) => columns,
            Err(err) if falls_back_to_text(statement, &err) => {
                tracing::debug!(
                    target: "xdevapi.sql",
                    sql = %statement.sql,
                    "statement can not be prepared, using text protocol"
                );
                return run_text(conn, &statement.sql).await;
            }
            Err(err) => return Err(err),
        };
        if columns.is_empty() {
            let done = bind_values(sqlx::query(&statement.sql), &statement.params)
                .execute(&mut *conn)
                .await
                .map_err(Error::from_sqlx)?;
            let last_insert_id = Some(done.last_insert_id()).filter(|id| *id != 0);
            return Ok(ServerReply::Ok {
                affected_items: done.rows_affected(),
                last_insert_id,
            });
        }

        let mut rows = Vec::new();
        let mut stream = bind_values(sqlx::query(&statement.sql), &statement.params).fetch(&mut *conn);
        while let Some(row) = stream.try_next().await.map_err(Error::from_sqlx)? {
            rows.push(decode_row(&row, &columns)?);
        }
        Ok(ServerReply::Rows { columns, rows })
    }
}

impl Session for MySqlSession {
    async fn execute(&self, statement: &CompiledStatement) -> Result<ServerReply> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(Error::SessionClosed)?;
        Self::run_statement(conn, statement).await
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().await.take();
        self.open.store(false, Ordering::SeqCst);
        if let Some(conn) = conn {
            conn.close().await.map_err(Error::from_sqlx)?;
            tracing::info!(target: "xdevapi.session", "session closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn current_schema(&self) -> Option<String> {
        self.schema.clone()
    }
}

/// Run a statement over the text protocol, for statements that can not be prepared
async fn run_text(conn: &mut MySqlConnection, sql: &str) -> Result<ServerReply> {
    let done = (&mut *conn).execute(sql).await.map_err(Error::from_sqlx)?;
    let last_insert_id = Some(done.last_insert_id()).filter(|id| *id != 0);
    Ok(ServerReply::Ok {
        affected_items: done.rows_affected(),
        last_insert_id,
    })
}

/// Raw SQL without parameters such as `USE db` or `CREATE PROCEDURE`
/// is retried unprepared when the server rejects preparing it
fn falls_back_to_text(statement: &CompiledStatement, err: &Error) -> bool {
    statement.kind == StatementKind::Sql
        && statement.params.is_empty()
        && err.server_code() == Some(ER_UNSUPPORTED_PS)
}

/// Column metadata of a statement, empty when it returns no result set
async fn describe(conn: &mut MySqlConnection, sql: &str) -> Result<Vec<Column>> {
    let prepared = (&mut *conn).prepare(sql).await.map_err(Error::from_sqlx)?;
    Ok(prepared
        .columns()
        .iter()
        .map(|c| Column::new(c.name(), c.type_info().name()))
        .collect())
}

fn bind_values<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[Value],
) -> Query<'q, MySql, MySqlArguments> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::I64(i) => query.bind(*i),
            Value::U64(u) => query.bind(*u),
            Value::F32(f) => query.bind(*f),
            Value::F64(f) => query.bind(*f),
            Value::Decimal(d) => query.bind(d.clone()),
            Value::String(s) => query.bind(s.clone()),
            Value::Bytes(b) => query.bind(b.clone()),
            Value::Json(j) => query.bind(sqlx::types::Json(j.clone())),
            Value::Expr(e) => query.bind(e.data().to_string()),
        };
    }
    query
}

fn decode_row(row: &MySqlRow, columns: &[Column]) -> Result<Vec<Value>> {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| decode_value(row, i, column))
        .collect()
}

fn decode_value(row: &MySqlRow, index: usize, column: &Column) -> Result<Value> {
    let decode_err = |e: sqlx::Error| Error::decode(column.name(), e.to_string());

    if row.try_get_raw(index).map_err(decode_err)?.is_null() {
        return Ok(Value::Null);
    }

    // The runtime type of the row wins over the prepared metadata
    let type_name = row
        .columns()
        .get(index)
        .map_or_else(|| column.type_name().to_string(), |c| c.type_info().name().to_string());
    let value = match ColumnType::from_type_name(&type_name) {
        ColumnType::Bool => Value::Bool(row.try_get_unchecked::<bool, _>(index).map_err(decode_err)?),
        ColumnType::Integer => Value::I64(row.try_get_unchecked::<i64, _>(index).map_err(decode_err)?),
        ColumnType::UnsignedInteger => {
            Value::U64(row.try_get_unchecked::<u64, _>(index).map_err(decode_err)?)
        }
        ColumnType::Float => Value::F32(row.try_get_unchecked::<f32, _>(index).map_err(decode_err)?),
        ColumnType::Double => Value::F64(row.try_get_unchecked::<f64, _>(index).map_err(decode_err)?),
        ColumnType::Decimal => {
            Value::Decimal(row.try_get_unchecked::<String, _>(index).map_err(decode_err)?)
        }
        ColumnType::Json => {
            let json: sqlx::types::Json<serde_json::Value> =
                row.try_get_unchecked(index).map_err(decode_err)?;
            Value::Json(json.0)
        }
        ColumnType::Date => Value::from(
            row.try_get_unchecked::<chrono::NaiveDate, _>(index)
                .map_err(decode_err)?,
        ),
        ColumnType::Time => Value::from(
            row.try_get_unchecked::<chrono::NaiveTime, _>(index)
                .map_err(decode_err)?,
        ),
        ColumnType::DateTime => Value::from(
            row.try_get_unchecked::<chrono::NaiveDateTime, _>(index)
                .map_err(decode_err)?,
        ),
        ColumnType::Bytes | ColumnType::Bit => {
            Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index).map_err(decode_err)?)
        }
        ColumnType::String | ColumnType::Other => {
            Value::String(row.try_get_unchecked::<String, _>(index).map_err(decode_err)?)
        }
    };
    Ok(value)
}
