//! Error types for xdevapi

use thiserror::Error;

use crate::builder::common::Operation;

/// MySQL error raised by `NOWAIT` when a requested row is locked
pub const ER_LOCK_NOWAIT: u16 = 3572;

/// MySQL error raised when a blocking lock wait times out
pub const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;

/// MySQL error raised for statements the prepared protocol does not support
pub const ER_UNSUPPORTED_PS: u16 = 1295;

/// The main error type for xdevapi operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing clause argument
    #[error("{context}: {message}")]
    InvalidArgument { context: String, message: String },

    /// Clause called outside the set allowed by the statement's current stage
    #[error("{context}: operation '{operation}' is not available at this point, allowed: {}", format_operations(.allowed))]
    InvalidState {
        context: String,
        operation: Operation,
        allowed: Vec<Operation>,
    },

    /// `bind()` named a placeholder that no expression references
    #[error("{context}: Unable to bind value for unexisting placeholder: {name}")]
    UnknownPlaceholder { context: String, name: String },

    /// `execute()` found referenced placeholders without a value
    #[error("{context}: Missing value bindings for the following placeholders: {}", .names.join(", "))]
    UnboundPlaceholders { context: String, names: Vec<String> },

    /// The server rejected the statement
    #[error("Server error{}: {message}", .code.map(|c| format!(" {c}")).unwrap_or_default())]
    ServerExecution {
        code: Option<u16>,
        sql_state: Option<String>,
        message: String,
    },

    /// Database connection or driver error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Column not found in a row
    #[error("Column '{column}' not found")]
    ColumnNotFound { column: String },

    /// More than one column of a row carries the requested name
    #[error("Column name '{column}' is ambiguous, use positional access")]
    AmbiguousColumn { column: String },

    /// Table not found error
    #[error("Table '{table}' not found in schema '{schema}'")]
    TableNotFound { schema: String, table: String },

    /// The session was closed before the statement ran
    #[error("Session is closed")]
    SessionClosed,

    /// Invalid session configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A returned value could not be converted
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },
}

/// Convenience Result type for xdevapi operations
pub type Result<T> = std::result::Result<T, Error>;

fn format_operations(operations: &[Operation]) -> String {
    operations
        .iter()
        .map(|op| op.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Create a new invalid argument error
    pub fn invalid_argument(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid state error
    pub fn invalid_state(
        context: impl Into<String>,
        operation: Operation,
        allowed: &[Operation],
    ) -> Self {
        Self::InvalidState {
            context: context.into(),
            operation,
            allowed: allowed.to_vec(),
        }
    }

    /// Create a new unknown placeholder error
    pub fn unknown_placeholder(context: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownPlaceholder {
            context: context.into(),
            name: name.into(),
        }
    }

    /// Create a new unbound placeholders error
    pub fn unbound_placeholders(context: impl Into<String>, names: Vec<String>) -> Self {
        Self::UnboundPlaceholders {
            context: context.into(),
            names,
        }
    }

    /// Create a new server execution error
    pub fn server(code: Option<u16>, sql_state: Option<String>, message: impl Into<String>) -> Self {
        Self::ServerExecution {
            code,
            sql_state,
            message: message.into(),
        }
    }

    /// Create a new column not found error
    pub fn column_not_found(column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
        }
    }

    /// Create a new table not found error
    pub fn table_not_found(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self::TableNotFound {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new decode error
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Map a driver error, lifting MySQL server errors into `ServerExecution`
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => {
                let sql_state = db.code().map(|c| c.into_owned());
                #[cfg(feature = "mysql")]
                let code = db
                    .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .map(|e| e.number());
                #[cfg(not(feature = "mysql"))]
                let code = None;
                Self::server(code, sql_state, db.message())
            }
            other => Self::Database(other),
        }
    }

    /// MySQL error number of a server failure
    pub fn server_code(&self) -> Option<u16> {
        match self {
            Self::ServerExecution { code, .. } => *code,
            _ => None,
        }
    }

    /// True when the server refused or timed out on a row lock
    pub fn is_lock_contention(&self) -> bool {
        matches!(
            self,
            Self::ServerExecution {
                code: Some(ER_LOCK_NOWAIT | ER_LOCK_WAIT_TIMEOUT),
                ..
            }
        )
    }
}
