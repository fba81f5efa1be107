//! Error types shared across the crate.

use thiserror::Error;

/// The SQL grammar could not tokenize the input. No statement is run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at byte {offset}: {message}")]
pub struct ParseError {
    /// Byte offset in the source where the problem starts.
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// A single statement failed while the runner was executing a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("statement {order} failed: {message}")]
pub struct ExecutionError {
    /// 1-based position of the failing statement.
    pub order: usize,
    pub sql: String,
    pub message: String,
}

/// Errors reported by a [`Driver`](crate::driver::Driver) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("{0}")]
    Query(String),
    #[error("unsupported database url: {0}")]
    UnsupportedUrl(String),
    /// Batch statement `index` (0-based) matched no row.
    #[error("statement {index} changed no rows: {sql}")]
    NoRowsAffected { index: usize, sql: String },
}

impl From<tokio_rusqlite::rusqlite::Error> for DriverError {
    fn from(e: tokio_rusqlite::rusqlite::Error) -> Self {
        DriverError::Query(e.to_string())
    }
}

impl From<tokio_postgres::Error> for DriverError {
    fn from(e: tokio_postgres::Error) -> Self {
        DriverError::Query(crate::util::format_pg_error(&e))
    }
}

/// A changed row cannot be identified safely on the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("result has no columns to identify rows with")]
    NoColumns,
    #[error("row {row} has NULL in identifying column \"{column}\"")]
    NullIdentity { row: usize, column: String },
    #[error("row {row} only changes generated column \"{column}\"")]
    NothingWritable { row: usize, column: String },
}

/// Committing the grid's pending edits failed. The grid is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("commit rolled back: {0}")]
    Driver(#[from] DriverError),
    #[error("grid is read-only")]
    ReadOnly,
    /// The row was changed or deleted on the server since it was loaded.
    #[error("row {row} no longer matches a database row")]
    RowNotFound { row: usize },
}
