//! Database drivers consumed by the query runner and the commit engine.
//!
//! A [`Driver`] runs one statement at a time with [`Driver::query`] and an
//! all-or-nothing batch with [`Driver::transaction`]. Two backends ship with
//! the crate: SQLite through `tokio-rusqlite` and PostgreSQL through
//! `tokio-postgres`. [`AnyDriver`] picks one from a connection URL.

mod postgres;
mod sqlite;
mod value;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

pub use postgres::PgDriver;
pub use sqlite::SqliteDriver;
pub use value::{ColumnType, Value};

use crate::error::DriverError;
use crate::sql::quote_identifier;

/// Name and declared type of a result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnHeader {
    pub name: String,
    /// Declared type as reported by the backend (may be empty).
    pub data_type: String,
}

impl ColumnHeader {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Execution statistics for a single statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStat {
    pub query_duration_ms: Option<u64>,
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_affected: u64,
}

/// Tabular output of one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub headers: Vec<ColumnHeader>,
    pub rows: Vec<Vec<Value>>,
    pub stat: Option<QueryStat>,
}

impl ResultSet {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.name == name)
    }
}

/// One statement of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStatement {
    pub sql: String,
    /// Abort the batch when the statement changes no row.
    pub must_affect_rows: bool,
}

impl BatchStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            must_affect_rows: false,
        }
    }

    pub fn affecting_rows(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            must_affect_rows: true,
        }
    }

    /// Fails with [`DriverError::NoRowsAffected`] when this statement had
    /// to change a row and `result` reports none.
    pub(crate) fn check(&self, index: usize, result: &ResultSet) -> Result<(), DriverError> {
        let affected = result.stat.as_ref().map_or(0, |s| s.rows_affected);
        if self.must_affect_rows && affected == 0 {
            return Err(DriverError::NoRowsAffected {
                index,
                sql: self.sql.clone(),
            });
        }
        Ok(())
    }
}

impl From<&str> for BatchStatement {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for BatchStatement {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

/// A (possibly schema-qualified) table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Quoted, qualified name ready to splice into SQL.
    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(&self.name)),
            None => quote_identifier(&self.name),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Target of a foreign key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

/// Schema metadata for one column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub is_primary_key: bool,
    pub foreign_key: Option<ForeignKeyRef>,
    pub is_generated: bool,
}

/// Schema metadata for a table, used to annotate grid headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub table: Option<TableRef>,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// A database backend able to run single statements and atomic batches.
pub trait Driver: Send + Sync {
    /// Run a single statement.
    fn query(&self, sql: &str) -> impl Future<Output = Result<ResultSet, DriverError>> + Send;

    /// Run all statements in one transaction. Either every statement takes
    /// effect or none does. Returns one result set per statement.
    ///
    /// A statement flagged with `must_affect_rows` that changes nothing
    /// rolls the batch back with [`DriverError::NoRowsAffected`].
    fn transaction(
        &self,
        statements: &[BatchStatement],
    ) -> impl Future<Output = Result<Vec<ResultSet>, DriverError>> + Send;

    /// Column metadata for a table.
    fn table_schema(
        &self,
        table: &TableRef,
    ) -> impl Future<Output = Result<TableSchema, DriverError>> + Send;

    /// Whether `INSERT`/`UPDATE ... RETURNING *` is understood.
    fn supports_returning(&self) -> bool {
        false
    }
}

/// Driver selected at runtime from a connection URL.
pub enum AnyDriver {
    Sqlite(SqliteDriver),
    Postgres(PgDriver),
}

impl AnyDriver {
    /// Connect using a URL.
    ///
    /// `postgres://` and `postgresql://` URLs go to PostgreSQL. `sqlite:` URLs,
    /// `:memory:` and bare file paths go to SQLite.
    pub async fn connect(url: &str) -> Result<Self, DriverError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(AnyDriver::Postgres(PgDriver::connect(url).await?));
        }

        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);

        if path.contains("://") {
            return Err(DriverError::UnsupportedUrl(url.to_string()));
        }

        if path.is_empty() || path == ":memory:" {
            Ok(AnyDriver::Sqlite(SqliteDriver::open_in_memory().await?))
        } else {
            Ok(AnyDriver::Sqlite(SqliteDriver::open(path).await?))
        }
    }
}

impl Driver for AnyDriver {
    async fn query(&self, sql: &str) -> Result<ResultSet, DriverError> {
        match self {
            AnyDriver::Sqlite(d) => d.query(sql).await,
            AnyDriver::Postgres(d) => d.query(sql).await,
        }
    }

    async fn transaction(
        &self,
        statements: &[BatchStatement],
    ) -> Result<Vec<ResultSet>, DriverError> {
        match self {
            AnyDriver::Sqlite(d) => d.transaction(statements).await,
            AnyDriver::Postgres(d) => d.transaction(statements).await,
        }
    }

    async fn table_schema(&self, table: &TableRef) -> Result<TableSchema, DriverError> {
        match self {
            AnyDriver::Sqlite(d) => d.table_schema(table).await,
            AnyDriver::Postgres(d) => d.table_schema(table).await,
        }
    }

    fn supports_returning(&self) -> bool {
        match self {
            AnyDriver::Sqlite(d) => d.supports_returning(),
            AnyDriver::Postgres(d) => d.supports_returning(),
        }
    }
}
