use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, warn};

use super::{
    BatchStatement, ColumnHeader, ColumnSchema, Driver, ForeignKeyRef, QueryStat, ResultSet,
    TableRef, TableSchema, Value,
};
use crate::error::DriverError;
use crate::sql::escape_sql_value;
use crate::util::format_pg_error;

pub type SharedClient = Arc<Mutex<Client>>;

/// PostgreSQL backend using the simple query protocol.
///
/// Values come back as text, so every cell is `Value::Text` or `Value::Null`.
pub struct PgDriver {
    client: SharedClient,
}

impl PgDriver {
    pub async fn connect(url: &str) -> Result<Self, DriverError> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(|e| DriverError::Connection(format_pg_error(&e)))?;

        // Drive the connection on the runtime and surface errors.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %format_pg_error(&e), "postgres connection lost");
            }
        });

        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
        }
    }

    pub fn client(&self) -> SharedClient {
        self.client.clone()
    }
}

impl Driver for PgDriver {
    async fn query(&self, sql: &str) -> Result<ResultSet, DriverError> {
        debug!(sql, "postgres query");
        let started = Instant::now();
        let guard = self.client.lock().await;
        let messages = guard.simple_query(sql).await?;
        drop(guard);
        Ok(collect_messages(messages, started))
    }

    async fn transaction(
        &self,
        statements: &[BatchStatement],
    ) -> Result<Vec<ResultSet>, DriverError> {
        debug!(count = statements.len(), "postgres transaction");
        let mut guard = self.client.lock().await;
        let tx = guard.transaction().await?;

        let mut results = Vec::with_capacity(statements.len());
        for (index, statement) in statements.iter().enumerate() {
            let started = Instant::now();
            // An early return drops `tx`, which rolls back.
            let messages = tx.simple_query(&statement.sql).await?;
            let result = collect_messages(messages, started);
            statement.check(index, &result)?;
            results.push(result);
        }

        tx.commit().await?;
        Ok(results)
    }

    async fn table_schema(&self, table: &TableRef) -> Result<TableSchema, DriverError> {
        let schema_expr = match &table.schema {
            Some(schema) => escape_sql_value(&Value::from(schema.as_str())),
            None => "current_schema()".to_string(),
        };
        let name = escape_sql_value(&Value::from(table.name.as_str()));

        let sql = format!(
            r#"
            SELECT
                c.column_name,
                c.data_type,
                c.is_generated,
                EXISTS (
                    SELECT 1
                    FROM information_schema.table_constraints tc
                    JOIN information_schema.key_column_usage k
                        ON tc.constraint_name = k.constraint_name
                        AND tc.table_schema = k.table_schema
                    WHERE tc.constraint_type = 'PRIMARY KEY'
                        AND tc.table_schema = c.table_schema
                        AND tc.table_name = c.table_name
                        AND k.column_name = c.column_name
                ) AS is_pk,
                fk.table_name AS fk_table,
                fk.column_name AS fk_column
            FROM information_schema.columns c
            LEFT JOIN LATERAL (
                SELECT ccu.table_name, ccu.column_name
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage k
                    ON tc.constraint_name = k.constraint_name
                    AND tc.table_schema = k.table_schema
                JOIN information_schema.constraint_column_usage ccu
                    ON ccu.constraint_name = tc.constraint_name
                    AND ccu.constraint_schema = tc.table_schema
                WHERE tc.constraint_type = 'FOREIGN KEY'
                    AND tc.table_schema = c.table_schema
                    AND tc.table_name = c.table_name
                    AND k.column_name = c.column_name
                LIMIT 1
            ) fk ON true
            WHERE c.table_schema = {schema_expr} AND c.table_name = {name}
            ORDER BY c.ordinal_position
            "#
        );

        let guard = self.client.lock().await;
        let messages = guard.simple_query(&sql).await?;
        drop(guard);

        let mut columns = Vec::new();
        for msg in messages {
            if let SimpleQueryMessage::Row(row) = msg {
                let foreign_key = match (row.get(4), row.get(5)) {
                    (Some(t), Some(c)) => Some(ForeignKeyRef {
                        table: t.to_string(),
                        column: c.to_string(),
                    }),
                    _ => None,
                };
                columns.push(ColumnSchema {
                    name: row.get(0).unwrap_or("").to_string(),
                    data_type: row.get(1).unwrap_or("").to_string(),
                    is_generated: row.get(2) == Some("ALWAYS"),
                    is_primary_key: row.get(3) == Some("t"),
                    foreign_key,
                });
            }
        }

        Ok(TableSchema {
            table: Some(table.clone()),
            columns,
        })
    }

    fn supports_returning(&self) -> bool {
        true
    }
}

/// Fold simple-query messages into the last result that produced columns,
/// or the last command's status when none did.
fn collect_messages(messages: Vec<SimpleQueryMessage>, started: Instant) -> ResultSet {
    let mut current_headers: Option<Vec<ColumnHeader>> = None;
    let mut current_rows: Vec<Vec<Value>> = Vec::new();
    let mut result = ResultSet::default();
    let mut rows_affected = 0u64;

    for msg in messages {
        match msg {
            SimpleQueryMessage::RowDescription(columns) => {
                current_headers = Some(
                    columns
                        .iter()
                        .map(|c| ColumnHeader::new(c.name(), ""))
                        .collect(),
                );
            }
            SimpleQueryMessage::Row(row) => {
                if current_headers.is_none() {
                    current_headers = Some(
                        row.columns()
                            .iter()
                            .map(|c| ColumnHeader::new(c.name(), ""))
                            .collect(),
                    );
                }
                let values = (0..row.len())
                    .map(|i| row.get(i).map(Value::from).unwrap_or(Value::Null))
                    .collect();
                current_rows.push(values);
            }
            SimpleQueryMessage::CommandComplete(n) => {
                rows_affected = n;
                if let Some(headers) = current_headers.take() {
                    result.headers = headers;
                    result.rows = std::mem::take(&mut current_rows);
                } else {
                    current_rows.clear();
                }
            }
            _ => {}
        }
    }

    if let Some(headers) = current_headers.take() {
        result.headers = headers;
        result.rows = current_rows;
    }

    let rows_read = result.rows.len() as u64;
    let rows_written = if result.headers.is_empty() {
        rows_affected
    } else {
        0
    };
    result.stat = Some(QueryStat {
        query_duration_ms: Some(started.elapsed().as_millis() as u64),
        rows_read,
        rows_written,
        rows_affected,
    });
    result
}
