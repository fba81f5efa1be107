use std::path::Path;
use std::time::Instant;

use tokio_rusqlite::rusqlite::types::ValueRef;
use tokio_rusqlite::rusqlite::Connection as RawConnection;
use tokio_rusqlite::Connection;
use tracing::debug;

use super::{
    BatchStatement, ColumnHeader, ColumnSchema, Driver, ForeignKeyRef, QueryStat, ResultSet,
    TableRef, TableSchema, Value,
};
use crate::error::DriverError;
use crate::sql::quote_identifier;

/// SQLite backend running on `tokio-rusqlite`'s background thread.
pub struct SqliteDriver {
    conn: Connection,
}

impl SqliteDriver {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)
            .await
            .map_err(|e| DriverError::Connection(format!("{}: {}", path.display(), e)))?;
        Ok(Self { conn })
    }

    pub async fn open_in_memory() -> Result<Self, DriverError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }
}

impl Driver for SqliteDriver {
    async fn query(&self, sql: &str) -> Result<ResultSet, DriverError> {
        debug!(sql, "sqlite query");
        let sql = sql.to_string();
        self.conn
            .call_unwrap(move |conn| run_statement(conn, &sql))
            .await
    }

    async fn transaction(
        &self,
        statements: &[BatchStatement],
    ) -> Result<Vec<ResultSet>, DriverError> {
        debug!(count = statements.len(), "sqlite transaction");
        let statements = statements.to_vec();
        self.conn
            .call_unwrap(move |conn| -> Result<Vec<ResultSet>, DriverError> {
                // Dropping `tx` without commit rolls everything back.
                let tx = conn.transaction()?;
                let mut results = Vec::with_capacity(statements.len());
                for (index, statement) in statements.iter().enumerate() {
                    let result = run_statement(&tx, &statement.sql)?;
                    statement.check(index, &result)?;
                    results.push(result);
                }
                tx.commit()?;
                Ok(results)
            })
            .await
    }

    async fn table_schema(&self, table: &TableRef) -> Result<TableSchema, DriverError> {
        let table = table.clone();
        self.conn
            .call_unwrap(move |conn| -> Result<TableSchema, DriverError> {
                let pragma = |name: &str| match &table.schema {
                    Some(schema) => format!(
                        "PRAGMA {}.{}({})",
                        quote_identifier(schema),
                        name,
                        quote_identifier(&table.name)
                    ),
                    None => format!("PRAGMA {}({})", name, quote_identifier(&table.name)),
                };

                let mut columns: Vec<ColumnSchema> = Vec::new();
                {
                    let mut stmt = conn.prepare(&pragma("table_xinfo"))?;
                    let mut rows = stmt.query([])?;
                    while let Some(row) = rows.next()? {
                        let name: String = row.get(1)?;
                        let data_type: Option<String> = row.get(2)?;
                        let pk: i64 = row.get(5)?;
                        let hidden: i64 = row.get(6)?;
                        // 1 = hidden column of a virtual table, 2/3 = generated.
                        if hidden == 1 {
                            continue;
                        }
                        columns.push(ColumnSchema {
                            name,
                            data_type: data_type.unwrap_or_default(),
                            is_primary_key: pk > 0,
                            foreign_key: None,
                            is_generated: hidden == 2 || hidden == 3,
                        });
                    }
                }

                {
                    let mut stmt = conn.prepare(&pragma("foreign_key_list"))?;
                    let mut rows = stmt.query([])?;
                    while let Some(row) = rows.next()? {
                        let ref_table: String = row.get(2)?;
                        let from: String = row.get(3)?;
                        let to: Option<String> = row.get(4)?;
                        if let Some(col) = columns.iter_mut().find(|c| c.name == from) {
                            col.foreign_key = Some(ForeignKeyRef {
                                table: ref_table,
                                column: to.unwrap_or_default(),
                            });
                        }
                    }
                }

                Ok(TableSchema {
                    table: Some(table),
                    columns,
                })
            })
            .await
    }

    fn supports_returning(&self) -> bool {
        true
    }
}

fn run_statement(conn: &RawConnection, sql: &str) -> Result<ResultSet, DriverError> {
    let started = Instant::now();
    let mut stmt = conn.prepare(sql)?;

    let headers: Vec<ColumnHeader> = stmt
        .columns()
        .iter()
        .map(|c| ColumnHeader::new(c.name(), c.decl_type().unwrap_or("")))
        .collect();
    let column_count = headers.len();
    let readonly = stmt.readonly();

    let mut out_rows = Vec::new();
    {
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut out_row = Vec::with_capacity(column_count);
            for i in 0..column_count {
                out_row.push(value_from_ref(row.get_ref(i)?));
            }
            out_rows.push(out_row);
        }
    }

    let rows_affected = if readonly { 0 } else { conn.changes() as u64 };

    Ok(ResultSet {
        headers,
        stat: Some(QueryStat {
            query_duration_ms: Some(started.elapsed().as_millis() as u64),
            rows_read: out_rows.len() as u64,
            rows_written: rows_affected,
            rows_affected,
        }),
        rows: out_rows,
    })
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn driver_with_people() -> SqliteDriver {
        let driver = SqliteDriver::open_in_memory().await.unwrap();
        driver
            .query("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, score REAL)")
            .await
            .unwrap();
        driver
            .query("INSERT INTO people (id, name, score) VALUES (1, 'Ada', 9.5), (2, 'Linus', NULL)")
            .await
            .unwrap();
        driver
    }

    #[tokio::test]
    async fn test_query_headers_and_values() {
        let driver = driver_with_people().await;
        let result = driver
            .query("SELECT id, name, score FROM people ORDER BY id")
            .await
            .unwrap();

        assert_eq!(result.headers[0], ColumnHeader::new("id", "INTEGER"));
        assert_eq!(result.headers[1], ColumnHeader::new("name", "TEXT"));
        assert_eq!(result.rows.len(), 2);
        assert_eq!(
            result.rows[0],
            vec![Value::Integer(1), Value::from("Ada"), Value::Real(9.5)]
        );
        assert_eq!(result.rows[1][2], Value::Null);
        assert_eq!(result.stat.unwrap().rows_read, 2);
    }

    #[tokio::test]
    async fn test_dml_reports_rows_affected() {
        let driver = driver_with_people().await;
        let result = driver
            .query("UPDATE people SET score = 1.0")
            .await
            .unwrap();
        assert!(result.headers.is_empty());
        assert_eq!(result.stat.unwrap().rows_affected, 2);
    }

    #[tokio::test]
    async fn test_query_error_is_reported() {
        let driver = SqliteDriver::open_in_memory().await.unwrap();
        let err = driver.query("SELECT * FROM missing_table").await.unwrap_err();
        assert!(err.to_string().contains("missing_table"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_failure() {
        let driver = driver_with_people().await;
        let result = driver
            .transaction(&[
                "UPDATE people SET name = 'Grace' WHERE id = 1".into(),
                "INSERT INTO nope VALUES (1)".into(),
            ])
            .await;
        assert!(result.is_err());

        let check = driver
            .query("SELECT name FROM people WHERE id = 1")
            .await
            .unwrap();
        assert_eq!(check.rows[0][0], Value::from("Ada"));
    }

    #[tokio::test]
    async fn test_transaction_returning_rows() {
        let driver = driver_with_people().await;
        let results = driver
            .transaction(&[
                "INSERT INTO people (name) VALUES ('Grace') RETURNING *".into(),
                BatchStatement::affecting_rows("DELETE FROM people WHERE id = 2"),
            ])
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rows[0][0], Value::Integer(3));
        assert_eq!(results[0].rows[0][1], Value::from("Grace"));
        assert_eq!(results[1].stat.as_ref().unwrap().rows_affected, 1);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_when_row_is_missing() {
        let driver = driver_with_people().await;
        let err = driver
            .transaction(&[
                BatchStatement::affecting_rows("UPDATE people SET name = 'Grace' WHERE id = 1"),
                BatchStatement::affecting_rows(
                    "UPDATE people SET name = 'Ghost' WHERE id = 9 RETURNING *",
                ),
            ])
            .await
            .unwrap_err();
        assert!(
            matches!(err, DriverError::NoRowsAffected { index: 1, .. }),
            "got: {:?}",
            err
        );

        let check = driver
            .query("SELECT name FROM people WHERE id = 1")
            .await
            .unwrap();
        assert_eq!(check.rows[0][0], Value::from("Ada"));

        // Without the flag an empty match is fine.
        let results = driver
            .transaction(&["DELETE FROM people WHERE id = 9".into()])
            .await
            .unwrap();
        assert_eq!(results[0].stat.as_ref().unwrap().rows_affected, 0);
    }

    #[tokio::test]
    async fn test_table_schema_flags() {
        let driver = SqliteDriver::open_in_memory().await.unwrap();
        driver
            .query("CREATE TABLE teams (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        driver
            .query(
                "CREATE TABLE members (id INTEGER PRIMARY KEY, team_id INTEGER REFERENCES teams(id), \
                 age INTEGER, age2 INTEGER GENERATED ALWAYS AS (age * 2) VIRTUAL)",
            )
            .await
            .unwrap();

        let schema = driver.table_schema(&TableRef::new("members")).await.unwrap();
        assert_eq!(schema.primary_key(), vec!["id"]);

        let team = schema.column("team_id").unwrap();
        assert_eq!(
            team.foreign_key,
            Some(ForeignKeyRef {
                table: "teams".to_string(),
                column: "id".to_string()
            })
        );
        assert!(schema.column("age2").unwrap().is_generated);
        assert!(!schema.column("age").unwrap().is_generated);
    }
}
