//! Turns a grid's pending edits into one transaction and reconciles the
//! grid with what the server stored.

use tracing::{info, warn};

use crate::driver::{BatchStatement, Driver, ResultSet, TableRef, Value};
use crate::error::{CommitError, DriverError, ValidationError};
use crate::grid::{CanonicalRows, ChangeKind, ChangeToken, ChangedRow, GridHeader, ResultGrid};
use crate::sql::{escape_sql_value, quote_identifier};

/// One generated statement and the row it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStatement {
    pub token: ChangeToken,
    pub kind: ChangeKind,
    /// Grid row index at planning time.
    pub row: usize,
    pub sql: String,
}

/// Statements a commit would send, in row order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitPlan {
    pub statements: Vec<PlannedStatement>,
}

impl CommitPlan {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements.iter().map(|s| s.sql.clone()).collect()
    }

    /// Statements as a driver batch. Updates and deletes must each change a
    /// row, so a row edited or removed by someone else fails the commit.
    pub fn batch(&self) -> Vec<BatchStatement> {
        self.statements
            .iter()
            .map(|s| match s.kind {
                ChangeKind::Insert => BatchStatement::new(s.sql.clone()),
                ChangeKind::Update | ChangeKind::Delete => {
                    BatchStatement::affecting_rows(s.sql.clone())
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl CommitSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

pub struct CommitEngine<'d, D: Driver> {
    driver: &'d D,
}

impl<'d, D: Driver> CommitEngine<'d, D> {
    pub fn new(driver: &'d D) -> Self {
        Self { driver }
    }

    /// Build the statements for every changed row without running them.
    ///
    /// Rows are identified by their primary-key columns when the grid knows
    /// them. Otherwise every original column goes into the `WHERE` clause,
    /// which can match duplicate rows on tables without a key.
    pub fn plan(&self, grid: &ResultGrid, table: &TableRef) -> Result<CommitPlan, CommitError> {
        if grid.is_read_only() {
            return Err(CommitError::ReadOnly);
        }

        let changed = grid.get_changed_rows();
        if changed.is_empty() {
            return Ok(CommitPlan::default());
        }
        let headers = grid.headers();
        if headers.is_empty() {
            return Err(ValidationError::NoColumns.into());
        }

        let returning = self.driver.supports_returning();
        let target = table.qualified();
        let statements = changed
            .iter()
            .map(|row| -> Result<PlannedStatement, CommitError> {
                let sql = match row.kind {
                    ChangeKind::Insert => insert_sql(&target, headers, row),
                    ChangeKind::Update => format!(
                        "UPDATE {} SET {} WHERE {}",
                        target,
                        assignments(headers, row)?.join(", "),
                        identity(headers, row)?
                    ),
                    ChangeKind::Delete => {
                        format!("DELETE FROM {} WHERE {}", target, identity(headers, row)?)
                    }
                };
                let sql = if returning && row.kind != ChangeKind::Delete {
                    format!("{} RETURNING *", sql)
                } else {
                    sql
                };
                Ok(PlannedStatement {
                    token: row.token,
                    kind: row.kind,
                    row: row.index,
                    sql,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CommitPlan { statements })
    }

    /// Submit all pending edits as one transaction. On success the grid
    /// takes the server's returned values and loses its change state. On
    /// failure nothing is applied and the grid keeps every edit.
    pub async fn commit(
        &self,
        grid: &mut ResultGrid,
        table: &TableRef,
    ) -> Result<CommitSummary, CommitError> {
        let plan = self.plan(grid, table)?;
        if plan.is_empty() {
            return Ok(CommitSummary::default());
        }

        info!(table = %table, statements = plan.len(), "committing grid changes");
        let results = match self.driver.transaction(&plan.batch()).await {
            Ok(results) => results,
            Err(e) => {
                warn!(table = %table, error = %e, "commit rolled back");
                if let DriverError::NoRowsAffected { index, .. } = &e {
                    if let Some(planned) = plan.statements.get(*index) {
                        return Err(CommitError::RowNotFound { row: planned.row });
                    }
                }
                return Err(e.into());
            }
        };

        let mut summary = CommitSummary::default();
        let mut canonical = CanonicalRows::new();
        for (planned, result) in plan.statements.iter().zip(&results) {
            match planned.kind {
                ChangeKind::Insert => summary.inserted += 1,
                ChangeKind::Update => summary.updated += 1,
                ChangeKind::Delete => {
                    summary.deleted += 1;
                    continue;
                }
            }
            if let Some(values) = returned_row(result) {
                canonical.insert(planned.token, values);
            }
        }

        grid.apply_changes(&canonical);
        Ok(summary)
    }
}

/// Pending values that can be written: generated columns are skipped.
fn writable<'a>(
    headers: &'a [GridHeader],
    row: &'a ChangedRow,
) -> impl Iterator<Item = (&'a GridHeader, &'a Value)> {
    row.pending
        .iter()
        .filter_map(move |(&x, value)| headers.get(x).map(|h| (h, value)))
        .filter(|(h, _)| !h.is_generated)
}

fn insert_sql(target: &str, headers: &[GridHeader], row: &ChangedRow) -> String {
    let (columns, values): (Vec<String>, Vec<String>) = writable(headers, row)
        .map(|(h, v)| (quote_identifier(&h.name), escape_sql_value(v)))
        .unzip();
    if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", target)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            target,
            columns.join(", "),
            values.join(", ")
        )
    }
}

/// `SET` items for an update. Fails when every edit targets a generated
/// column.
fn assignments(headers: &[GridHeader], row: &ChangedRow) -> Result<Vec<String>, CommitError> {
    let items: Vec<String> = writable(headers, row)
        .map(|(h, v)| format!("{} = {}", quote_identifier(&h.name), escape_sql_value(v)))
        .collect();
    if items.is_empty() {
        let column = row
            .pending
            .keys()
            .next()
            .and_then(|&x| headers.get(x))
            .map(|h| h.name.clone())
            .unwrap_or_default();
        return Err(ValidationError::NothingWritable {
            row: row.index,
            column,
        }
        .into());
    }
    Ok(items)
}

fn identity(headers: &[GridHeader], row: &ChangedRow) -> Result<String, CommitError> {
    let key: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.is_primary_key)
        .map(|(x, _)| x)
        .collect();

    let mut clauses = Vec::new();
    if key.is_empty() {
        for (header, value) in headers.iter().zip(&row.original) {
            clauses.push(match value {
                Value::Null => format!("{} IS NULL", quote_identifier(&header.name)),
                v => format!("{} = {}", quote_identifier(&header.name), escape_sql_value(v)),
            });
        }
    } else {
        for x in key {
            let header = &headers[x];
            match row.original.get(x) {
                None | Some(Value::Null) => {
                    return Err(ValidationError::NullIdentity {
                        row: row.index,
                        column: header.name.clone(),
                    }
                    .into())
                }
                Some(v) => clauses.push(format!(
                    "{} = {}",
                    quote_identifier(&header.name),
                    escape_sql_value(v)
                )),
            }
        }
    }

    if clauses.is_empty() {
        return Err(ValidationError::NoColumns.into());
    }
    Ok(clauses.join(" AND "))
}

/// First returned row as `(column, value)` pairs.
fn returned_row(result: &ResultSet) -> Option<Vec<(String, Value)>> {
    let row = result.rows.first()?;
    Some(
        result
            .headers
            .iter()
            .zip(row)
            .map(|(h, v)| (h.name.clone(), v.clone()))
            .collect(),
    )
}
