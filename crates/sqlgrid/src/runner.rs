//! Sequential statement execution with live progress reporting.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::driver::{Driver, QueryStat, ResultSet};
use crate::error::ExecutionError;

/// One attempted statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionLogEntry {
    /// 1-based position in the batch.
    pub order: usize,
    pub sql: String,
    pub start: DateTime<Utc>,
    /// Set once the statement settles.
    pub end: Option<DateTime<Utc>>,
    /// Set only on success.
    pub stats: Option<QueryStat>,
    /// Set only on failure.
    pub error: Option<String>,
}

impl ExecutionLogEntry {
    fn started(order: usize, sql: &str) -> Self {
        Self {
            order,
            sql: sql.to_string(),
            start: Utc::now(),
            end: None,
            stats: None,
            error: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.end.is_some() && self.error.is_none()
    }
}

/// Snapshot handed to the progress callback on every state transition.
#[derive(Debug, Clone, Copy)]
pub struct RunProgress<'a> {
    pub logs: &'a [ExecutionLogEntry],
    /// Statements that have succeeded so far.
    pub progress: usize,
    pub total: usize,
    /// True on the event reporting a failure.
    pub error: bool,
}

/// Everything a run produced, including partial results after a failure.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub logs: Vec<ExecutionLogEntry>,
    /// Results that carried at least one column, in execution order.
    pub results: Vec<ResultSet>,
    pub error: Option<ExecutionError>,
}

impl RunOutcome {
    /// Last tabular result, the one a grid is built from.
    pub fn last(&self) -> Option<&ResultSet> {
        self.results.last()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs statements strictly one after another against a driver.
pub struct QueryRunner<'d, D: Driver> {
    driver: &'d D,
}

impl<'d, D: Driver> QueryRunner<'d, D> {
    pub fn new(driver: &'d D) -> Self {
        Self { driver }
    }

    /// Execute `statements` in order, stopping at the first failure.
    ///
    /// `on_progress` is called synchronously when a statement starts, when it
    /// succeeds and when it fails.
    pub async fn run<S, F>(&self, statements: &[S], mut on_progress: F) -> RunOutcome
    where
        S: AsRef<str>,
        F: FnMut(&RunProgress<'_>),
    {
        let total = statements.len();
        let mut outcome = RunOutcome::default();
        let mut progress = 0usize;

        for (idx, sql) in statements.iter().enumerate() {
            let sql = sql.as_ref();
            let order = idx + 1;
            debug!(order, total, sql, "running statement");

            outcome.logs.push(ExecutionLogEntry::started(order, sql));
            on_progress(&RunProgress {
                logs: &outcome.logs,
                progress,
                total,
                error: false,
            });

            let started = Instant::now();
            let result = self.driver.query(sql).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let Some(entry) = outcome.logs.last_mut() else {
                break;
            };
            entry.end = Some(Utc::now());

            match result {
                Ok(mut result) => {
                    let mut stats = result.stat.take().unwrap_or_default();
                    stats.query_duration_ms.get_or_insert(elapsed_ms);
                    entry.stats = Some(stats.clone());
                    result.stat = Some(stats);

                    progress += 1;
                    if !result.headers.is_empty() {
                        outcome.results.push(result);
                    }
                    on_progress(&RunProgress {
                        logs: &outcome.logs,
                        progress,
                        total,
                        error: false,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(order, sql, error = %message, "statement failed, stopping batch");
                    entry.error = Some(message.clone());
                    outcome.error = Some(ExecutionError {
                        order,
                        sql: sql.to_string(),
                        message,
                    });
                    on_progress(&RunProgress {
                        logs: &outcome.logs,
                        progress,
                        total,
                        error: true,
                    });
                    break;
                }
            }
        }

        outcome
    }
}
