//! Text exports and selection aggregates.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map as JsonMap, Value as JsonValue};

use super::ResultGrid;
use crate::driver::{TableRef, Value};
use crate::sql::{escape_sql_value, quote_identifier};
use crate::util::single_line;

/// Summary of the numeric cells in a selection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Aggregate {
    /// Selected cells, NULL included.
    pub count: usize,
    /// Cells that had a numeric reading.
    pub numeric_count: usize,
    pub sum: Option<f64>,
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "count: {}", self.count)?;
        if let (Some(sum), Some(avg), Some(min), Some(max)) = (self.sum, self.avg, self.min, self.max)
        {
            write!(f, "  sum: {}  avg: {}  min: {}  max: {}", sum, avg, min, max)?;
        }
        Ok(())
    }
}

fn plain(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(v) => v.to_string(),
    }
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

impl ResultGrid {
    /// Tab-separated rows using current (pending-aware) values.
    pub fn rows_as_tsv(&self, indices: &[usize], include_headers: bool) -> String {
        self.delimited(indices, include_headers, |s| single_line(s), "\t")
    }

    /// RFC 4180 style CSV using current (pending-aware) values.
    pub fn rows_as_csv(&self, indices: &[usize], include_headers: bool) -> String {
        self.delimited(indices, include_headers, escape_csv, ",")
    }

    /// JSON array with one object per row, keyed by column name.
    pub fn rows_as_json(&self, indices: &[usize]) -> String {
        let rows: Vec<JsonValue> = indices
            .iter()
            .filter(|&&y| y < self.rows.len())
            .map(|&y| {
                let mut object = JsonMap::new();
                for (x, header) in self.headers.iter().enumerate() {
                    let value = self
                        .get_value(y, x)
                        .and_then(|v| serde_json::to_value(v).ok())
                        .unwrap_or(JsonValue::Null);
                    object.insert(header.name.clone(), value);
                }
                JsonValue::Object(object)
            })
            .collect();
        serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
    }

    /// All rows as CSV with a header line.
    pub fn to_csv(&self) -> String {
        let indices: Vec<usize> = (0..self.rows.len()).collect();
        self.rows_as_csv(&indices, true)
    }

    /// Selected cells as TSV, one line per row, for the clipboard. Falls
    /// back to the focused cell when nothing is selected.
    pub fn rows_as_tsv_selection(&self) -> String {
        self.selection_by_row()
            .into_iter()
            .map(|(y, xs)| {
                xs.into_iter()
                    .map(|x| single_line(&plain(self.get_value(y, x))))
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// One `INSERT` statement per selected row, covering the selected columns.
    pub fn selection_as_inserts(&self, table: &TableRef) -> Vec<String> {
        self.selection_by_row()
            .into_iter()
            .map(|(y, xs)| {
                let columns: Vec<String> = xs
                    .iter()
                    .map(|&x| quote_identifier(&self.headers[x].name))
                    .collect();
                let values: Vec<String> = xs
                    .iter()
                    .map(|&x| escape_sql_value(self.get_value(y, x).unwrap_or(&Value::Null)))
                    .collect();
                format!(
                    "INSERT INTO {} ({}) VALUES ({});",
                    table.qualified(),
                    columns.join(", "),
                    values.join(", ")
                )
            })
            .collect()
    }

    /// Count, sum, average, min and max over the selection.
    pub fn aggregate_selection(&self) -> Aggregate {
        let cells = self.effective_selection();
        let numbers: Vec<f64> = cells
            .iter()
            .filter_map(|&(y, x)| self.get_value(y, x).and_then(Value::as_f64))
            .collect();

        let mut aggregate = Aggregate {
            count: cells.len(),
            numeric_count: numbers.len(),
            ..Default::default()
        };
        if !numbers.is_empty() {
            let sum: f64 = numbers.iter().sum();
            aggregate.sum = Some(sum);
            aggregate.avg = Some(sum / numbers.len() as f64);
            aggregate.min = numbers.iter().copied().reduce(f64::min);
            aggregate.max = numbers.iter().copied().reduce(f64::max);
        }
        aggregate
    }

    fn selection_by_row(&self) -> BTreeMap<usize, Vec<usize>> {
        let mut by_row: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (y, x) in self.effective_selection() {
            by_row.entry(y).or_default().push(x);
        }
        for xs in by_row.values_mut() {
            xs.sort_unstable();
        }
        by_row
    }

    fn delimited(
        &self,
        indices: &[usize],
        include_headers: bool,
        escape: impl Fn(&str) -> String,
        separator: &str,
    ) -> String {
        let mut lines = Vec::with_capacity(indices.len() + 1);
        if include_headers {
            let names: Vec<String> = self.headers.iter().map(|h| escape(&h.name)).collect();
            lines.push(names.join(separator));
        }
        for &y in indices.iter().filter(|&&y| y < self.rows.len()) {
            let cells: Vec<String> = (0..self.headers.len())
                .map(|x| escape(&plain(self.get_value(y, x))))
                .collect();
            lines.push(cells.join(separator));
        }
        lines.join("\n")
    }
}
