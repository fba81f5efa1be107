//! Headers, rows and the change arena behind [`ResultGrid`](super::ResultGrid).

use std::collections::BTreeMap;
use std::fmt;

use crate::config::GridConfig;
use crate::driver::{ColumnHeader, ColumnType, ForeignKeyRef, TableSchema, Value};
use crate::util::display_width;

/// Column metadata shown by the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridHeader {
    pub name: String,
    /// Unique label; repeated column names get a ` (n)` suffix.
    pub display_name: String,
    pub data_type: ColumnType,
    /// Declared type as reported by the driver or the table schema.
    pub declared_type: String,
    pub is_primary_key: bool,
    pub foreign_key: Option<ForeignKeyRef>,
    pub is_generated: bool,
    pub display_width: u32,
}

/// Identifies a row's entry in the [`ChangeLog`]. Allocated from a
/// monotonically increasing counter and never reused within a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangeToken(u64);

impl ChangeToken {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pending, uncommitted edits of one row keyed by column index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeRecord {
    pub pending: BTreeMap<usize, Value>,
}

/// Arena of change records. Rows point into it by token; it never owns rows.
#[derive(Debug, Default)]
pub(crate) struct ChangeLog {
    next_token: u64,
    records: BTreeMap<ChangeToken, ChangeRecord>,
}

impl ChangeLog {
    pub(crate) fn allocate(&mut self, pending: BTreeMap<usize, Value>) -> ChangeToken {
        self.next_token += 1;
        let token = ChangeToken(self.next_token);
        self.records.insert(token, ChangeRecord { pending });
        token
    }

    pub(crate) fn get(&self, token: ChangeToken) -> Option<&ChangeRecord> {
        self.records.get(&token)
    }

    pub(crate) fn get_mut(&mut self, token: ChangeToken) -> Option<&mut ChangeRecord> {
        self.records.get_mut(&token)
    }

    pub(crate) fn free(&mut self, token: ChangeToken) -> Option<ChangeRecord> {
        self.records.remove(&token)
    }

    /// Drop every record. The counter keeps counting.
    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

/// One row of the grid: the server snapshot plus change flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub(crate) raw: Vec<Value>,
    pub(crate) change: Option<ChangeToken>,
    pub(crate) is_new: bool,
    pub(crate) is_removed: bool,
}

impl Row {
    pub(crate) fn from_values(raw: Vec<Value>) -> Self {
        Self {
            raw,
            ..Default::default()
        }
    }

    /// Original values as last seen on the server.
    pub fn raw(&self) -> &[Value] {
        &self.raw
    }

    pub fn change_token(&self) -> Option<ChangeToken> {
        self.change
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_removed(&self) -> bool {
        self.is_removed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row with pending work for the commit engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedRow {
    /// Current position in the grid.
    pub index: usize,
    pub token: ChangeToken,
    pub kind: ChangeKind,
    /// Snapshot values, used to identify the row on the server.
    pub original: Vec<Value>,
    pub pending: BTreeMap<usize, Value>,
}

/// Server-canonical values keyed by change token, each a list of
/// `(column name, value)` pairs as returned by the database.
pub type CanonicalRows = BTreeMap<ChangeToken, Vec<(String, Value)>>;

/// Build grid headers from a result's columns, annotating them with schema
/// flags and measuring display widths over the sampled rows.
pub(crate) fn build_headers(
    columns: &[ColumnHeader],
    rows: &[Vec<Value>],
    schema: Option<&TableSchema>,
    config: &GridConfig,
) -> Vec<GridHeader> {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();

    columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let column_schema = schema.and_then(|s| s.column(&column.name));

            let declared_type = match column_schema {
                Some(c) if column.data_type.is_empty() => c.data_type.clone(),
                _ => column.data_type.clone(),
            };
            let data_type = match ColumnType::from_declared(&declared_type) {
                ColumnType::Unknown => infer_column_type(idx, rows, config.width_sample_rows),
                known => known,
            };

            let count = seen.entry(column.name.as_str()).or_insert(0);
            *count += 1;
            let display_name = if *count == 1 {
                column.name.clone()
            } else {
                format!("{} ({})", column.name, count)
            };

            GridHeader {
                name: column.name.clone(),
                display_name,
                data_type,
                declared_type,
                is_primary_key: column_schema.is_some_and(|c| c.is_primary_key),
                foreign_key: column_schema.and_then(|c| c.foreign_key.clone()),
                is_generated: column_schema.is_some_and(|c| c.is_generated),
                display_width: column_width(data_type, idx, rows, config),
            }
        })
        .collect()
}

/// Classify an untyped column (expressions, text-only drivers) from its
/// sampled values.
fn infer_column_type(column: usize, rows: &[Vec<Value>], sample: usize) -> ColumnType {
    let mut inferred = ColumnType::Unknown;
    for value in rows.iter().take(sample).filter_map(|r| r.get(column)) {
        let kind = match value {
            Value::Null => continue,
            Value::Integer(_) => ColumnType::Integer,
            Value::Real(_) => ColumnType::Real,
            Value::Text(_) => ColumnType::Text,
            Value::Blob(_) => ColumnType::Blob,
        };
        inferred = match (inferred, kind) {
            (ColumnType::Unknown, k) => k,
            (a, b) if a == b => a,
            (ColumnType::Integer, ColumnType::Real) | (ColumnType::Real, ColumnType::Integer) => {
                ColumnType::Real
            }
            _ => return ColumnType::Text,
        };
    }
    inferred
}

/// Numeric columns get a fixed width. Everything else is sized by the
/// longest sampled value, clamped to the configured bounds.
pub(crate) fn column_width(
    data_type: ColumnType,
    column: usize,
    rows: &[Vec<Value>],
    config: &GridConfig,
) -> u32 {
    if data_type.is_numeric() {
        return config.numeric_column_width;
    }

    let max_len = rows
        .iter()
        .take(config.width_sample_rows)
        .filter_map(|r| r.get(column))
        .map(|v| display_width(&v.to_string()))
        .max()
        .unwrap_or(0);

    let width = u32::try_from(max_len)
        .unwrap_or(u32::MAX)
        .saturating_mul(config.char_width);
    width.max(config.min_text_width).min(config.max_text_width)
}
