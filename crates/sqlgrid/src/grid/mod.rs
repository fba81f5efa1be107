//! Editable result grid.
//!
//! A [`ResultGrid`] is built wholesale from one [`ResultSet`] and tracks
//! pending edits per cell against the server snapshot. Edits live in a
//! change arena keyed by [`ChangeToken`]; a row holds a token only while it
//! has pending values or is flagged new or removed.
//!
//! Mutations schedule a debounced [`GridNotice`] for listeners. Call
//! [`ResultGrid::tick`] from the event loop (or await
//! [`ResultGrid::flush_when_due`]) to deliver it. Discarding and applying
//! changes notify immediately.

mod broadcast;
mod export;
mod model;
mod state;

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use tracing::trace;

pub use broadcast::{DebounceTimer, GridNotice, ListenerId};
pub use export::Aggregate;
pub use model::{CanonicalRows, ChangeKind, ChangeRecord, ChangeToken, ChangedRow, GridHeader, Row};
pub use state::{FocusCell, GridKeyResult, SelectionRange};

use crate::config::GridConfig;
use crate::driver::{ResultSet, TableSchema, Value};
use broadcast::Listeners;
use model::ChangeLog;

pub struct ResultGrid {
    headers: Vec<GridHeader>,
    rows: Vec<Row>,
    changes: ChangeLog,

    focus: Option<FocusCell>,
    selected_rows: BTreeSet<usize>,
    selection_ranges: Vec<SelectionRange>,
    /// Far corner of the Shift+Arrow rectangle.
    move_point: Option<FocusCell>,
    /// In-progress text while edit mode is on.
    edit_buffer: Option<String>,
    read_only: bool,

    row_offset: usize,
    col_offset: usize,
    viewport_rows: usize,
    viewport_cols: usize,

    listeners: Listeners,
    timer: DebounceTimer,
}

impl ResultGrid {
    /// Build a fresh grid from a result. Schema metadata, when given,
    /// annotates headers with key and generated-column flags.
    pub fn from_result(
        result: &ResultSet,
        schema: Option<&TableSchema>,
        config: &GridConfig,
    ) -> Self {
        let headers = model::build_headers(&result.headers, &result.rows, schema, config);
        let width = headers.len();
        let rows = result
            .rows
            .iter()
            .map(|values| {
                let mut raw = values.clone();
                raw.resize(width, Value::Null);
                Row::from_values(raw)
            })
            .collect();

        Self {
            headers,
            rows,
            changes: ChangeLog::default(),
            focus: None,
            selected_rows: BTreeSet::new(),
            selection_ranges: Vec::new(),
            move_point: None,
            edit_buffer: None,
            read_only: false,
            row_offset: 0,
            col_offset: 0,
            viewport_rows: config.viewport_rows,
            viewport_cols: config.viewport_cols,
            listeners: Listeners::default(),
            timer: DebounceTimer::new(Duration::from_millis(config.broadcast_delay_ms)),
        }
    }

    pub fn empty() -> Self {
        Self::from_result(&ResultSet::default(), None, &GridConfig::default())
    }

    pub fn headers(&self) -> &[GridHeader] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn row(&self, y: usize) -> Option<&Row> {
        self.rows.get(y)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.name == name)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Read-only grids ignore every mutating call.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
        if read_only {
            self.edit_buffer = None;
        }
    }

    // ---- read path ----

    /// Current value of a cell: the pending edit if any, else the original.
    pub fn get_value(&self, y: usize, x: usize) -> Option<&Value> {
        let row = self.rows.get(y)?;
        let pending = row
            .change
            .and_then(|token| self.changes.get(token))
            .and_then(|record| record.pending.get(&x));
        pending.or_else(|| row.raw.get(x))
    }

    /// Original snapshot value, ignoring pending edits.
    pub fn get_original_value(&self, y: usize, x: usize) -> Option<&Value> {
        self.rows.get(y)?.raw.get(x)
    }

    pub fn pending_values(&self, y: usize) -> Option<&BTreeMap<usize, Value>> {
        let token = self.rows.get(y)?.change?;
        self.changes.get(token).map(|r| &r.pending)
    }

    pub fn is_cell_changed(&self, y: usize, x: usize) -> bool {
        self.pending_values(y).is_some_and(|p| p.contains_key(&x))
    }

    // ---- write path ----

    /// Record an edit. Setting a cell back to its original value drops the
    /// pending edit; an ordinary row with nothing left pending loses its
    /// token. Comparison is strict `Value` equality.
    ///
    /// Returns `false` when nothing was done (read-only or out of range).
    pub fn change_value(&mut self, y: usize, x: usize, value: Value) -> bool {
        if self.read_only || x >= self.headers.len() {
            return false;
        }
        let Some(row) = self.rows.get_mut(y) else {
            return false;
        };

        if row.raw[x] == value {
            if let Some(token) = row.change {
                let now_empty = match self.changes.get_mut(token) {
                    Some(record) => {
                        record.pending.remove(&x);
                        record.pending.is_empty()
                    }
                    None => false,
                };
                if now_empty && !row.is_new && !row.is_removed {
                    self.changes.free(token);
                    row.change = None;
                }
            }
        } else {
            let token = match row.change {
                Some(token) => token,
                None => {
                    let token = self.changes.allocate(BTreeMap::new());
                    row.change = Some(token);
                    token
                }
            };
            if let Some(record) = self.changes.get_mut(token) {
                record.pending.insert(x, value);
            }
        }

        self.schedule_broadcast();
        true
    }

    /// Insert a new, fully pending row. `at` defaults to the focused row,
    /// else 0. Raw values start as NULL. Returns the new row's index.
    pub fn insert_new_row(
        &mut self,
        at: Option<usize>,
        values: Option<BTreeMap<usize, Value>>,
    ) -> Option<usize> {
        if self.read_only {
            return None;
        }
        let at = at
            .or(self.focus.map(|f| f.y))
            .unwrap_or(0)
            .min(self.rows.len());

        let width = self.headers.len();
        let mut pending = values.unwrap_or_default();
        pending.retain(|&x, _| x < width);

        let token = self.changes.allocate(pending);
        self.rows.insert(
            at,
            Row {
                raw: vec![Value::Null; width],
                change: Some(token),
                is_new: true,
                is_removed: false,
            },
        );
        self.reset_selection();
        self.schedule_broadcast();
        Some(at)
    }

    /// Remove a row. `index` defaults to the focused row. A pending new row
    /// disappears outright; any other row is flagged for deletion.
    pub fn remove_row(&mut self, index: Option<usize>) -> bool {
        if self.read_only {
            return false;
        }
        let Some(y) = index.or(self.focus.map(|f| f.y)) else {
            return false;
        };
        let Some(row) = self.rows.get_mut(y) else {
            return false;
        };

        if row.is_new {
            if let Some(token) = row.change {
                self.changes.free(token);
            }
            self.rows.remove(y);
            self.edit_buffer = None;
            self.reset_selection();
            self.clamp_focus();
        } else {
            row.is_removed = true;
            if row.change.is_none() {
                row.change = Some(self.changes.allocate(BTreeMap::new()));
            }
        }

        self.schedule_broadcast();
        true
    }

    /// Drop every pending edit, insert and removal, then notify immediately.
    pub fn discard_all_changes(&mut self) {
        if self.read_only {
            return;
        }
        self.rows.retain(|row| !row.is_new);
        for row in &mut self.rows {
            row.change = None;
            row.is_removed = false;
        }
        self.changes.clear();
        self.edit_buffer = None;
        self.reset_selection();
        self.clamp_focus();
        self.broadcast_now();
    }

    /// Fold committed edits into the snapshot: `raw ⊕ pending ⊕ canonical`,
    /// where canonical values are matched to columns by name. Removed rows
    /// are dropped, all change state is cleared and listeners are notified
    /// immediately.
    pub fn apply_changes(&mut self, canonical: &CanonicalRows) {
        if self.read_only {
            return;
        }

        for row in &mut self.rows {
            let Some(token) = row.change.take() else {
                continue;
            };
            if let Some(record) = self.changes.free(token) {
                for (x, value) in record.pending {
                    if let Some(slot) = row.raw.get_mut(x) {
                        *slot = value;
                    }
                }
            }
            if let Some(values) = canonical.get(&token) {
                for (name, value) in values {
                    if let Some(x) = self.headers.iter().position(|h| &h.name == name) {
                        row.raw[x] = value.clone();
                    }
                }
            }
            row.is_new = false;
        }

        self.rows.retain(|row| !row.is_removed);
        self.changes.clear();
        self.edit_buffer = None;
        self.reset_selection();
        self.clamp_focus();
        self.broadcast_now();
    }

    /// Rows with pending work, in row order.
    pub fn get_changed_rows(&self) -> Vec<ChangedRow> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| {
                let token = row.change?;
                let pending = self
                    .changes
                    .get(token)
                    .map(|r| r.pending.clone())
                    .unwrap_or_default();
                let kind = if row.is_new {
                    ChangeKind::Insert
                } else if row.is_removed {
                    ChangeKind::Delete
                } else {
                    ChangeKind::Update
                };
                Some(ChangedRow {
                    index,
                    token,
                    kind,
                    original: row.raw.clone(),
                    pending,
                })
            })
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        self.rows.iter().any(|r| r.change.is_some())
    }

    // ---- notifications ----

    pub fn add_change_listener(
        &mut self,
        listener: impl FnMut(&GridNotice) + Send + 'static,
    ) -> ListenerId {
        self.listeners.add(Box::new(listener))
    }

    pub fn remove_change_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deadline of the pending debounced notification, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Deliver the debounced notification if it is due.
    pub fn tick(&mut self) -> bool {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> bool {
        if self.timer.fire_if_due(now) {
            self.notify();
            true
        } else {
            false
        }
    }

    /// Sleep until the pending notification is due and deliver it.
    /// Returns `false` immediately when nothing is scheduled.
    pub async fn flush_when_due(&mut self) -> bool {
        let Some(deadline) = self.timer.deadline() else {
            return false;
        };
        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
        self.tick_at(deadline)
    }

    fn schedule_broadcast(&mut self) {
        self.timer.schedule(Instant::now());
    }

    fn broadcast_now(&mut self) {
        self.timer.cancel();
        self.notify();
    }

    fn notify(&mut self) {
        let notice = GridNotice {
            row_count: self.rows.len(),
            changed_row_count: self.rows.iter().filter(|r| r.change.is_some()).count(),
            focus: self.focus,
        };
        trace!(
            rows = notice.row_count,
            changed = notice.changed_row_count,
            "grid change broadcast"
        );
        self.listeners.notify(&notice);
    }
}

impl Default for ResultGrid {
    fn default() -> Self {
        Self::empty()
    }
}
