//! Focus, selection, viewport and keyboard handling.

use std::collections::{BTreeSet, HashSet};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::ResultGrid;
use crate::driver::{ColumnType, Value};

/// The focused cell. `y` is the row, `x` the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FocusCell {
    pub x: usize,
    pub y: usize,
}

impl FocusCell {
    pub fn new(y: usize, x: usize) -> Self {
        Self { x, y }
    }
}

/// Inclusive rectangle of cells, stored normalized (`x1 <= x2`, `y1 <= y2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRange {
    pub x1: usize,
    pub y1: usize,
    pub x2: usize,
    pub y2: usize,
}

impl SelectionRange {
    pub fn new(x1: usize, y1: usize, x2: usize, y2: usize) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn between(a: FocusCell, b: FocusCell) -> Self {
        Self::new(a.x, a.y, b.x, b.y)
    }

    pub fn contains(&self, y: usize, x: usize) -> bool {
        (self.y1..=self.y2).contains(&y) && (self.x1..=self.x2).contains(&x)
    }
}

/// What the caller should do after a key was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridKeyResult {
    None,
    /// Focus or the selection corner moved; the viewport offsets were updated.
    ScrollIntoView,
    CopyToClipboard(String),
}

impl ResultGrid {
    pub fn focus(&self) -> Option<FocusCell> {
        self.focus
    }

    /// Focus a cell. Out-of-range cells are rejected.
    pub fn set_focus(&mut self, y: usize, x: usize) -> bool {
        if y >= self.rows.len() || x >= self.headers.len() {
            return false;
        }
        let cell = FocusCell::new(y, x);
        self.focus = Some(cell);
        self.move_point = None;
        self.ensure_visible(cell);
        true
    }

    pub fn clear_focus(&mut self) {
        self.focus = None;
        self.move_point = None;
        self.edit_buffer = None;
    }

    pub fn selected_rows(&self) -> &BTreeSet<usize> {
        &self.selected_rows
    }

    pub fn selection_ranges(&self) -> &[SelectionRange] {
        &self.selection_ranges
    }

    pub fn select_row(&mut self, y: usize) {
        if y < self.rows.len() {
            self.selected_rows.insert(y);
        }
    }

    pub fn toggle_row_selection(&mut self, y: usize) {
        if !self.selected_rows.remove(&y) {
            self.select_row(y);
        }
    }

    pub fn select_range(&mut self, range: SelectionRange) {
        self.selection_ranges.push(range);
    }

    pub fn clear_selection(&mut self) {
        self.selected_rows.clear();
        self.selection_ranges.clear();
        self.move_point = None;
    }

    /// Every selected cell as `(y, x)`, each once even when rectangles or
    /// whole-row selections overlap. Rectangles come first in the order they
    /// were added, then selected rows. Cells outside the grid are skipped.
    pub fn selected_cells(&self) -> Vec<(usize, usize)> {
        let rows = self.rows.len();
        let cols = self.headers.len();
        let mut visited: HashSet<(usize, usize)> = HashSet::new();
        let mut cells = Vec::new();

        for range in &self.selection_ranges {
            for y in range.y1..=range.y2.min(rows.saturating_sub(1)) {
                for x in range.x1..=range.x2.min(cols.saturating_sub(1)) {
                    if y < rows && x < cols && visited.insert((y, x)) {
                        cells.push((y, x));
                    }
                }
            }
        }
        for &y in &self.selected_rows {
            for x in 0..cols {
                if y < rows && visited.insert((y, x)) {
                    cells.push((y, x));
                }
            }
        }
        cells
    }

    /// Selected cells, or the focused cell when nothing is selected.
    pub(crate) fn effective_selection(&self) -> Vec<(usize, usize)> {
        let cells = self.selected_cells();
        match (cells.is_empty(), self.focus) {
            (true, Some(f)) if f.y < self.rows.len() && f.x < self.headers.len() => {
                vec![(f.y, f.x)]
            }
            _ => cells,
        }
    }

    pub(super) fn reset_selection(&mut self) {
        self.selected_rows.clear();
        self.selection_ranges.clear();
        self.move_point = None;
    }

    pub(super) fn clamp_focus(&mut self) {
        let (rows, cols) = (self.rows.len(), self.headers.len());
        self.focus = match self.focus {
            Some(_) if rows == 0 || cols == 0 => None,
            Some(f) => Some(FocusCell::new(f.y.min(rows - 1), f.x.min(cols - 1))),
            None => None,
        };
        if let Some(f) = self.focus {
            self.ensure_visible(f);
        }
    }

    // ---- keyboard ----

    pub fn handle_key(&mut self, key: KeyEvent) -> GridKeyResult {
        if self.edit_buffer.is_some() {
            return self.handle_edit_key(key);
        }

        let shift = key.modifiers.contains(KeyModifiers::SHIFT);
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Up | KeyCode::Down | KeyCode::Left | KeyCode::Right => {
                let (dy, dx) = match key.code {
                    KeyCode::Up => (-1, 0),
                    KeyCode::Down => (1, 0),
                    KeyCode::Left => (0, -1),
                    _ => (0, 1),
                };
                if shift {
                    self.extend_selection(dy, dx)
                } else {
                    self.move_focus(dy, dx)
                }
            }
            KeyCode::Tab => {
                if self.focus_next_cell() {
                    GridKeyResult::ScrollIntoView
                } else {
                    GridKeyResult::None
                }
            }
            KeyCode::Enter | KeyCode::F(2) => {
                self.enter_edit_mode();
                GridKeyResult::None
            }
            KeyCode::Char('c') | KeyCode::Char('C') if ctrl => {
                GridKeyResult::CopyToClipboard(self.rows_as_tsv_selection())
            }
            KeyCode::Char(' ') if !ctrl => {
                if let Some(f) = self.focus {
                    self.toggle_row_selection(f.y);
                }
                GridKeyResult::None
            }
            KeyCode::Delete => {
                self.remove_row(None);
                GridKeyResult::None
            }
            KeyCode::Esc => {
                self.clear_selection();
                GridKeyResult::None
            }
            _ => GridKeyResult::None,
        }
    }

    /// Move focus one step, clamped at the edges. Without a focus the first
    /// cell is focused instead.
    pub fn move_focus(&mut self, dy: isize, dx: isize) -> GridKeyResult {
        let Some(start) = self.focus_or_first() else {
            return GridKeyResult::None;
        };
        let target = if self.focus.is_some() {
            self.step(start, dy, dx)
        } else {
            start
        };
        self.selection_ranges.clear();
        self.set_focus(target.y, target.x);
        GridKeyResult::ScrollIntoView
    }

    /// Grow the rectangle between the focus and the last move point, then
    /// advance the move point. Focus stays where it is.
    pub fn extend_selection(&mut self, dy: isize, dx: isize) -> GridKeyResult {
        let Some(anchor) = self.focus_or_first() else {
            return GridKeyResult::None;
        };
        self.focus = Some(anchor);

        let point = self.step(self.move_point.unwrap_or(anchor), dy, dx);
        self.move_point = Some(point);
        self.selection_ranges = vec![SelectionRange::between(anchor, point)];
        self.ensure_visible(point);
        GridKeyResult::ScrollIntoView
    }

    /// Row-major step to the next cell. Returns `false` at the last cell.
    pub fn focus_next_cell(&mut self) -> bool {
        let (rows, cols) = (self.rows.len(), self.headers.len());
        if rows == 0 || cols == 0 {
            return false;
        }
        let next = match self.focus {
            None => FocusCell::new(0, 0),
            Some(f) if f.x + 1 < cols => FocusCell::new(f.y, f.x + 1),
            Some(f) if f.y + 1 < rows => FocusCell::new(f.y + 1, 0),
            Some(_) => return false,
        };
        self.selection_ranges.clear();
        self.set_focus(next.y, next.x)
    }

    fn focus_or_first(&self) -> Option<FocusCell> {
        if self.rows.is_empty() || self.headers.is_empty() {
            return None;
        }
        Some(self.focus.unwrap_or(FocusCell::new(0, 0)))
    }

    fn step(&self, from: FocusCell, dy: isize, dx: isize) -> FocusCell {
        let max_y = self.rows.len().saturating_sub(1);
        let max_x = self.headers.len().saturating_sub(1);
        FocusCell::new(
            from.y.saturating_add_signed(dy).min(max_y),
            from.x.saturating_add_signed(dx).min(max_x),
        )
    }

    // ---- viewport ----

    /// First visible row and column.
    pub fn viewport_offset(&self) -> (usize, usize) {
        (self.row_offset, self.col_offset)
    }

    pub fn set_viewport_size(&mut self, rows: usize, cols: usize) {
        self.viewport_rows = rows;
        self.viewport_cols = cols;
        if let Some(f) = self.focus {
            self.ensure_visible(f);
        }
    }

    fn ensure_visible(&mut self, cell: FocusCell) {
        self.row_offset = scroll_to(self.row_offset, cell.y, self.viewport_rows);
        self.col_offset = scroll_to(self.col_offset, cell.x, self.viewport_cols);
    }

    // ---- edit mode ----

    pub fn is_editing(&self) -> bool {
        self.edit_buffer.is_some()
    }

    pub fn edit_buffer(&self) -> Option<&str> {
        self.edit_buffer.as_deref()
    }

    pub fn edit_buffer_mut(&mut self) -> Option<&mut String> {
        self.edit_buffer.as_mut()
    }

    /// Start editing the focused cell, seeding the buffer with its current
    /// value (NULL seeds an empty buffer).
    pub fn enter_edit_mode(&mut self) -> bool {
        if self.read_only {
            return false;
        }
        let Some(f) = self.focus else {
            return false;
        };
        let seed = match self.get_value(f.y, f.x) {
            Some(Value::Null) => String::new(),
            Some(value) => value.to_string(),
            None => return false,
        };
        self.edit_buffer = Some(seed);
        true
    }

    /// Convert the buffer by column type and write it to the focused cell.
    ///
    /// An empty buffer becomes NULL unless the column holds text and the
    /// cell is not already NULL.
    pub fn commit_edit(&mut self) -> bool {
        let Some(text) = self.edit_buffer.take() else {
            return false;
        };
        let Some(f) = self.focus else {
            return false;
        };
        let Some(column_type) = self.headers.get(f.x).map(|h| h.data_type) else {
            return false;
        };
        let current_is_null = self.get_value(f.y, f.x).is_some_and(Value::is_null);

        let value = if text.is_empty() && (column_type != ColumnType::Text || current_is_null) {
            Value::Null
        } else {
            Value::from_input(&text, column_type)
        };
        self.change_value(f.y, f.x, value)
    }

    /// Leave edit mode without touching the cell.
    pub fn exit_edit_mode(&mut self) {
        self.edit_buffer = None;
    }

    fn handle_edit_key(&mut self, key: KeyEvent) -> GridKeyResult {
        match key.code {
            KeyCode::Esc => self.exit_edit_mode(),
            KeyCode::Enter => {
                self.commit_edit();
            }
            KeyCode::Backspace => {
                if let Some(buf) = self.edit_buffer.as_mut() {
                    buf.pop();
                }
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                if let Some(buf) = self.edit_buffer.as_mut() {
                    buf.push(c);
                }
            }
            _ => {}
        }
        GridKeyResult::None
    }
}

/// New offset so that `index` lies inside `[offset, offset + size)`.
fn scroll_to(offset: usize, index: usize, size: usize) -> usize {
    if size == 0 {
        return index;
    }
    if index < offset {
        index
    } else if index >= offset + size {
        index + 1 - size
    } else {
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tests::people;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn shift(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::SHIFT)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn test_arrows_clamp_without_wrap() {
        let mut grid = people();
        assert_eq!(grid.handle_key(key(KeyCode::Up)), GridKeyResult::ScrollIntoView);
        // First press only establishes focus.
        assert_eq!(grid.focus(), Some(FocusCell::new(0, 0)));

        grid.handle_key(key(KeyCode::Up));
        grid.handle_key(key(KeyCode::Left));
        assert_eq!(grid.focus(), Some(FocusCell::new(0, 0)));

        for _ in 0..10 {
            grid.handle_key(key(KeyCode::Right));
            grid.handle_key(key(KeyCode::Down));
        }
        assert_eq!(grid.focus(), Some(FocusCell::new(2, 2)));
    }

    #[test]
    fn test_arrows_on_empty_grid() {
        let mut grid = ResultGrid::empty();
        assert_eq!(grid.handle_key(key(KeyCode::Down)), GridKeyResult::None);
        assert_eq!(grid.focus(), None);
    }

    #[test]
    fn test_tab_row_major_and_stops_at_end() {
        let mut grid = people();
        grid.set_focus(0, 2);
        assert_eq!(grid.handle_key(key(KeyCode::Tab)), GridKeyResult::ScrollIntoView);
        assert_eq!(grid.focus(), Some(FocusCell::new(1, 0)));

        grid.set_focus(2, 2);
        assert_eq!(grid.handle_key(key(KeyCode::Tab)), GridKeyResult::None);
        assert_eq!(grid.focus(), Some(FocusCell::new(2, 2)));
    }

    #[test]
    fn test_shift_arrow_extends_from_move_point() {
        let mut grid = people();
        grid.set_focus(0, 0);

        grid.handle_key(shift(KeyCode::Right));
        assert_eq!(grid.selection_ranges(), &[SelectionRange::new(0, 0, 1, 0)]);

        grid.handle_key(shift(KeyCode::Down));
        grid.handle_key(shift(KeyCode::Down));
        assert_eq!(grid.selection_ranges(), &[SelectionRange::new(0, 0, 1, 2)]);
        assert_eq!(grid.focus(), Some(FocusCell::new(0, 0)));

        // A plain move resets the rectangle.
        grid.handle_key(key(KeyCode::Right));
        assert!(grid.selection_ranges().is_empty());
        grid.handle_key(shift(KeyCode::Left));
        assert_eq!(grid.selection_ranges(), &[SelectionRange::new(0, 0, 1, 0)]);
    }

    #[test]
    fn test_selected_cells_are_deduplicated() {
        let mut grid = people();
        grid.select_range(SelectionRange::new(0, 0, 1, 1));
        grid.select_range(SelectionRange::new(1, 1, 2, 1));
        grid.select_row(1);

        let cells = grid.selected_cells();
        assert_eq!(
            cells,
            vec![(0, 0), (0, 1), (1, 0), (1, 1), (1, 2)]
        );
        let unique: HashSet<_> = cells.iter().collect();
        assert_eq!(unique.len(), cells.len());
    }

    #[test]
    fn test_selected_cells_skip_out_of_range() {
        let mut grid = people();
        grid.select_range(SelectionRange::new(2, 2, 9, 9));
        grid.select_row(42);
        assert_eq!(grid.selected_cells(), vec![(2, 2)]);
        assert!(grid.selected_rows().is_empty());
    }

    #[test]
    fn test_space_toggles_row_selection() {
        let mut grid = people();
        grid.set_focus(1, 0);
        grid.handle_key(key(KeyCode::Char(' ')));
        assert!(grid.selected_rows().contains(&1));
        grid.handle_key(key(KeyCode::Char(' ')));
        assert!(grid.selected_rows().is_empty());
    }

    #[test]
    fn test_edit_mode_commit_and_cancel() {
        let mut grid = people();
        grid.set_focus(0, 1);

        grid.handle_key(key(KeyCode::Enter));
        assert_eq!(grid.edit_buffer(), Some("Ada"));
        grid.handle_key(key(KeyCode::Backspace));
        grid.handle_key(key(KeyCode::Char('m')));
        // Arrows are ignored while editing.
        grid.handle_key(key(KeyCode::Down));
        grid.handle_key(key(KeyCode::Enter));

        assert!(!grid.is_editing());
        assert_eq!(grid.get_value(0, 1), Some(&Value::from("Adm")));
        assert_eq!(grid.focus(), Some(FocusCell::new(0, 1)));

        grid.handle_key(key(KeyCode::F(2)));
        grid.handle_key(key(KeyCode::Char('!')));
        grid.handle_key(key(KeyCode::Esc));
        assert!(!grid.is_editing());
        assert_eq!(grid.get_value(0, 1), Some(&Value::from("Adm")));
    }

    #[test]
    fn test_commit_edit_converts_by_column_type() {
        let mut grid = people();
        grid.set_focus(1, 2);
        assert!(grid.enter_edit_mode());
        assert_eq!(grid.edit_buffer(), Some(""));
        grid.edit_buffer_mut().unwrap().push_str("4.25");
        assert!(grid.commit_edit());
        assert_eq!(grid.get_value(1, 2), Some(&Value::Real(4.25)));

        // Clearing a numeric cell stores NULL.
        grid.set_focus(0, 0);
        grid.enter_edit_mode();
        grid.edit_buffer_mut().unwrap().clear();
        grid.commit_edit();
        assert_eq!(grid.get_value(0, 0), Some(&Value::Null));

        // Clearing a text cell stores an empty string.
        grid.set_focus(0, 1);
        grid.enter_edit_mode();
        grid.edit_buffer_mut().unwrap().clear();
        grid.commit_edit();
        assert_eq!(grid.get_value(0, 1), Some(&Value::from("")));
    }

    #[test]
    fn test_unchanged_edit_leaves_no_change() {
        let mut grid = people();
        grid.set_focus(0, 0);
        grid.enter_edit_mode();
        grid.commit_edit();
        assert!(!grid.has_changes());
    }

    #[test]
    fn test_read_only_refuses_edit_mode() {
        let mut grid = people();
        grid.set_read_only(true);
        grid.set_focus(0, 0);
        assert!(!grid.enter_edit_mode());
        grid.handle_key(key(KeyCode::Delete));
        assert!(!grid.has_changes());
    }

    #[test]
    fn test_ctrl_c_copies_selection() {
        let mut grid = people();
        grid.set_focus(0, 0);
        grid.handle_key(shift(KeyCode::Right));
        grid.handle_key(shift(KeyCode::Down));
        assert_eq!(
            grid.handle_key(ctrl('c')),
            GridKeyResult::CopyToClipboard("1\tAda\n2\tLinus".to_string())
        );
    }

    #[test]
    fn test_delete_key_removes_focused_row() {
        let mut grid = people();
        grid.set_focus(1, 0);
        grid.handle_key(key(KeyCode::Delete));
        assert!(grid.row(1).unwrap().is_removed());
    }

    #[test]
    fn test_viewport_follows_focus() {
        let mut grid = people();
        grid.set_viewport_size(2, 1);
        grid.set_focus(0, 0);
        assert_eq!(grid.viewport_offset(), (0, 0));

        grid.handle_key(key(KeyCode::Down));
        grid.handle_key(key(KeyCode::Down));
        grid.handle_key(key(KeyCode::Right));
        assert_eq!(grid.viewport_offset(), (1, 1));

        grid.handle_key(key(KeyCode::Up));
        grid.handle_key(key(KeyCode::Up));
        assert_eq!(grid.viewport_offset(), (0, 1));
    }

    #[test]
    fn test_focus_clamped_after_discard() {
        let mut grid = people();
        grid.insert_new_row(Some(3), None);
        grid.set_focus(3, 1);
        grid.discard_all_changes();
        assert_eq!(grid.focus(), Some(FocusCell::new(2, 1)));
    }

    #[test]
    fn test_scroll_to() {
        assert_eq!(scroll_to(0, 5, 3), 3);
        assert_eq!(scroll_to(4, 2, 3), 2);
        assert_eq!(scroll_to(2, 3, 3), 2);
    }
}
