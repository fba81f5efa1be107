use std::error::Error as StdError;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Format a postgres error with its full chain of causes
pub fn format_pg_error(e: &tokio_postgres::Error) -> String {
    if let Some(db_err) = e.as_db_error() {
        return db_err.to_string();
    }
    match e.source() {
        Some(source) => format!("{}: {}", e, source),
        None => e.to_string(),
    }
}

/// Terminal columns taken by a string.
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Pad or truncate to exactly `width` terminal columns, ending truncated
/// text with `...`.
pub fn fit_to_width(s: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }

    let current = display_width(s);
    if current <= width {
        let mut out = s.to_string();
        out.push_str(&" ".repeat(width - current));
        return out;
    }

    if width <= 3 {
        return truncate_by_display_width(s, width);
    }

    let mut out = truncate_by_display_width(s, width - 3);
    out.push_str("...");
    out
}

fn truncate_by_display_width(s: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;

    for ch in s.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }

    // A wide char that did not fit leaves a gap; pad it.
    out.push_str(&" ".repeat(width - used));
    out
}

/// Single-line rendering of a cell for plain-text tables.
pub fn single_line(s: &str) -> String {
    s.replace("\r\n", " ").replace(['\n', '\r', '\t'], " ")
}
