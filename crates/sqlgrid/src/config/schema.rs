//! Configuration schema definitions.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Result grid settings
    pub grid: GridConfig,
    /// Connection settings
    pub connection: ConnectionConfig,
}

/// Result grid settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Fixed display width of numeric columns
    pub numeric_column_width: u32,
    /// Lower bound for text column widths
    pub min_text_width: u32,
    /// Upper bound for text column widths
    pub max_text_width: u32,
    /// Width of one character, multiplied by the longest sampled value
    pub char_width: u32,
    /// Rows sampled when measuring text columns
    pub width_sample_rows: usize,
    /// Debounce delay for change notifications, in milliseconds
    pub broadcast_delay_ms: u64,
    /// Visible rows, used to keep the focused cell in view
    pub viewport_rows: usize,
    /// Visible columns, used to keep the focused cell in view
    pub viewport_cols: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            numeric_column_width: 100,
            min_text_width: 150,
            max_text_width: 500,
            char_width: 8,
            width_sample_rows: 100,
            broadcast_delay_ms: 5,
            viewport_rows: 20,
            viewport_cols: 8,
        }
    }
}

/// Connection-related settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Default database URL (overridden by the DATABASE_URL env var)
    pub default_url: Option<String>,
}
