//! Configuration module for sqlgrid.
//!
//! Handles loading configuration from:
//! - Default values
//! - Config file (~/.config/sqlgrid/config.toml)
//! - Environment variables

mod schema;

pub use schema::{Config, ConnectionConfig, GridConfig};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Returns the config directory path.
///
/// Checks `SQLGRID_CONFIG_DIR` environment variable first, then falls back
/// to the system default (~/.config/sqlgrid on Linux).
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("SQLGRID_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|p| p.join("sqlgrid"))
}

/// Returns the default config file path (~/.config/sqlgrid/config.toml)
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("config.toml"))
}

/// Load configuration from the default path or return defaults
pub fn load_config() -> Result<Config> {
    match config_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Ok(Config::default()),
    }
}

/// Load configuration from a specific path
pub fn load_config_from(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

/// Connection URL to use: explicit argument, then `DATABASE_URL`, then the
/// configured default.
pub fn resolve_database_url(explicit: Option<String>, config: &Config) -> Option<String> {
    explicit
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .or_else(|| config.connection.default_url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[grid]
char_width = 10
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.grid.char_width, 10);
        assert_eq!(config.grid.max_text_width, 500);
        assert!(config.connection.default_url.is_none());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection]\ndefault_url = \":memory:\"").unwrap();

        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.connection.default_url.as_deref(), Some(":memory:"));
    }

    #[test]
    fn test_load_config_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[grid\nchar_width = ").unwrap();

        let err = load_config_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    #[serial]
    fn test_config_dir_env_override() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("SQLGRID_CONFIG_DIR", dir.path());

        assert_eq!(config_dir(), Some(dir.path().to_path_buf()));
        assert_eq!(config_path(), Some(dir.path().join("config.toml")));
        // Missing file falls back to defaults.
        assert_eq!(load_config().unwrap(), Config::default());

        std::fs::write(dir.path().join("config.toml"), "[grid]\nviewport_rows = 3\n").unwrap();
        assert_eq!(load_config().unwrap().grid.viewport_rows, 3);

        std::env::remove_var("SQLGRID_CONFIG_DIR");
    }

    #[test]
    #[serial]
    fn test_resolve_database_url_priority() {
        let config = Config {
            connection: ConnectionConfig {
                default_url: Some("from-config".to_string()),
            },
            ..Default::default()
        };

        std::env::remove_var("DATABASE_URL");
        assert_eq!(
            resolve_database_url(None, &config).as_deref(),
            Some("from-config")
        );

        std::env::set_var("DATABASE_URL", "from-env");
        assert_eq!(resolve_database_url(None, &config).as_deref(), Some("from-env"));
        assert_eq!(
            resolve_database_url(Some("explicit".to_string()), &config).as_deref(),
            Some("explicit")
        );
        std::env::remove_var("DATABASE_URL");
    }
}
