use crate::core::db::ConnectionSettings;
use crate::core::{DashError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration structure parsed from a TOML file.
///
/// Every section is optional; missing values fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ui: UIConfig,
    pub generator: GeneratorConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub create_if_missing: bool,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: "sqldash.db".to_string(),
            create_if_missing: true,
            busy_timeout_ms: 5000,
        }
    }
}

impl DatabaseConfig {
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            path: self.path.clone(),
            create_if_missing: self.create_if_missing,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

/// UI-related configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UIConfig {
    /// Rows shown per page by `:read`
    pub page_size: usize,
    /// Width in characters of text charts
    pub chart_width: usize,
}

impl Default for UIConfig {
    fn default() -> Self {
        UIConfig {
            page_size: 20,
            chart_width: 40,
        }
    }
}

/// Synthetic data generator configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub records_per_table: usize,
    /// Fixed seed for reproducible data; random when absent
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            records_per_table: 100,
            seed: None,
        }
    }
}

impl Config {
    fn validate(self) -> Result<Self> {
        if self.database.path.trim().is_empty() {
            return Err(DashError::Config("database.path must not be empty".to_string()));
        }
        if self.ui.page_size == 0 {
            return Err(DashError::Config("ui.page_size must be at least 1".to_string()));
        }
        if self.ui.chart_width < 10 {
            return Err(DashError::Config("ui.chart_width must be at least 10".to_string()));
        }
        Ok(self)
    }
}

/// Parses configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).map_err(|e| DashError::Config(e.to_string()))?;
    config.validate()
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = sqldash::config::load_config("config.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| {
        DashError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
    })?;
    parse_config(&content)
}

/// `<config dir>/sqldash/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sqldash").join("config.toml"))
}

/// Loads the file at `explicit` if given, otherwise the default location if
/// that file exists, otherwise built-in defaults.
pub fn load_or_default(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => load_config(path),
        None => match default_config_path() {
            Some(path) if path.is_file() => load_config(path),
            _ => Ok(Config::default()),
        },
    }
}
