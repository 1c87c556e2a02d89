use super::types::*;
use crate::error_handling::types::ConfigError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `storage.path` for the file backend.
pub const STORAGE_DIR_ENV: &str = "RUCHE_STORAGE_DIR";
/// Longest accepted retention window, a thousand years.
pub const MAX_RETENTION_HOURS: u64 = 1000 * 365 * 24;

/// Converts a retention window in hours, rejecting values the clock arithmetic cannot hold.
pub fn retention_from_hours(hours: u64) -> Result<chrono::TimeDelta, ConfigError> {
    let out_of_range = || {
        ConfigError::NotInRange(format!(
            "retention must be at most {} hours, got {}",
            MAX_RETENTION_HOURS, hours
        ))
    };
    if hours > MAX_RETENTION_HOURS {
        return Err(out_of_range());
    }
    i64::try_from(hours)
        .ok()
        .and_then(chrono::TimeDelta::try_hours)
        .ok_or_else(out_of_range)
}

/// Capture configuration that defines how exchanges are selected, bounded and stored.
///
/// Every field carries a default so a partial TOML document is merged onto the defaults once,
/// when the file is read. [`Config::validated`] then rejects values that cannot be honoured.
///
/// # Examples
///
/// ```
/// use ruche::configuration::config::Config;
///
/// let config = Config::from_toml_str("sample_rate = 0.5\nmax_records = 200").unwrap();
/// assert_eq!(config.max_records, 200);
/// assert!(config.enabled);
/// ```
///
/// # Fields Overview
///
/// - `enabled`: master switch, `false` skips every exchange
/// - `max_body_size_kb`: bodies above this size are replaced with a size-only placeholder
/// - `retention_hours`: age after which the retention sweeper removes records, `0` disables it
/// - `record_level`: minimum severity of log lines attached to a record
/// - `max_records`: capacity bound of the store, `0` means unlimited
/// - `skip_paths` / `skip_methods`: exchanges that are never captured
/// - `dashboard_path`: the dashboard's own path, never captured
/// - `sample_rate`: probability in `[0, 1]` that an eligible exchange is captured
/// - `background_save`: hand saves to a blocking task when a tokio runtime is available
/// - `streaming`, `multipart`, `storage`: nested sections
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub enabled: bool,
    pub max_body_size_kb: usize,
    pub retention_hours: u64,
    pub record_level: RecordLevel,
    pub max_records: usize,
    pub skip_paths: Vec<String>,
    pub skip_methods: Vec<String>,
    pub dashboard_path: String,
    pub sample_rate: f64,
    pub background_save: bool,
    pub streaming: StreamingConfig,
    pub multipart: MultipartConfig,
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            max_body_size_kb: 1024,
            retention_hours: 24,
            record_level: RecordLevel::Info,
            max_records: 1000,
            skip_paths: Vec::new(),
            skip_methods: vec!["OPTIONS".to_string()],
            dashboard_path: "/_debug".to_string(),
            sample_rate: 1.0,
            background_save: false,
            streaming: StreamingConfig::default(),
            multipart: MultipartConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Reads a TOML configuration file, merges it onto the defaults and validates the result.
    ///
    /// # Errors
    /// Returns [`ConfigError::IoError`] when the file cannot be read, [`ConfigError::TomlError`]
    /// when it is not valid TOML and any error from [`Config::validated`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading capture configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validated()
    }

    /// Checks the invariants the capture pipeline relies on and applies the
    /// `RUCHE_STORAGE_DIR` override.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&self.sample_rate) || self.sample_rate.is_nan() {
            return Err(ConfigError::NotInRange(format!(
                "sample_rate must be within [0, 1], got {}",
                self.sample_rate
            )));
        }
        retention_from_hours(self.retention_hours)?;
        if let Ok(dir) = std::env::var(STORAGE_DIR_ENV) {
            debug!("Storage path overridden by {}: {}", STORAGE_DIR_ENV, dir);
            self.storage.path = Some(PathBuf::from(dir));
        }
        if self.storage.backend == StorageBackend::File && self.storage.path.is_none() {
            return Err(ConfigError::MissingStoragePath);
        }
        Ok(self)
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size_kb.saturating_mul(1024)
    }

    /// Retention window, `None` when disabled or out of range.
    pub fn retention(&self) -> Option<chrono::TimeDelta> {
        if self.retention_hours == 0 {
            return None;
        }
        retention_from_hours(self.retention_hours).ok()
    }
}
