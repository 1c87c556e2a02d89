use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Minimum severity a log line must have to be attached to a record.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordLevel {
    Silent,
    Error,
    Warn,
    #[default]
    Info,
}

impl RecordLevel {
    pub fn allows(self, level: log::Level) -> bool {
        match self {
            RecordLevel::Silent => false,
            RecordLevel::Error => level <= log::Level::Error,
            RecordLevel::Warn => level <= log::Level::Warn,
            RecordLevel::Info => level <= log::Level::Info,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub enabled: bool,
    /// Display cap per chunk in bytes, `0` = unlimited
    pub max_chunk_size: usize,
    /// Retained chunk count, `0` = unlimited
    pub max_chunks: usize,
    /// Ceiling on the summed true size of retained chunks, `0` = unlimited
    pub max_memory: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chunk_size: 1024,
            max_chunks: 100,
            max_memory: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipartConfig {
    pub enabled: bool,
    pub max_part_size: usize,
    pub skip_file_content: bool,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_part_size: 64 * 1024,
            skip_file_content: true,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: Option<PathBuf>,
}
