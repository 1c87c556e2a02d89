//! Capture configuration: a TOML document merged onto defaults and validated once.

pub mod config;
pub mod types;

pub use config::{retention_from_hours, Config};
pub use types::{MultipartConfig, RecordLevel, StorageBackend, StorageConfig, StreamingConfig};
