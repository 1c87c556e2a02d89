//! Storage subsystem
//!
//! This module provides the capacity-bounded record store and its backends.
//!
//! Components:
//! - `storage_trait`: the `Store` trait defining a uniform API.
//! - `types`: aggregate figures returned by stores.
//! - `record_filter`: filter criteria and helpers to build them.
//! - `query`: filtering, search, sorting and pagination shared by the backends.
//! - `memory_storage`: process-local backend.
//! - `file_storage`: one JSON file per record, survives restarts.
//! - `retention`: periodic removal of expired records.

pub mod file_storage;
pub mod memory_storage;
pub mod query;
pub mod record_filter;
pub mod retention;
pub mod storage_trait;
pub mod types;

use std::sync::Arc;

use log::{error, info};

use crate::configuration::{Config, StorageBackend};
use crate::error_handling::types::ConfigError;

pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;
pub use record_filter::RecordFilter;
pub use storage_trait::Store;
pub use types::StoreStats;

/// Opens the backend selected by `config.storage`, bounded by `config.max_records`.
pub fn open_store(config: &Config) -> Result<Arc<dyn Store>, ConfigError> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory record store");
            Ok(Arc::new(MemoryStorage::new(config.max_records)))
        }
        StorageBackend::File => {
            let path = config
                .storage
                .path
                .as_ref()
                .ok_or(ConfigError::MissingStoragePath)?;
            let storage = FileStorage::new(path, config.max_records).map_err(|e| {
                error!("Unable to open file storage at {}: {}", path.display(), e);
                ConfigError::StorageUnavailable(e.to_string())
            })?;
            Ok(Arc::new(storage))
        }
    }
}
