//! Store Trait
//!
//! This module defines the `Store` trait, the capacity-bounded persistence contract every record
//! backend implements.
//!
//! Implementors of this trait are responsible for:
//! - Upserting records by id
//! - Evicting the oldest records once the capacity bound is exceeded
//! - Answering filtered, paginated and keyword queries
//! - Removing records older than a cutoff
//!
//! All methods return a `Result` to handle potential storage errors.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::data_capture::types::Record;
use crate::error_handling::types::StorageError;
use crate::storage::record_filter::RecordFilter;
use crate::storage::types::StoreStats;

/// The `Store` trait defines the interface for record storage backends.
///
/// A store is shared by every concurrently running exchange, so implementations serialize
/// writes and eviction internally. Pages are 1-based, results are sorted newest first before
/// slicing, and the returned total is the filtered count. A `page_size` of `0` returns every
/// matching record.
pub trait Store: Send + Sync {
    /// Inserts or replaces the record with the same id, then evicts the oldest records until
    /// the capacity bound holds.
    fn save(&self, record: &Record) -> Result<(), StorageError>;

    fn find_by_id(&self, id: &str) -> Result<Option<Record>, StorageError>;

    /// Returns one page of the records matching `filter`, and the number of matching records.
    fn find_all(
        &self,
        page: usize,
        page_size: usize,
        filter: &RecordFilter,
    ) -> Result<(Vec<Record>, usize), StorageError>;

    /// Case-insensitive keyword search over URL, bodies, error text and both header maps.
    fn search(
        &self,
        keyword: &str,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<Record>, usize), StorageError>;

    /// Removes records whose timestamp is strictly older than `before`.
    fn cleanup(&self, before: DateTime<Utc>) -> Result<usize, StorageError>;

    fn stats(&self) -> Result<StoreStats, StorageError>;

    /// Record count per HTTP method.
    fn methods_histogram(&self) -> Result<BTreeMap<String, usize>, StorageError>;

    /// Record count per HTTP status code.
    fn status_histogram(&self) -> Result<BTreeMap<u16, usize>, StorageError>;

    /// Marks the store closed; further calls fail with [`StorageError::Closed`].
    fn close(&self) -> Result<(), StorageError>;
}
