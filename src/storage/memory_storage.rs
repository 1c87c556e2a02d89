use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use log::{debug, error, info};

use crate::data_capture::types::Record;
use crate::error_handling::types::StorageError;
use crate::storage::query;
use crate::storage::record_filter::RecordFilter;
use crate::storage::storage_trait::Store;
use crate::storage::types::StoreStats;

struct Inner {
    /// Sorted oldest first by (timestamp, id), so eviction pops the front
    records: Vec<Record>,
    closed: bool,
}

/// Process-local record store bounded by `max_records` (`0` = unlimited).
pub struct MemoryStorage {
    max_records: usize,
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new(max_records: usize) -> Self {
        info!("MemoryStorage initialized (max_records: {})", max_records);
        Self {
            max_records,
            inner: RwLock::new(Inner {
                records: Vec::new(),
                closed: false,
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StorageError> {
        let guard = self.inner.read().map_err(|_| {
            error!("MemoryStorage lock poisoned");
            StorageError::ReadFailed
        })?;
        if guard.closed {
            return Err(StorageError::Closed);
        }
        Ok(guard)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StorageError> {
        let guard = self.inner.write().map_err(|_| {
            error!("MemoryStorage lock poisoned");
            StorageError::WriteFailed
        })?;
        if guard.closed {
            return Err(StorageError::Closed);
        }
        Ok(guard)
    }
}

impl Store for MemoryStorage {
    fn save(&self, record: &Record) -> Result<(), StorageError> {
        let record = query::with_size(record)?;
        let mut inner = self.write()?;
        inner.records.retain(|r| r.id != record.id);
        let at = inner
            .records
            .partition_point(|r| query::oldest_first(r, &record).is_lt());
        debug!("[{}] Stored {} record ({} bytes)", record.id, record.kind, record.size_bytes);
        inner.records.insert(at, record);

        if self.max_records > 0 && inner.records.len() > self.max_records {
            let excess = inner.records.len() - self.max_records;
            for evicted in inner.records.drain(..excess) {
                debug!("[{}] Evicted, capacity {} reached", evicted.id, self.max_records);
            }
        }
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Record>, StorageError> {
        let inner = self.read()?;
        Ok(inner.records.iter().find(|r| r.id == id).cloned())
    }

    fn find_all(
        &self,
        page: usize,
        page_size: usize,
        filter: &RecordFilter,
    ) -> Result<(Vec<Record>, usize), StorageError> {
        let inner = self.read()?;
        Ok(query::find_all(&inner.records, page, page_size, filter))
    }

    fn search(
        &self,
        keyword: &str,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<Record>, usize), StorageError> {
        let inner = self.read()?;
        Ok(query::search(&inner.records, keyword, page, page_size))
    }

    fn cleanup(&self, before: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut inner = self.write()?;
        let cut = inner.records.partition_point(|r| r.timestamp < before);
        inner.records = inner.records.split_off(cut);
        info!("Removed {} record(s) older than {}", cut, before.to_rfc3339());
        Ok(cut)
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        let inner = self.read()?;
        Ok(query::stats(&inner.records, self.max_records))
    }

    fn methods_histogram(&self) -> Result<BTreeMap<String, usize>, StorageError> {
        let inner = self.read()?;
        Ok(query::methods_histogram(&inner.records))
    }

    fn status_histogram(&self) -> Result<BTreeMap<u16, usize>, StorageError> {
        let inner = self.read()?;
        Ok(query::status_histogram(&inner.records))
    }

    fn close(&self) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        inner.closed = true;
        inner.records.clear();
        info!("MemoryStorage closed");
        Ok(())
    }
}
