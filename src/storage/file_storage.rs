use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::data_capture::types::Record;
use crate::error_handling::types::StorageError;
use crate::storage::query;
use crate::storage::record_filter::RecordFilter;
use crate::storage::storage_trait::Store;
use crate::storage::types::StoreStats;

const RECORD_EXT: &str = "json";
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.9fZ";
/// Listings retried when a listed file disappears before it could be read.
const READ_ATTEMPTS: usize = 5;

/// Stores one JSON document per record under `<base>/records`.
///
/// File names are `<timestamp>_<id>.json`, e.g. `20240310T080000.000000000Z_<id>.json`, and are
/// ordered by `(timestamp, id)` parsed back from the name, the same eviction order as the
/// in-memory store. Writes go through a dot-prefixed temporary file and a rename, so a reader
/// never observes a half-written record. An upsert that keeps the timestamp replaces the file
/// in a single rename; otherwise the stale file is removed only once the new one is in place.
pub struct FileStorage {
    records_dir: PathBuf,
    max_records: usize,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

fn file_name_for(record: &Record) -> String {
    format!("{}_{}.{}", record.timestamp.format(TIMESTAMP_FORMAT), record.id, RECORD_EXT)
}

/// Splits a record file name into its timestamp and id parts, `None` for anything else in
/// the directory.
fn split_file_name(name: &str) -> Option<(&str, &str)> {
    if name.starts_with('.') {
        return None;
    }
    name.strip_suffix(".json")?.split_once('_')
}

fn id_from_file_name(name: &str) -> Option<&str> {
    split_file_name(name).map(|(_, id)| id)
}

fn io_error(action: &str, path: &Path, e: io::Error) -> StorageError {
    error!("Failed to {} {}: {}", action, path.display(), e);
    StorageError::IoError(e)
}

enum ReadOutcome {
    Found(Record),
    Vanished,
    Skipped,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(base_path: P, max_records: usize) -> Result<Self, StorageError> {
        let records_dir = base_path.as_ref().join("records");
        fs::create_dir_all(&records_dir).map_err(|e| io_error("create", &records_dir, e))?;
        info!(
            "FileStorage initialized at {} (max_records: {})",
            records_dir.display(),
            max_records
        );
        Ok(Self {
            records_dir,
            max_records,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, StorageError> {
        let guard = self.write_lock.lock().map_err(|_| {
            error!("FileStorage lock poisoned");
            StorageError::WriteFailed
        })?;
        self.ensure_open()?;
        Ok(guard)
    }

    /// Record file names, sorted oldest first by `(timestamp, id)`.
    fn file_names(&self) -> Result<Vec<String>, StorageError> {
        let entries =
            fs::read_dir(&self.records_dir).map_err(|e| io_error("list", &self.records_dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error("list", &self.records_dir, e))?;
            if let Ok(name) = entry.file_name().into_string() {
                if split_file_name(&name).is_some() {
                    names.push(name);
                }
            }
        }
        names.sort_by(|a, b| split_file_name(a).cmp(&split_file_name(b)));
        Ok(names)
    }

    fn read_record(&self, name: &str) -> ReadOutcome {
        let path = self.records_dir.join(name);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Record file {} replaced while reading", path.display());
                return ReadOutcome::Vanished;
            }
            Err(e) => {
                warn!("Skipping unreadable record file {}: {}", path.display(), e);
                return ReadOutcome::Skipped;
            }
        };
        match serde_json::from_slice(&content) {
            Ok(record) => ReadOutcome::Found(record),
            Err(e) => {
                warn!("Skipping corrupt record file {}: {}", path.display(), e);
                ReadOutcome::Skipped
            }
        }
    }

    /// Reads every record, one per id. A listing is retried when a concurrent upsert or
    /// eviction removed one of its files.
    fn load_all(&self) -> Result<Vec<Record>, StorageError> {
        let mut records = Vec::new();
        for _ in 0..READ_ATTEMPTS {
            records.clear();
            let mut seen: HashSet<String> = HashSet::new();
            let mut vanished = false;
            for name in self.file_names()?.iter().rev() {
                let Some(id) = id_from_file_name(name) else {
                    continue;
                };
                if seen.contains(id) {
                    continue;
                }
                match self.read_record(name) {
                    ReadOutcome::Found(record) => {
                        seen.insert(id.to_string());
                        records.push(record);
                    }
                    ReadOutcome::Vanished => vanished = true,
                    ReadOutcome::Skipped => {}
                }
            }
            if !vanished {
                break;
            }
        }
        debug!("Loaded {} record(s) from {}", records.len(), self.records_dir.display());
        Ok(records)
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        let path = self.records_dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", &path, e)),
        }
    }
}

impl Store for FileStorage {
    fn save(&self, record: &Record) -> Result<(), StorageError> {
        let record = query::with_size(record)?;
        if record.id.is_empty() || record.id.contains(['/', '\\']) {
            error!("Refusing to store record with invalid id {:?}", record.id);
            return Err(StorageError::WriteFailed);
        }
        let content = serde_json::to_vec_pretty(&record)?;
        let _guard = self.lock()?;

        let name = file_name_for(&record);
        let tmp = self.records_dir.join(format!(".{}.tmp", name));
        let path = self.records_dir.join(&name);
        fs::write(&tmp, &content).map_err(|e| io_error("write", &tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_error("move into place", &path, e));
        }
        debug!("[{}] Saved record to {}", record.id, path.display());

        let mut names = self.file_names()?;
        let stale: Vec<String> = names
            .iter()
            .filter(|n| **n != name && id_from_file_name(n) == Some(record.id.as_str()))
            .cloned()
            .collect();
        for old in &stale {
            self.remove(old)?;
            debug!("[{}] Replaced {}", record.id, old);
        }
        names.retain(|n| !stale.contains(n));

        if self.max_records > 0 && names.len() > self.max_records {
            let excess = names.len() - self.max_records;
            for name in &names[..excess] {
                self.remove(name)?;
                debug!("Evicted {}, capacity {} reached", name, self.max_records);
            }
        }
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Record>, StorageError> {
        self.ensure_open()?;
        for _ in 0..READ_ATTEMPTS {
            let names = self.file_names()?;
            let mut candidates = names
                .iter()
                .rev()
                .filter(|name| id_from_file_name(name) == Some(id))
                .peekable();
            if candidates.peek().is_none() {
                return Ok(None);
            }
            let mut vanished = false;
            for name in candidates {
                match self.read_record(name) {
                    ReadOutcome::Found(record) => return Ok(Some(record)),
                    ReadOutcome::Vanished => vanished = true,
                    ReadOutcome::Skipped => {}
                }
            }
            if !vanished {
                return Ok(None);
            }
        }
        warn!("[{}] Record kept changing while being read", id);
        Ok(None)
    }

    fn find_all(
        &self,
        page: usize,
        page_size: usize,
        filter: &RecordFilter,
    ) -> Result<(Vec<Record>, usize), StorageError> {
        self.ensure_open()?;
        let records = self.load_all()?;
        Ok(query::find_all(&records, page, page_size, filter))
    }

    fn search(
        &self,
        keyword: &str,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<Record>, usize), StorageError> {
        self.ensure_open()?;
        let records = self.load_all()?;
        Ok(query::search(&records, keyword, page, page_size))
    }

    fn cleanup(&self, before: DateTime<Utc>) -> Result<usize, StorageError> {
        let _guard = self.lock()?;
        let mut removed = 0usize;
        for name in self.file_names()? {
            let ReadOutcome::Found(record) = self.read_record(&name) else {
                continue;
            };
            if record.timestamp < before {
                self.remove(&name)?;
                removed += 1;
            }
        }
        info!("Removed {} record(s) older than {}", removed, before.to_rfc3339());
        Ok(removed)
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        self.ensure_open()?;
        let records = self.load_all()?;
        Ok(query::stats(&records, self.max_records))
    }

    fn methods_histogram(&self) -> Result<BTreeMap<String, usize>, StorageError> {
        self.ensure_open()?;
        Ok(query::methods_histogram(&self.load_all()?))
    }

    fn status_histogram(&self) -> Result<BTreeMap<u16, usize>, StorageError> {
        self.ensure_open()?;
        Ok(query::status_histogram(&self.load_all()?))
    }

    fn close(&self) -> Result<(), StorageError> {
        let _guard = self.lock()?;
        self.closed.store(true, Ordering::Release);
        info!("FileStorage at {} closed", self.records_dir.display());
        Ok(())
    }
}
