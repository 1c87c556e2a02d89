//! Records for background work that is not tied to an HTTP exchange.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use log::{debug, warn};

use super::coordinator::save_record;
use super::request_logger::RequestLogger;
use super::types::{ProcessStatus, Record};
use crate::configuration::types::RecordLevel;
use crate::storage::Store;

/// A running process record.
///
/// The record is saved as `running` when the handle is created and saved once more, under the
/// same id, when the handle reaches a terminal state. Dropping an unfinished handle marks the
/// process `cancelled`.
pub struct ProcessHandle {
    record: Record,
    started: Instant,
    store: Arc<dyn Store>,
    logger: RequestLogger,
    finished: bool,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.record.id)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    pub(crate) fn start(
        store: Arc<dyn Store>,
        name: &str,
        process_type: &str,
        level: RecordLevel,
    ) -> Self {
        let record = Record::new_process(name, process_type, Utc::now());
        debug!("[{}] Process {} ({}) started", record.id, name, process_type);
        // Both saves stay inline so the terminal state can never be overtaken by the first.
        save_record(&store, record.clone(), false);
        Self {
            logger: RequestLogger::new(record.id.clone(), level),
            record,
            started: Instant::now(),
            store,
            finished: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn logger(&self) -> &RequestLogger {
        &self.logger
    }

    pub fn complete(mut self) -> Record {
        self.finish(ProcessStatus::Completed, None)
    }

    pub fn fail(mut self, error: impl Into<String>) -> Record {
        self.finish(ProcessStatus::Failed, Some(error.into()))
    }

    pub fn cancel(mut self) -> Record {
        self.finish(ProcessStatus::Cancelled, None)
    }

    fn finish(&mut self, status: ProcessStatus, error: Option<String>) -> Record {
        self.finished = true;
        let mut record = self.record.clone();
        record.duration_ms = self.started.elapsed().as_millis() as u64;
        if let Some(info) = record.process.as_mut() {
            info.status = status;
            info.end_time = Some(Utc::now());
        }
        if let Some(error) = error {
            record.error = error;
        }
        record.attached_logs = self.logger.take_entries();
        debug!("[{}] Process finished as {:?}", record.id, status);
        save_record(&self.store, record.clone(), false);
        record
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.finished {
            warn!("[{}] Process handle dropped while running, marking cancelled", self.record.id);
            self.finish(ProcessStatus::Cancelled, None);
        }
    }
}
