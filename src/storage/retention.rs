//! Periodic removal of records older than the configured retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::Store;

/// Pause between two passes of the sweeper started by the capture coordinator.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Oldest timestamp kept by `retention`, `None` when the window reaches past the clock range.
pub fn cutoff(retention: TimeDelta) -> Option<DateTime<Utc>> {
    Utc::now().checked_sub_signed(retention)
}

fn sweep(store: &dyn Store, retention: TimeDelta) -> Result<usize, StorageError> {
    match cutoff(retention) {
        Some(before) => store.cleanup(before),
        None => {
            warn!("Retention window {} out of range, nothing removed", retention);
            Ok(0)
        }
    }
}

/// Runs one cleanup pass with `retention` as the age limit.
pub fn sweep_once(store: &dyn Store, retention: TimeDelta) -> usize {
    match sweep(store, retention) {
        Ok(removed) => {
            debug!("Retention sweep removed {} record(s)", removed);
            removed
        }
        Err(e) => {
            error!("Retention sweep failed: {}", e);
            0
        }
    }
}

/// Spawns a task that sweeps `store` every `every`. The first sweep runs immediately.
///
/// Must be called from within a tokio runtime. Store calls may block on disk, so each pass
/// runs on the blocking pool. The task stops once the store reports it is closed, or when the
/// returned handle is aborted.
pub fn spawn_retention_sweeper(
    store: Arc<dyn Store>,
    retention: TimeDelta,
    every: Duration,
) -> JoinHandle<()> {
    info!(
        "Starting retention sweeper (retention: {}h, interval: {:?})",
        retention.num_hours(),
        every
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let store = Arc::clone(&store);
            let pass = tokio::task::spawn_blocking(move || sweep(store.as_ref(), retention)).await;
            match pass {
                Ok(Ok(removed)) => debug!("Retention sweep removed {} record(s)", removed),
                Ok(Err(StorageError::Closed)) => {
                    info!("Store closed, stopping retention sweeper");
                    break;
                }
                Ok(Err(e)) => error!("Retention sweep failed: {}", e),
                Err(e) => error!("Retention sweep task panicked: {}", e),
            }
        }
    })
}

/// Owns a running sweeper task and aborts it when dropped.
#[derive(Debug)]
pub struct RetentionSweeper {
    task: JoinHandle<()>,
}

impl RetentionSweeper {
    pub fn start(store: Arc<dyn Store>, retention: TimeDelta, every: Duration) -> Self {
        Self {
            task: spawn_retention_sweeper(store, retention, every),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for RetentionSweeper {
    fn drop(&mut self) {
        self.task.abort();
    }
}
