use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate figures over everything a store currently holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_records: usize,
    pub http_records: usize,
    pub streaming_records: usize,
    pub process_records: usize,
    pub error_records: usize,
    pub avg_duration_ms: f64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    /// Sum of the serialized record sizes
    pub storage_bytes: u64,
    /// `storage_bytes` in human readable form
    pub storage_size: String,
    /// Capacity bound, `0` = unlimited
    pub max_records: usize,
}
