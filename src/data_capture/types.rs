//! Common data types used across the data_capture subsystem.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which group of fields a [`Record`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Http,
    Streaming,
    Process,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Http => "http",
            RecordKind::Streaming => "streaming",
            RecordKind::Process => "process",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "http" => Some(RecordKind::Http),
            "streaming" => Some(RecordKind::Streaming),
            "process" => Some(RecordKind::Process),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a background process record.
///
/// `Running` is left exactly once, for one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Request/response snapshot of an HTTP exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpExchange {
    pub method: String,
    pub url: String,
    pub status_code: u16,
    pub client_addr: String,
    pub user_agent: String,
    pub request_headers: HashMap<String, String>,
    pub response_headers: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    pub request_body: String,
    pub response_body: String,
}

/// Aggregate left behind by the chunk buffer of a streaming response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamingSummary {
    pub chunk_count: usize,
    /// Per-chunk display cap, `0` = unlimited
    pub max_chunk_size: usize,
    /// Retained chunk ceiling, `0` = unlimited
    pub max_chunks: usize,
    pub total_size: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub process_id: String,
    pub name: String,
    pub process_type: String,
    pub status: ProcessStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warn,
            log::Level::Info => LogLevel::Info,
            log::Level::Debug | log::Level::Trace => LogLevel::Debug,
        }
    }
}

/// Where a log line was emitted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// One structured log line emitted while an exchange was running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
}

/// One captured exchange or process snapshot.
///
/// `kind` decides which of `http`, `streaming` and `process` is populated:
/// `Http` carries `http`, `Streaming` carries `http` and `streaming`, `Process` carries `process`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub kind: RecordKind,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpExchange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<StreamingSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<ProcessInfo>,
    #[serde(default)]
    pub attached_logs: Vec<LogEntry>,
    #[serde(default)]
    pub error: String,
    /// Serialized size, filled in by the store on save
    #[serde(default)]
    pub size_bytes: u64,
}

/// Allocates a process-unique, time-ordered record id.
pub fn new_record_id() -> String {
    Uuid::now_v7().to_string()
}

impl Record {
    pub fn new_http(timestamp: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            kind: RecordKind::Http,
            timestamp,
            duration_ms: 0,
            http: Some(HttpExchange::default()),
            streaming: None,
            process: None,
            attached_logs: Vec::new(),
            error: String::new(),
            size_bytes: 0,
        }
    }

    pub fn new_process(name: &str, process_type: &str, timestamp: DateTime<Utc>) -> Self {
        let id = new_record_id();
        Self {
            process: Some(ProcessInfo {
                process_id: id.clone(),
                name: name.to_string(),
                process_type: process_type.to_string(),
                status: ProcessStatus::Running,
                start_time: timestamp,
                end_time: None,
            }),
            id,
            kind: RecordKind::Process,
            timestamp,
            duration_ms: 0,
            http: None,
            streaming: None,
            attached_logs: Vec::new(),
            error: String::new(),
            size_bytes: 0,
        }
    }

    pub fn method(&self) -> Option<&str> {
        self.http.as_ref().map(|h| h.method.as_str())
    }

    pub fn status_code(&self) -> Option<u16> {
        self.http.as_ref().map(|h| h.status_code)
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// One write observed on a streaming response. Never persisted on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub timestamp: DateTime<Utc>,
    /// True size of the write, before truncation
    pub size: usize,
    pub data: Vec<u8>,
    pub is_binary: bool,
}
