//! Structured log lines attached to a single exchange.
//!
//! A [`RequestLogger`] is an immutable value: [`RequestLogger::with_field`] returns a child that
//! owns a copy of the parent's fields plus the new one. Parent and children share only the
//! entry sink, which is the sole piece of state behind a lock.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::types::{LogEntry, LogLevel, SourceLocation};
use crate::configuration::types::RecordLevel;

/// Log target used when exchange log lines are mirrored to the `log` facade.
pub const EXCHANGE_LOG_TARGET: &str = "ruche::exchange";

/// A log message, either plain text or an already structured value.
#[derive(Debug, Clone, PartialEq)]
pub enum LogMessage {
    Text(String),
    Structured(Value),
}

impl LogMessage {
    pub fn render(&self) -> String {
        match self {
            LogMessage::Text(text) => text.clone(),
            LogMessage::Structured(Value::String(text)) => text.clone(),
            LogMessage::Structured(value) => value.to_string(),
        }
    }
}

impl From<&str> for LogMessage {
    fn from(value: &str) -> Self {
        LogMessage::Text(value.to_string())
    }
}

impl From<String> for LogMessage {
    fn from(value: String) -> Self {
        LogMessage::Text(value)
    }
}

impl From<Value> for LogMessage {
    fn from(value: Value) -> Self {
        LogMessage::Structured(value)
    }
}

/// Converts a field value to JSON, falling back to its `Debug` rendering.
pub fn field_value<T: Serialize + fmt::Debug + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| Value::String(format!("{:?}", value)))
}

#[derive(Clone)]
pub struct RequestLogger {
    record_id: String,
    min_level: RecordLevel,
    fields: BTreeMap<String, Value>,
    sink: Arc<Mutex<Vec<LogEntry>>>,
}

impl fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogger")
            .field("record_id", &self.record_id)
            .field("min_level", &self.min_level)
            .field("fields", &self.fields)
            .finish()
    }
}

impl RequestLogger {
    pub fn new(record_id: impl Into<String>, min_level: RecordLevel) -> Self {
        Self {
            record_id: record_id.into(),
            min_level,
            fields: BTreeMap::new(),
            sink: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Derives a child logger carrying one more field. The parent is left untouched.
    pub fn with_field<T: Serialize + fmt::Debug + ?Sized>(&self, key: &str, value: &T) -> Self {
        let mut child = self.clone();
        child.fields.insert(key.to_string(), field_value(value));
        child
    }

    pub fn with_fields<I>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut child = self.clone();
        child.fields.extend(fields);
        child
    }

    /// Records one entry with an explicit source location.
    pub fn log_at(
        &self,
        level: log::Level,
        message: impl Into<LogMessage>,
        source: Option<SourceLocation>,
    ) {
        let message = message.into().render();
        log::log!(target: EXCHANGE_LOG_TARGET, level, "[{}] {}", self.record_id, message);

        if !self.min_level.allows(level) {
            return;
        }
        let entry = LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::from(level),
            message,
            fields: self.fields.clone(),
            source,
        };
        self.sink
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    #[track_caller]
    fn log_here(&self, level: log::Level, message: LogMessage) {
        let caller = Location::caller();
        self.log_at(
            level,
            message,
            Some(SourceLocation {
                file: caller.file().to_string(),
                line: caller.line(),
                function: None,
            }),
        );
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<LogMessage>) {
        self.log_here(log::Level::Error, message.into());
    }

    #[track_caller]
    pub fn warn(&self, message: impl Into<LogMessage>) {
        self.log_here(log::Level::Warn, message.into());
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<LogMessage>) {
        self.log_here(log::Level::Info, message.into());
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<LogMessage>) {
        self.log_here(log::Level::Debug, message.into());
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drains the shared sink.
    pub fn take_entries(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.sink.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Logs through a [`RequestLogger`] with file, line and enclosing module recorded.
///
/// ```
/// use ruche::capture_log;
/// use ruche::configuration::types::RecordLevel;
/// use ruche::data_capture::request_logger::RequestLogger;
///
/// let logger = RequestLogger::new("req-1", RecordLevel::Info);
/// capture_log!(logger, log::Level::Warn, "retrying upstream, attempt {}", 2);
/// assert_eq!(logger.entries()[0].message, "retrying upstream, attempt 2");
/// ```
#[macro_export]
macro_rules! capture_log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log_at(
            $level,
            format!($($arg)+),
            Some($crate::data_capture::types::SourceLocation {
                file: file!().to_string(),
                line: line!(),
                function: Some(module_path!().to_string()),
            }),
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn child_loggers_do_not_mutate_parent() {
        let parent = RequestLogger::new("r1", RecordLevel::Info).with_field("user", "alice");
        let child = parent.with_field("attempt", &3);

        assert_eq!(parent.fields().len(), 1);
        assert_eq!(child.fields().len(), 2);

        child.info("from child");
        parent.info("from parent");
        let entries = parent.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].fields.get("attempt"), Some(&Value::from(3)));
        assert!(entries[1].fields.get("attempt").is_none());
    }

    #[test]
    fn level_threshold_filters_entries() {
        let logger = RequestLogger::new("r2", RecordLevel::Warn);
        logger.info("ignored");
        logger.debug("ignored");
        logger.warn("kept");
        logger.error("kept too");
        let levels: Vec<LogLevel> = logger.entries().iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![LogLevel::Warn, LogLevel::Error]);

        let silent = RequestLogger::new("r3", RecordLevel::Silent);
        silent.error("nothing");
        assert!(silent.entries().is_empty());
    }

    #[test]
    fn caller_location_is_recorded() {
        let logger = RequestLogger::new("r4", RecordLevel::Info);
        logger.info("here");
        let source = logger.entries()[0].source.clone().unwrap();
        assert!(source.file.ends_with("request_logger.rs"));
        assert!(source.line > 0);
        assert!(source.function.is_none());
    }

    #[test]
    fn macro_records_module_path() {
        let logger = RequestLogger::new("r5", RecordLevel::Info);
        capture_log!(logger, log::Level::Info, "value={}", 7);
        let entry = &logger.entries()[0];
        assert_eq!(entry.message, "value=7");
        let function = entry.source.as_ref().and_then(|s| s.function.clone()).unwrap();
        assert!(function.contains("request_logger"));
    }

    #[test]
    fn structured_messages_render_once() {
        let logger = RequestLogger::new("r6", RecordLevel::Info);
        logger.info(serde_json::json!({"event": "cache_miss"}));
        logger.info(Value::String("plain".into()));
        let entries = logger.entries();
        assert_eq!(entries[0].message, r#"{"event":"cache_miss"}"#);
        assert_eq!(entries[1].message, "plain");
    }

    #[test]
    fn unserializable_fields_fall_back_to_debug() {
        let mut map = HashMap::new();
        map.insert((1u8, 2u8), "tuple key");
        let logger = RequestLogger::new("r7", RecordLevel::Info).with_field("weird", &map);
        match logger.fields().get("weird") {
            Some(Value::String(rendered)) => assert!(rendered.contains("tuple key")),
            other => panic!("unexpected field {:?}", other),
        }
    }

    #[test]
    fn take_entries_drains_shared_sink() {
        let logger = RequestLogger::new("r8", RecordLevel::Info);
        let child = logger.with_field("k", "v");
        child.info("one");
        assert_eq!(logger.take_entries().len(), 1);
        assert!(child.entries().is_empty());
    }

    #[test]
    fn concurrent_children_share_the_sink() {
        let logger = RequestLogger::new("r9", RecordLevel::Info);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let child = logger.with_field("worker", &i);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        child.info("tick");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(logger.entries().len(), 200);
    }
}
