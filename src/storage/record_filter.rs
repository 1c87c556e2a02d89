//! Record filter criteria and helpers for building them.
//!
//! A filter can be built field by field, through the `by_*` convenience builders, or from
//! loosely typed key/value pairs (query strings, CLI flags) with [`RecordFilter::from_pairs`],
//! which ignores keys it does not know.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::data_capture::types::RecordKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Exact match, case-insensitive
    pub method: Option<String>,
    pub status_code: Option<u16>,
    pub process_id: Option<String>,
    pub process_name: Option<String>,
    pub kind: Option<RecordKind>,
    /// Substring of the URL
    pub url: Option<String>,
    /// Substring of the client address
    pub client_addr: Option<String>,
    pub has_error: Option<bool>,
    /// Inclusive lower bound
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub end_time: Option<DateTime<Utc>>,
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl RecordFilter {
    /// Builds a filter from string pairs. Unknown keys and unparseable values are ignored.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut filter = RecordFilter::default();
        for (key, value) in pairs {
            if value.is_empty() {
                continue;
            }
            match key {
                "method" => filter.method = Some(value.to_string()),
                "status" | "status_code" => filter.status_code = value.trim().parse().ok(),
                "process_id" => filter.process_id = Some(value.to_string()),
                "process_name" => filter.process_name = Some(value.to_string()),
                "kind" | "type" => filter.kind = RecordKind::parse(value),
                "url" => filter.url = Some(value.to_string()),
                "client_addr" | "client_ip" => filter.client_addr = Some(value.to_string()),
                "has_error" | "error" => filter.has_error = parse_bool(value),
                "start_time" => filter.start_time = parse_time(value),
                "end_time" => filter.end_time = parse_time(value),
                other => debug!("Ignoring unknown filter key {}", other),
            }
        }
        filter
    }

    pub fn is_empty(&self) -> bool {
        *self == RecordFilter::default()
    }
}

/// Build a `RecordFilter` that matches records by exact HTTP method.
pub fn by_method<S: Into<String>>(method: S) -> RecordFilter {
    RecordFilter { method: Some(method.into()), ..Default::default() }
}

/// Build a `RecordFilter` that matches records of one kind.
pub fn by_kind(kind: RecordKind) -> RecordFilter {
    RecordFilter { kind: Some(kind), ..Default::default() }
}

/// Build a `RecordFilter` that matches records whose timestamp falls in `[start, end]`.
pub fn by_time_range(start: DateTime<Utc>, end: DateTime<Utc>) -> RecordFilter {
    RecordFilter { start_time: Some(start), end_time: Some(end), ..Default::default() }
}
