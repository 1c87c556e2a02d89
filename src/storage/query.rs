//! Stateless filtering, keyword search, sorting and pagination over stored records.
//!
//! Backends hand over whatever they currently hold; every function here is pure, so both the
//! in-memory and the file backend produce identical results for the same set of records.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use bytesize::ByteSize;

use super::record_filter::RecordFilter;
use super::types::StoreStats;
use crate::data_capture::types::{Record, RecordKind};
use crate::error_handling::types::StorageError;

/// Copy of `record` with `size_bytes` set to its serialized JSON length.
pub fn with_size(record: &Record) -> Result<Record, StorageError> {
    let mut sized = record.clone();
    sized.size_bytes = 0;
    sized.size_bytes = serde_json::to_vec(&sized)?.len() as u64;
    Ok(sized)
}

pub fn matches_filter(record: &Record, filter: &RecordFilter) -> bool {
    if let Some(ref method) = filter.method {
        match record.method() {
            Some(m) if m.eq_ignore_ascii_case(method) => {}
            _ => return false,
        }
    }
    if let Some(code) = filter.status_code {
        if record.status_code() != Some(code) {
            return false;
        }
    }
    if let Some(ref pid) = filter.process_id {
        if record.process.as_ref().map(|p| &p.process_id) != Some(pid) {
            return false;
        }
    }
    if let Some(ref name) = filter.process_name {
        if record.process.as_ref().map(|p| &p.name) != Some(name) {
            return false;
        }
    }
    if let Some(kind) = filter.kind {
        if record.kind != kind {
            return false;
        }
    }
    if let Some(ref url) = filter.url {
        if !record.http.as_ref().is_some_and(|h| h.url.contains(url.as_str())) {
            return false;
        }
    }
    if let Some(ref addr) = filter.client_addr {
        if !record
            .http
            .as_ref()
            .is_some_and(|h| h.client_addr.contains(addr.as_str()))
        {
            return false;
        }
    }
    if let Some(has_error) = filter.has_error {
        if record.has_error() != has_error {
            return false;
        }
    }
    if let Some(start) = filter.start_time {
        if record.timestamp < start {
            return false;
        }
    }
    if let Some(end) = filter.end_time {
        if record.timestamp > end {
            return false;
        }
    }
    true
}

/// `needle` must already be lowercase.
fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// True when any searched field contains `keyword`, ignoring case. An empty keyword matches.
pub fn matches_keyword(record: &Record, keyword: &str) -> bool {
    let needle = keyword.to_lowercase();
    if needle.is_empty() {
        return true;
    }
    if contains_folded(&record.error, &needle) {
        return true;
    }
    let Some(http) = record.http.as_ref() else {
        return false;
    };
    contains_folded(&http.url, &needle)
        || contains_folded(&http.request_body, &needle)
        || contains_folded(&http.response_body, &needle)
        || http
            .request_headers
            .iter()
            .chain(http.response_headers.iter())
            .any(|(k, v)| contains_folded(k, &needle) || contains_folded(v, &needle))
}

/// Newest first; equal timestamps fall back to the time-ordered id.
pub fn newest_first(a: &Record, b: &Record) -> Ordering {
    b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id))
}

/// Oldest first, the eviction order.
pub fn oldest_first(a: &Record, b: &Record) -> Ordering {
    newest_first(b, a)
}

/// Slices a sorted result set. Pages are 1-based (`0` behaves like `1`); `page_size == 0`
/// returns everything.
pub fn paginate<T>(items: &[T], page: usize, page_size: usize) -> &[T] {
    if page_size == 0 {
        return items;
    }
    let offset = page.max(1).saturating_sub(1).saturating_mul(page_size);
    if offset >= items.len() {
        return &[];
    }
    let end = offset.saturating_add(page_size).min(items.len());
    &items[offset..end]
}

/// Filters, sorts newest first and paginates. Returns the page and the matching count.
pub fn select<'a, I, P>(
    records: I,
    page: usize,
    page_size: usize,
    predicate: P,
) -> (Vec<Record>, usize)
where
    I: IntoIterator<Item = &'a Record>,
    P: Fn(&Record) -> bool,
{
    let mut matched: Vec<&Record> = records.into_iter().filter(|r| predicate(r)).collect();
    matched.sort_by(|a, b| newest_first(a, b));
    let total = matched.len();
    let page = paginate(&matched, page, page_size)
        .iter()
        .map(|r| (*r).clone())
        .collect();
    (page, total)
}

pub fn find_all<'a, I>(
    records: I,
    page: usize,
    page_size: usize,
    filter: &RecordFilter,
) -> (Vec<Record>, usize)
where
    I: IntoIterator<Item = &'a Record>,
{
    select(records, page, page_size, |r| matches_filter(r, filter))
}

pub fn search<'a, I>(
    records: I,
    keyword: &str,
    page: usize,
    page_size: usize,
) -> (Vec<Record>, usize)
where
    I: IntoIterator<Item = &'a Record>,
{
    let keyword = keyword.to_lowercase();
    select(records, page, page_size, |r| matches_keyword(r, &keyword))
}

pub fn stats<'a, I>(records: I, max_records: usize) -> StoreStats
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut stats = StoreStats {
        max_records,
        ..Default::default()
    };
    let mut total_duration = 0u128;
    for record in records {
        stats.total_records += 1;
        match record.kind {
            RecordKind::Http => stats.http_records += 1,
            RecordKind::Streaming => stats.streaming_records += 1,
            RecordKind::Process => stats.process_records += 1,
        }
        if record.has_error() {
            stats.error_records += 1;
        }
        total_duration += record.duration_ms as u128;
        stats.storage_bytes += record.size_bytes;
        stats.oldest = Some(stats.oldest.map_or(record.timestamp, |t| t.min(record.timestamp)));
        stats.newest = Some(stats.newest.map_or(record.timestamp, |t| t.max(record.timestamp)));
    }
    if stats.total_records > 0 {
        stats.avg_duration_ms = total_duration as f64 / stats.total_records as f64;
    }
    stats.storage_size = ByteSize(stats.storage_bytes).to_string();
    stats
}

pub fn methods_histogram<'a, I>(records: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut histogram = BTreeMap::new();
    for method in records.into_iter().filter_map(|r| r.method()) {
        if !method.is_empty() {
            *histogram.entry(method.to_ascii_uppercase()).or_insert(0) += 1;
        }
    }
    histogram
}

pub fn status_histogram<'a, I>(records: I) -> BTreeMap<u16, usize>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut histogram = BTreeMap::new();
    for code in records.into_iter().filter_map(|r| r.status_code()) {
        if code != 0 {
            *histogram.entry(code).or_insert(0) += 1;
        }
    }
    histogram
}
