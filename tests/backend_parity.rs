//! The memory and file backends must answer every query identically for the same records.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use ruche::configuration::{Config, StorageBackend, StorageConfig};
use ruche::data_capture::types::{ProcessStatus, StreamingSummary};
use ruche::data_capture::{CaptureCoordinator, Record, RecordKind};
use ruche::storage::record_filter::{by_kind, by_method, by_time_range};
use ruche::storage::{FileStorage, MemoryStorage, RecordFilter, Store};
use serial_test::serial;
use tempfile::TempDir;

fn at(offset_secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap() + Duration::seconds(offset_secs)
}

fn http(id: &str, offset: i64, method: &str, url: &str, status: u16) -> Record {
    let mut record = Record::new_http(at(offset));
    record.id = id.to_string();
    record.duration_ms = offset as u64;
    let http = record.http.as_mut().unwrap();
    http.method = method.into();
    http.url = url.into();
    http.status_code = status;
    http.client_addr = format!("10.0.0.{}:4000", offset / 10 + 1);
    record
}

fn process(id: &str, offset: i64, name: &str, status: ProcessStatus, error: &str) -> Record {
    let mut record = Record::new_process(name, "job", at(offset));
    record.id = id.to_string();
    let info = record.process.as_mut().unwrap();
    info.process_id = id.to_string();
    info.status = status;
    record.error = error.into();
    record
}

fn fixture() -> Vec<Record> {
    let mut created = http("r02", 10, "POST", "/api/users", 201);
    created.http.as_mut().unwrap().request_body = "{\"name\":\"Ada\"}".into();

    let mut failed = http("r03", 20, "GET", "/api/orders", 500);
    failed.error = "upstream timeout".into();

    let mut missing = http("r04", 30, "DELETE", "/api/users/7", 404);
    let headers = &mut missing.http.as_mut().unwrap().response_headers;
    headers.insert("X-Trace".into(), "abc123".into());

    let mut events = http("r05", 40, "GET", "/events", 200);
    events.kind = RecordKind::Streaming;
    events.streaming = Some(StreamingSummary {
        chunk_count: 3,
        max_chunk_size: 1024,
        max_chunks: 100,
        total_size: "27 B".into(),
    });

    vec![
        http("r01", 0, "GET", "/api/users", 200),
        created,
        failed,
        missing,
        events,
        process("r06", 50, "reindex", ProcessStatus::Completed, ""),
        process("r07", 60, "backup", ProcessStatus::Failed, "disk full"),
        // same timestamp, ids sharing a prefix
        http("r08", 70, "GET", "/tie", 200),
        http("r08-b", 70, "GET", "/tie", 200),
    ]
}

struct Backends {
    _dir: TempDir,
    memory: MemoryStorage,
    file: FileStorage,
}

fn loaded(capacity: usize) -> Backends {
    let dir = TempDir::new().unwrap();
    let backends = Backends {
        memory: MemoryStorage::new(capacity),
        file: FileStorage::new(dir.path(), capacity).unwrap(),
        _dir: dir,
    };
    for record in fixture() {
        backends.memory.save(&record).unwrap();
        backends.file.save(&record).unwrap();
    }
    backends
}

fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

#[test]
fn filters_agree() {
    let backends = loaded(0);
    let table: Vec<(&str, RecordFilter, usize)> = vec![
        ("everything", RecordFilter::default(), 9),
        ("method", by_method("get"), 5),
        ("status", RecordFilter::from_pairs([("status", "500")]), 1),
        ("streaming", by_kind(RecordKind::Streaming), 1),
        ("process", by_kind(RecordKind::Process), 2),
        ("process name", RecordFilter::from_pairs([("process_name", "backup")]), 1),
        ("url", RecordFilter::from_pairs([("url", "/api/users")]), 3),
        ("client", RecordFilter::from_pairs([("client_addr", "10.0.0.1:")]), 1),
        ("errors", RecordFilter::from_pairs([("has_error", "true")]), 2),
        ("no errors", RecordFilter::from_pairs([("has_error", "false")]), 7),
        ("time range", by_time_range(at(10), at(40)), 4),
    ];

    for (name, filter, expected) in &table {
        let (memory, memory_total) = backends.memory.find_all(1, 0, filter).unwrap();
        let (file, file_total) = backends.file.find_all(1, 0, filter).unwrap();
        assert_eq!(memory_total, *expected, "{}: memory total", name);
        assert_eq!(file_total, *expected, "{}: file total", name);
        assert_eq!(ids(&memory), ids(&file), "{}: order", name);
        assert_eq!(memory, file, "{}: contents", name);
    }
}

#[test]
fn pages_agree() {
    let backends = loaded(0);
    for page in 0..=4 {
        let (memory, memory_total) =
            backends.memory.find_all(page, 4, &RecordFilter::default()).unwrap();
        let (file, file_total) = backends.file.find_all(page, 4, &RecordFilter::default()).unwrap();
        assert_eq!(memory_total, file_total);
        assert_eq!(ids(&memory), ids(&file), "page {}", page);
    }
    let (first, _) = backends.file.find_all(1, 3, &RecordFilter::default()).unwrap();
    assert_eq!(ids(&first), vec!["r08-b", "r08", "r07"]);
}

#[test]
fn search_agrees() {
    let backends = loaded(0);
    let table = [
        ("users", 3),
        ("ADA", 1),
        ("timeout", 1),
        ("abc123", 1),
        ("disk full", 1),
        ("x-trace", 1),
        ("nowhere", 0),
    ];
    for (keyword, expected) in table {
        let (memory, memory_total) = backends.memory.search(keyword, 1, 0).unwrap();
        let (file, file_total) = backends.file.search(keyword, 1, 0).unwrap();
        assert_eq!(memory_total, expected, "{}", keyword);
        assert_eq!(file_total, expected, "{}", keyword);
        assert_eq!(ids(&memory), ids(&file), "{}", keyword);
    }
}

#[test]
fn eviction_agrees() {
    for capacity in [1, 2, 5] {
        let backends = loaded(capacity);
        let (memory, _) = backends.memory.find_all(1, 0, &RecordFilter::default()).unwrap();
        let (file, _) = backends.file.find_all(1, 0, &RecordFilter::default()).unwrap();
        assert_eq!(memory.len(), capacity);
        assert_eq!(ids(&memory), ids(&file), "capacity {}", capacity);
    }
    let backends = loaded(1);
    assert!(backends.file.find_by_id("r08-b").unwrap().is_some());
    assert!(backends.memory.find_by_id("r08-b").unwrap().is_some());
}

#[test]
fn aggregates_agree() {
    let backends = loaded(0);
    assert_eq!(backends.memory.stats().unwrap(), backends.file.stats().unwrap());
    assert_eq!(
        backends.memory.methods_histogram().unwrap(),
        backends.file.methods_histogram().unwrap()
    );
    assert_eq!(
        backends.memory.status_histogram().unwrap(),
        backends.file.status_histogram().unwrap()
    );

    let cutoff = at(35);
    assert_eq!(backends.memory.cleanup(cutoff).unwrap(), 4);
    assert_eq!(backends.file.cleanup(cutoff).unwrap(), 4);
    assert_eq!(backends.memory.stats().unwrap(), backends.file.stats().unwrap());
}

#[test]
#[serial]
fn process_updates_agree() {
    let dir = TempDir::new().unwrap();
    let memory: Arc<dyn Store> = Arc::new(MemoryStorage::new(0));
    let file_config = Config {
        storage: StorageConfig {
            backend: StorageBackend::File,
            path: Some(dir.path().to_path_buf()),
        },
        ..Default::default()
    };
    let on_file = CaptureCoordinator::from_config(file_config).unwrap();
    let in_memory = CaptureCoordinator::new(Config::default(), Arc::clone(&memory)).unwrap();

    for coordinator in [&on_file, &in_memory] {
        let handle = coordinator.start_process("reindex", "job").unwrap();
        let id = handle.id().to_string();
        let running = coordinator.store().find_by_id(&id).unwrap().unwrap();
        assert_eq!(running.process.unwrap().status, ProcessStatus::Running);

        handle.fail("disk full");
        let (records, total) = coordinator
            .store()
            .find_all(1, 0, &by_kind(RecordKind::Process))
            .unwrap();
        assert_eq!(total, 1);
        let info = records[0].process.as_ref().unwrap();
        assert_eq!(info.status, ProcessStatus::Failed);
        assert_eq!(records[0].error, "disk full");
    }
}
