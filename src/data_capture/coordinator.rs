//! Per-exchange capture lifecycle.
//!
//! A [`CaptureCoordinator`] is built once per service and shared by every request handler. For
//! each exchange it decides whether to capture at all, snapshots the inbound request and hands
//! out an [`ActiveCapture`] that the handler owns exclusively until it calls
//! [`ActiveCapture::finish`] with what the [`ResponseTap`] observed.
//!
//! ```text
//! pending -> capturing -> finalizing -> saved
//!    \
//!     -> skipped (disabled, dashboard path, skip rule, not sampled)
//! ```
//!
//! Store failures never reach the handler: they are logged and the exchange completes normally.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use bytesize::ByteSize;
use chrono::Utc;
use log::{debug, error, info, trace, warn};
use tokio::runtime::Handle;

use super::process::ProcessHandle;
use super::request_logger::RequestLogger;
use super::response_tap::{header, CapturedBody, ResponseTap, TapSettings, TappedResponse};
use super::types::{Record, RecordKind, StreamingSummary};
use crate::configuration::Config;
use crate::content_inspection::classifier::{oversized_placeholder, render_payload};
use crate::content_inspection::multipart::{decompose_multipart, is_multipart};
use crate::error_handling::types::{CaptureError, ConfigError};
use crate::storage::retention::{RetentionSweeper, DEFAULT_SWEEP_INTERVAL};
use crate::storage::{open_store, Store};

pub const ABORTED_ERROR: &str = "exchange aborted before completion";

/// Inbound half of an exchange, as handed over by the interception adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundRequest {
    pub method: String,
    /// Request target, absolute or origin form
    pub url: String,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub client_addr: String,
    pub body: Vec<u8>,
}

impl InboundRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_client_addr(mut self, addr: impl Into<String>) -> Self {
        self.client_addr = addr.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Drains `reader` into the body. Bytes read before a failure are kept.
    pub fn read_body<R: Read>(&mut self, mut reader: R) -> Result<(), CaptureError> {
        self.body.clear();
        reader
            .read_to_end(&mut self.body)
            .map(|_| ())
            .map_err(CaptureError::BodyReadError)
    }

    /// Path component of the request target, without scheme, authority or query.
    pub fn path(&self) -> &str {
        let target = match self.url.find("://") {
            Some(scheme_end) => {
                let rest = &self.url[scheme_end + 3..];
                rest.find('/').map_or("/", |i| &rest[i..])
            }
            None => self.url.as_str(),
        };
        let end = target.find(['?', '#']).unwrap_or(target.len());
        &target[..end]
    }
}

/// Why an exchange was not captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    DashboardPath,
    SkipPath,
    SkipMethod,
    NotSampled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "capture disabled"),
            SkipReason::DashboardPath => write!(f, "dashboard path"),
            SkipReason::SkipPath => write!(f, "path matches a skip rule"),
            SkipReason::SkipMethod => write!(f, "method is skipped"),
            SkipReason::NotSampled => write!(f, "not sampled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Inbound request snapshotted, no response writer tapped yet
    Pending,
    Capturing,
    Finalizing,
    Saved,
}

type Sampler = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Hands a finished record to the store, on the blocking pool when asked to and a runtime is
/// available. Errors are logged, never returned.
pub(crate) fn save_record(store: &Arc<dyn Store>, record: Record, background: bool) {
    if background {
        if let Ok(handle) = Handle::try_current() {
            let store = Arc::clone(store);
            handle.spawn_blocking(move || save_logged(store.as_ref(), &record));
            return;
        }
        trace!("[{}] No tokio runtime, saving inline", record.id);
    }
    save_logged(store.as_ref(), &record);
}

fn save_logged(store: &dyn Store, record: &Record) {
    match store.save(record) {
        Ok(()) => debug!("[{}] Saved {} record", record.id, record.kind),
        Err(e) => error!("[{}] Failed to save record: {}", record.id, e),
    }
}

/// Decides which exchanges are captured and builds their records.
#[derive(Clone)]
pub struct CaptureCoordinator {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    sampler: Sampler,
    sweeper: Option<Arc<RetentionSweeper>>,
}

impl fmt::Debug for CaptureCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureCoordinator")
            .field("config", &self.config)
            .field("sweeper", &self.sweeper.is_some())
            .finish_non_exhaustive()
    }
}

impl CaptureCoordinator {
    /// Validates `config` and binds the coordinator to an existing store.
    pub fn new(config: Config, store: Arc<dyn Store>) -> Result<Self, ConfigError> {
        let config = config.validated()?;
        info!(
            "Capture coordinator ready (enabled: {}, sample_rate: {}, max_records: {})",
            config.enabled, config.sample_rate, config.max_records
        );
        Ok(Self {
            config: Arc::new(config),
            store,
            sampler: Arc::new(rand::random::<f64>),
            sweeper: None,
        })
    }

    /// Validates `config` and opens the store it selects.
    ///
    /// When a retention window is configured and a tokio runtime is available, a retention
    /// sweeper is started for the store and stopped once the last coordinator clone is dropped.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let config = config.validated()?;
        let store = open_store(&config)?;
        let mut coordinator = Self::new(config, store)?;
        if let Some(retention) = coordinator.config.retention() {
            match Handle::try_current() {
                Ok(_) => {
                    coordinator.sweeper = Some(Arc::new(RetentionSweeper::start(
                        Arc::clone(&coordinator.store),
                        retention,
                        DEFAULT_SWEEP_INTERVAL,
                    )));
                }
                Err(_) => debug!("No tokio runtime, retention sweeper not started"),
            }
        }
        Ok(coordinator)
    }

    /// Replaces the uniform `[0, 1)` draw used for sampling.
    pub fn with_sampler<F>(mut self, sampler: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.sampler = Arc::new(sampler);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn retention_sweeper(&self) -> Option<&RetentionSweeper> {
        self.sweeper.as_deref()
    }

    pub fn tap_settings(&self) -> TapSettings {
        TapSettings {
            max_body_size: self.config.max_body_size(),
            streaming: self.config.streaming.clone(),
        }
    }

    /// Returns why `request` would not be captured, `None` if it would be.
    pub fn skip_reason(&self, request: &InboundRequest) -> Option<SkipReason> {
        let config = &self.config;
        if !config.enabled {
            return Some(SkipReason::Disabled);
        }
        let path = request.path();
        if !config.dashboard_path.is_empty() && under_prefix(path, &config.dashboard_path) {
            return Some(SkipReason::DashboardPath);
        }
        if config
            .skip_paths
            .iter()
            .any(|p| !p.is_empty() && under_prefix(path, p))
        {
            return Some(SkipReason::SkipPath);
        }
        if config
            .skip_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&request.method))
        {
            return Some(SkipReason::SkipMethod);
        }
        if config.sample_rate < 1.0 {
            let draw = (self.sampler)();
            if draw >= config.sample_rate {
                return Some(SkipReason::NotSampled);
            }
        }
        None
    }

    /// Starts capturing `request`, or reports why it is skipped.
    pub fn begin(&self, request: &InboundRequest) -> Result<ActiveCapture, SkipReason> {
        if let Some(reason) = self.skip_reason(request) {
            trace!("Skipping {} {}: {}", request.method, request.url, reason);
            return Err(reason);
        }

        let mut record = Record::new_http(Utc::now());
        if let Some(http) = record.http.as_mut() {
            http.method = request.method.clone();
            http.url = request.url.clone();
            http.client_addr = request.client_addr.clone();
            http.user_agent = header(&request.headers, "user-agent")
                .unwrap_or_default()
                .to_string();
            http.request_headers = request.headers.clone();
            http.query_params = request.query.clone();
            http.request_body = self.render_request_body(request);
        }
        debug!("[{}] Capturing {} {}", record.id, request.method, request.url);

        Ok(ActiveCapture {
            state: CaptureState::Pending,
            started: Instant::now(),
            logger: RequestLogger::new(record.id.clone(), self.config.record_level),
            store: Arc::clone(&self.store),
            settings: self.tap_settings(),
            background_save: self.config.background_save,
            record,
        })
    }

    /// Like [`begin`](Self::begin), reading the request body from `body` first.
    ///
    /// The bytes read are returned so the host can still serve the request. A read failure does
    /// not abort the capture; it is recorded as the exchange error.
    pub fn begin_reading<R: Read>(
        &self,
        mut request: InboundRequest,
        body: R,
    ) -> (Result<ActiveCapture, SkipReason>, Vec<u8>) {
        let read = request.read_body(body);
        let capture = self.begin(&request).map(|mut capture| {
            if let Err(e) = read {
                warn!("[{}] {}", capture.id(), e);
                capture.set_error(e.to_string());
            }
            capture
        });
        (capture, request.body)
    }

    /// Starts a background process record, saved immediately as `running`.
    ///
    /// Returns `None` when capture is disabled; sampling does not apply to processes.
    pub fn start_process(&self, name: &str, process_type: &str) -> Option<ProcessHandle> {
        if !self.config.enabled {
            return None;
        }
        Some(ProcessHandle::start(
            Arc::clone(&self.store),
            name,
            process_type,
            self.config.record_level,
        ))
    }

    fn render_request_body(&self, request: &InboundRequest) -> String {
        let body = &request.body;
        if body.is_empty() {
            return String::new();
        }
        let content_type = header(&request.headers, "content-type").unwrap_or_default();
        if self.config.multipart.enabled && is_multipart(content_type) {
            return decompose_multipart(content_type, body, &self.config.multipart);
        }
        let limit = self.config.max_body_size();
        if limit > 0 && body.len() > limit {
            return oversized_placeholder(body.len());
        }
        render_payload(body)
    }
}

fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

/// One exchange being captured. Owned by the handler for the lifetime of the exchange.
///
/// Dropping it without calling [`finish`](Self::finish) still saves what was captured, with
/// the error set to [`ABORTED_ERROR`].
pub struct ActiveCapture {
    state: CaptureState,
    started: Instant,
    logger: RequestLogger,
    store: Arc<dyn Store>,
    settings: TapSettings,
    background_save: bool,
    record: Record,
}

impl fmt::Debug for ActiveCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveCapture")
            .field("id", &self.id())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ActiveCapture {
    pub fn id(&self) -> &str {
        self.logger.record_id()
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Logger whose entries end up in the record's `attached_logs`.
    pub fn logger(&self) -> &RequestLogger {
        &self.logger
    }

    /// The provisional record, as built from the inbound request.
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.record.error = error.into();
    }

    /// Wraps the outbound writer with a tap configured for this exchange.
    pub fn tap<W>(&mut self, inner: W) -> ResponseTap<W> {
        self.state = CaptureState::Capturing;
        ResponseTap::new(inner, self.settings.clone())
    }

    /// Completes the exchange with the observed response and saves the record.
    ///
    /// `error` overrides any error recorded earlier with [`set_error`](Self::set_error).
    pub fn finish(mut self, response: TappedResponse, error: Option<String>) -> Record {
        self.finalize(Some(response), error)
    }

    fn finalize(&mut self, response: Option<TappedResponse>, error: Option<String>) -> Record {
        self.state = CaptureState::Finalizing;
        let mut record = self.record.clone();
        record.duration_ms = self.started.elapsed().as_millis() as u64;

        if let Some(response) = response {
            if response.is_streaming() {
                record.kind = RecordKind::Streaming;
                record.streaming = Some(match &response.body {
                    CapturedBody::Streaming(buffer) => buffer.summary(),
                    CapturedBody::StreamingSkipped { total } => StreamingSummary {
                        chunk_count: 0,
                        max_chunk_size: self.settings.streaming.max_chunk_size,
                        max_chunks: self.settings.streaming.max_chunks,
                        total_size: ByteSize(*total).to_string(),
                    },
                    _ => StreamingSummary::default(),
                });
            }
            let body = response.render_body();
            if let Some(http) = record.http.as_mut() {
                http.status_code = response.status;
                http.response_headers = response.headers;
                http.response_body = body;
            }
        }

        record.attached_logs = self.logger.take_entries();
        if let Some(error) = error.filter(|e| !e.is_empty()) {
            record.error = error;
        }

        debug!(
            "[{}] Finalized {} record ({} ms, {} log line(s))",
            record.id,
            record.kind,
            record.duration_ms,
            record.attached_logs.len()
        );
        save_record(&self.store, record.clone(), self.background_save);
        self.state = CaptureState::Saved;
        record
    }
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        if self.state != CaptureState::Saved {
            warn!("[{}] Exchange dropped before completion, saving partial record", self.id());
            self.finalize(None, Some(ABORTED_ERROR.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::types::RecordLevel;
    use crate::storage::{MemoryStorage, RecordFilter};
    use std::io::Write;

    fn coordinator(config: Config) -> (CaptureCoordinator, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStorage::new(100));
        (CaptureCoordinator::new(config, Arc::clone(&store)).unwrap(), store)
    }

    fn stored(store: &Arc<dyn Store>) -> Vec<Record> {
        store.find_all(1, 0, &RecordFilter::default()).unwrap().0
    }

    #[test]
    fn test_path_extraction() {
        assert_eq!(InboundRequest::new("GET", "/api/users?page=2").path(), "/api/users");
        assert_eq!(InboundRequest::new("GET", "https://example.com/x/y#frag").path(), "/x/y");
        assert_eq!(InboundRequest::new("GET", "http://example.com").path(), "/");
    }

    #[test]
    fn test_skip_rules() {
        let config = Config {
            skip_paths: vec!["/health".into()],
            ..Default::default()
        };
        let (coordinator, _) = coordinator(config);
        let skip =
            |method: &str, url: &str| coordinator.skip_reason(&InboundRequest::new(method, url));

        assert_eq!(skip("GET", "/_debug"), Some(SkipReason::DashboardPath));
        assert_eq!(skip("GET", "/_debug/records?page=1"), Some(SkipReason::DashboardPath));
        assert_eq!(skip("GET", "/health/live"), Some(SkipReason::SkipPath));
        assert_eq!(skip("options", "/api"), Some(SkipReason::SkipMethod));
        assert_eq!(skip("GET", "/healthy"), None);
        assert_eq!(skip("GET", "/api"), None);
    }

    #[test]
    fn test_disabled_skips_everything() {
        let (coordinator, store) = coordinator(Config {
            enabled: false,
            ..Default::default()
        });
        let result = coordinator.begin(&InboundRequest::new("GET", "/api"));
        assert_eq!(result.err(), Some(SkipReason::Disabled));
        assert!(coordinator.start_process("job", "cron").is_none());
        assert_eq!(store.stats().unwrap().total_records, 0);
    }

    #[test]
    fn test_sampling_compares_draw_against_rate() {
        let config = Config {
            sample_rate: 0.5,
            ..Default::default()
        };
        let (low, _) = coordinator(config.clone());
        let low = low.with_sampler(|| 0.49);
        assert_eq!(low.skip_reason(&InboundRequest::new("GET", "/")), None);

        let (high, _) = coordinator(config);
        let high = high.with_sampler(|| 0.5);
        assert_eq!(
            high.skip_reason(&InboundRequest::new("GET", "/")),
            Some(SkipReason::NotSampled)
        );
    }

    #[test]
    fn test_invalid_sample_rate_is_a_constructor_error() {
        let store: Arc<dyn Store> = Arc::new(MemoryStorage::new(0));
        let config = Config {
            sample_rate: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            CaptureCoordinator::new(config, store),
            Err(ConfigError::NotInRange(_))
        ));
    }

    #[test]
    fn test_buffered_exchange_is_saved_once() {
        let (coordinator, store) = coordinator(Config::default());
        let request = InboundRequest::new("POST", "/api/users?x=1")
            .with_header("User-Agent", "curl/8.0")
            .with_header("Content-Type", "application/json")
            .with_query("x", "1")
            .with_client_addr("192.0.2.7:41000")
            .with_body(&b"{\"name\":\"ada\"}"[..]);

        let mut capture = coordinator.begin(&request).unwrap();
        assert_eq!(capture.state(), CaptureState::Pending);
        capture.logger().with_field("user", "ada").info("created user");

        let mut tap = capture.tap(Vec::new());
        assert_eq!(capture.state(), CaptureState::Capturing);
        tap.set_status(201);
        tap.set_header("Content-Type", "application/json");
        tap.write_all(b"{\"id\":1}").unwrap();
        let (sent, response) = tap.into_parts();
        assert_eq!(sent, b"{\"id\":1}");

        let record = capture.finish(response, None);
        let saved = stored(&store);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, record.id);

        let http = saved[0].http.as_ref().unwrap();
        assert_eq!(http.status_code, 201);
        assert_eq!(http.user_agent, "curl/8.0");
        assert_eq!(http.request_body, "{\"name\":\"ada\"}");
        assert_eq!(http.response_body, "{\"id\":1}");
        assert_eq!(saved[0].attached_logs.len(), 1);
        assert_eq!(saved[0].attached_logs[0].fields["user"], "ada");
        assert!(!saved[0].has_error());
    }

    #[test]
    fn test_oversized_request_body_becomes_placeholder() {
        let (coordinator, _) = coordinator(Config {
            max_body_size_kb: 1,
            ..Default::default()
        });
        let request = InboundRequest::new("PUT", "/upload").with_body(vec![b'a'; 2048]);
        let capture = coordinator.begin(&request).unwrap();
        let body = &capture.record().http.as_ref().unwrap().request_body;
        assert_eq!(body, "[Body too large: 2048 bytes]");
    }

    #[test]
    fn test_multipart_request_is_decomposed() {
        let (coordinator, _) = coordinator(Config::default());
        let body = "--XyZ\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhello\r\n--XyZ--\r\n";
        let request = InboundRequest::new("POST", "/form")
            .with_header("Content-Type", "multipart/form-data; boundary=XyZ")
            .with_body(body.as_bytes());
        let capture = coordinator.begin(&request).unwrap();
        let rendered = &capture.record().http.as_ref().unwrap().request_body;
        assert!(rendered.starts_with("[Multipart Form Data: 1 parts]"));
        assert!(rendered.contains("hello"));
    }

    #[test]
    fn test_streaming_exchange_records_summary() {
        let (coordinator, store) = coordinator(Config::default());
        let mut capture = coordinator.begin(&InboundRequest::new("GET", "/events")).unwrap();
        let mut tap = capture.tap(Vec::new());
        tap.set_header("Content-Type", "text/event-stream");
        for n in 0..3 {
            tap.write_all(format!("data: {}\n\n", n).as_bytes()).unwrap();
        }
        let (_, response) = tap.into_parts();
        capture.finish(response, None);

        let saved = &stored(&store)[0];
        assert_eq!(saved.kind, RecordKind::Streaming);
        assert_eq!(saved.streaming.as_ref().unwrap().chunk_count, 3);
        assert!(saved.http.as_ref().unwrap().response_body.contains("chunks"));
    }

    #[test]
    fn test_host_error_is_attached() {
        let (coordinator, store) = coordinator(Config::default());
        let mut capture = coordinator.begin(&InboundRequest::new("GET", "/boom")).unwrap();
        let mut tap = capture.tap(Vec::<u8>::new());
        tap.set_status(500);
        let (_, response) = tap.into_parts();
        capture.finish(response, Some("handler panicked".into()));
        assert_eq!(stored(&store)[0].error, "handler panicked");
    }

    #[test]
    fn test_dropped_capture_is_saved_as_aborted() {
        let (coordinator, store) = coordinator(Config::default());
        let capture = coordinator.begin(&InboundRequest::new("GET", "/slow")).unwrap();
        let id = capture.id().to_string();
        drop(capture);
        let saved = store.find_by_id(&id).unwrap().unwrap();
        assert_eq!(saved.error, ABORTED_ERROR);
    }

    #[test]
    fn test_body_read_failure_is_recorded() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            }
        }
        let (coordinator, _) = coordinator(Config::default());
        let (capture, body) = coordinator.begin_reading(InboundRequest::new("POST", "/x"), Broken);
        let capture = capture.unwrap();
        assert!(body.is_empty());
        assert!(capture.record().error.contains("reset"));
    }

    #[test]
    fn test_silent_level_attaches_no_logs() {
        let (coordinator, store) = coordinator(Config {
            record_level: RecordLevel::Silent,
            ..Default::default()
        });
        let mut capture = coordinator.begin(&InboundRequest::new("GET", "/")).unwrap();
        capture.logger().error("ignored");
        let (_, response) = capture.tap(Vec::<u8>::new()).into_parts();
        capture.finish(response, None);
        assert!(stored(&store)[0].attached_logs.is_empty());
    }

    #[test]
    fn test_no_sweeper_without_runtime() {
        let coordinator = CaptureCoordinator::from_config(Config::default()).unwrap();
        assert!(coordinator.retention_sweeper().is_none());
    }

    #[tokio::test]
    async fn test_from_config_sweeps_expired_records() {
        let coordinator = CaptureCoordinator::from_config(Config {
            retention_hours: 24,
            ..Default::default()
        })
        .unwrap();
        assert!(coordinator.retention_sweeper().unwrap().is_running());

        // the sweeper task runs its first pass once this task yields
        let expired = Record::new_http(Utc::now() - chrono::TimeDelta::hours(48));
        let fresh = Record::new_http(Utc::now());
        coordinator.store().save(&expired).unwrap();
        coordinator.store().save(&fresh).unwrap();

        for _ in 0..100 {
            if coordinator.store().find_by_id(&expired.id).unwrap().is_none() {
                assert!(coordinator.store().find_by_id(&fresh.id).unwrap().is_some());
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("expired record was never swept");
    }

    #[tokio::test]
    async fn test_retention_disabled_starts_no_sweeper() {
        let coordinator = CaptureCoordinator::from_config(Config {
            retention_hours: 0,
            ..Default::default()
        })
        .unwrap();
        assert!(coordinator.retention_sweeper().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_background_save_reaches_store() {
        let (coordinator, store) = coordinator(Config {
            background_save: true,
            ..Default::default()
        });
        let mut capture = coordinator.begin(&InboundRequest::new("GET", "/bg")).unwrap();
        let (_, response) = capture.tap(Vec::<u8>::new()).into_parts();
        let record = capture.finish(response, None);

        for _ in 0..100 {
            if store.find_by_id(&record.id).unwrap().is_some() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("record was never saved");
    }
}
