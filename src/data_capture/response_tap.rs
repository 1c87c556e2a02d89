//! Write-intercepting sink sitting between a handler and the real transport.
//!
//! A `ResponseTap` forwards every write to the wrapped writer untouched and records the bytes
//! the writer accepted. On the first write it inspects the response headers to decide whether
//! the exchange is a bounded body (buffered, capped at the max body size) or an open-ended
//! stream (handed to a [`ChunkBuffer`]).
//!
//! Both `std::io::Write` and `tokio::io::AsyncWrite` are supported, so the tap can wrap a
//! blocking socket, an async stream, or a plain `Vec<u8>` in tests.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

use flate2::read::GzDecoder;
use log::{debug, trace};
use tokio::io::AsyncWrite;

use super::chunk_buffer::{ChunkBuffer, ChunkLimits};
use crate::configuration::types::StreamingConfig;
use crate::content_inspection::classifier::{oversized_placeholder, render_payload};

const STREAMING_CONTENT_TYPES: &[&str] = &[
    "text/event-stream",
    "application/x-ndjson",
    "application/json-seq",
    "application/octet-stream",
];

/// Case-insensitive header lookup.
pub fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Decides from the response headers whether the body is an open-ended stream.
pub fn is_streaming_response(headers: &HashMap<String, String>) -> bool {
    let chunked = header(headers, "transfer-encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);
    let streaming_type = header(headers, "content-type")
        .map(|v| {
            let v = v.trim().to_ascii_lowercase();
            STREAMING_CONTENT_TYPES.iter().any(|t| v.starts_with(t))
        })
        .unwrap_or(false);
    let websocket = header(headers, "upgrade")
        .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    chunked || streaming_type || websocket
}

#[derive(Debug, Clone, PartialEq)]
pub struct TapSettings {
    /// Buffered body capture limit in bytes, `0` = unlimited
    pub max_body_size: usize,
    pub streaming: StreamingConfig,
}

impl Default for TapSettings {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024,
            streaming: StreamingConfig::default(),
        }
    }
}

/// What the tap saw of the response body.
#[derive(Debug)]
pub enum CapturedBody {
    Empty,
    Buffered { data: Vec<u8>, total: usize },
    Streaming(ChunkBuffer),
    /// Streaming response observed while streaming capture is disabled
    StreamingSkipped { total: u64 },
}

#[derive(Debug)]
pub struct TappedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: CapturedBody,
    max_body_size: usize,
}

impl TappedResponse {
    pub fn is_streaming(&self) -> bool {
        matches!(
            self.body,
            CapturedBody::Streaming(_) | CapturedBody::StreamingSkipped { .. }
        )
    }

    pub fn chunk_buffer(&self) -> Option<&ChunkBuffer> {
        match &self.body {
            CapturedBody::Streaming(buffer) => Some(buffer),
            _ => None,
        }
    }

    /// Renders the captured body for storage.
    ///
    /// Buffered bodies are gzip-decoded when `Content-Encoding: gzip` is set (raw bytes are kept
    /// if decoding fails) and then classified; streaming bodies render their chunk summary.
    pub fn render_body(&self) -> String {
        match &self.body {
            CapturedBody::Empty => String::new(),
            CapturedBody::Streaming(buffer) => buffer.render(),
            CapturedBody::StreamingSkipped { total } => {
                format!("[Streaming response not captured: {} bytes]", total)
            }
            CapturedBody::Buffered { data, total } => {
                if self.max_body_size > 0 && *total > self.max_body_size {
                    return oversized_placeholder(*total);
                }
                let gzip = header(&self.headers, "content-encoding")
                    .map(|v| v.trim().eq_ignore_ascii_case("gzip"))
                    .unwrap_or(false);
                if !gzip {
                    return render_payload(data);
                }
                match gunzip(data, self.max_body_size) {
                    Ok(decoded) if self.max_body_size > 0 && decoded.len() > self.max_body_size => {
                        format!(
                            "[Body too large: more than {} bytes after decoding]",
                            self.max_body_size
                        )
                    }
                    Ok(decoded) => render_payload(&decoded),
                    Err(e) => {
                        debug!("gzip decoding of captured response failed: {}", e);
                        render_payload(data)
                    }
                }
            }
        }
    }
}

/// Decodes at most `limit + 1` bytes so an oversized payload can be detected without
/// inflating it completely.
fn gunzip(data: &[u8], limit: usize) -> io::Result<Vec<u8>> {
    let mut decoded = Vec::new();
    let decoder = GzDecoder::new(data);
    if limit > 0 {
        decoder.take(limit as u64 + 1).read_to_end(&mut decoded)?;
    } else {
        let mut decoder = decoder;
        decoder.read_to_end(&mut decoded)?;
    }
    Ok(decoded)
}

#[derive(Debug)]
enum TapMode {
    Undecided,
    Buffered,
    Streaming,
}

#[derive(Debug)]
pub struct ResponseTap<W> {
    inner: W,
    status: u16,
    headers: HashMap<String, String>,
    settings: TapSettings,
    mode: TapMode,
    buffered: Vec<u8>,
    buffered_total: usize,
    chunks: Option<ChunkBuffer>,
    skipped_total: u64,
}

impl<W> ResponseTap<W> {
    pub fn new(inner: W, settings: TapSettings) -> Self {
        Self {
            inner,
            status: 200,
            headers: HashMap::new(),
            settings,
            mode: TapMode::Undecided,
            buffered: Vec::new(),
            buffered_total: 0,
            chunks: None,
            skipped_total: 0,
        }
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Headers must be set before the first write; they decide buffered vs streaming capture.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn set_headers(&mut self, headers: HashMap<String, String>) {
        self.headers.extend(headers);
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.mode, TapMode::Streaming)
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    fn classify(&mut self) {
        if is_streaming_response(&self.headers) {
            debug!("response classified as streaming");
            self.mode = TapMode::Streaming;
            if self.settings.streaming.enabled {
                self.chunks = Some(ChunkBuffer::new(ChunkLimits::from(&self.settings.streaming)));
            }
        } else {
            self.mode = TapMode::Buffered;
        }
    }

    /// Records bytes that were already delivered to the transport.
    pub fn observe(&mut self, data: &[u8]) {
        if matches!(self.mode, TapMode::Undecided) {
            self.classify();
        }
        if data.is_empty() {
            return;
        }
        trace!("tap observed {} bytes", data.len());
        match self.mode {
            TapMode::Streaming => match self.chunks.as_mut() {
                Some(buffer) => buffer.push(data),
                None => self.skipped_total += data.len() as u64,
            },
            _ => {
                self.buffered_total += data.len();
                let limit = self.settings.max_body_size;
                let room = if limit == 0 {
                    data.len()
                } else {
                    limit.saturating_sub(self.buffered.len()).min(data.len())
                };
                self.buffered.extend_from_slice(&data[..room]);
            }
        }
    }

    /// Ends the capture, handing back the wrapped writer and everything observed.
    pub fn into_parts(self) -> (W, TappedResponse) {
        let body = match self.mode {
            TapMode::Undecided => CapturedBody::Empty,
            TapMode::Buffered if self.buffered_total == 0 => CapturedBody::Empty,
            TapMode::Buffered => CapturedBody::Buffered {
                data: self.buffered,
                total: self.buffered_total,
            },
            TapMode::Streaming => match self.chunks {
                Some(buffer) => CapturedBody::Streaming(buffer),
                None => CapturedBody::StreamingSkipped {
                    total: self.skipped_total,
                },
            },
        };
        let response = TappedResponse {
            status: self.status,
            headers: self.headers,
            body,
            max_body_size: self.settings.max_body_size,
        };
        (self.inner, response)
    }
}

impl<W: Write> Write for ResponseTap<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.observe(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ResponseTap<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(written)) => {
                this.observe(&buf[..written]);
                Poll::Ready(Ok(written))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
