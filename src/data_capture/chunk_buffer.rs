//! Bounded-memory accumulation of streaming response chunks.
//!
//! Three independent ceilings apply, any of which may be `0` (unlimited):
//! - `max_chunks`: retained chunk count, the oldest chunk is dropped before appending
//! - `max_chunk_size`: display bytes kept per chunk, the rest is replaced by a suffix
//! - `max_memory`: summed *true* size of retained chunks, oldest chunks are dropped until
//!   the sum no longer exceeds it
//!
//! Eviction is always first-in-first-out.

use std::collections::VecDeque;
use std::fmt::Write;

use bytesize::ByteSize;
use chrono::Utc;
use log::trace;

use super::types::{Chunk, StreamingSummary};
use crate::configuration::types::StreamingConfig;
use crate::content_inspection::classifier::{format_binary, is_binary_chunk};

const TRUNCATION_SUFFIX: &[u8] = b"... [truncated]";
const SUMMARY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkLimits {
    pub max_chunk_size: usize,
    pub max_chunks: usize,
    pub max_memory: usize,
}

impl From<&StreamingConfig> for ChunkLimits {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            max_chunk_size: config.max_chunk_size,
            max_chunks: config.max_chunks,
            max_memory: config.max_memory,
        }
    }
}

#[derive(Debug)]
pub struct ChunkBuffer {
    chunks: VecDeque<Chunk>,
    limits: ChunkLimits,
    /// Sum of the true sizes of `chunks`
    retained_bytes: usize,
    /// Every byte ever observed, evicted or not
    observed_bytes: u64,
    observed_chunks: u64,
}

impl ChunkBuffer {
    pub fn new(limits: ChunkLimits) -> Self {
        Self {
            chunks: VecDeque::new(),
            limits,
            retained_bytes: 0,
            observed_bytes: 0,
            observed_chunks: 0,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.observed_bytes += data.len() as u64;
        self.observed_chunks += 1;

        if self.limits.max_chunks > 0 && self.chunks.len() >= self.limits.max_chunks {
            self.evict_oldest();
        }

        let cap = self.limits.max_chunk_size;
        let display = if cap > 0 && data.len() > cap {
            let mut truncated = Vec::with_capacity(cap + TRUNCATION_SUFFIX.len());
            truncated.extend_from_slice(&data[..cap]);
            truncated.extend_from_slice(TRUNCATION_SUFFIX);
            truncated
        } else {
            data.to_vec()
        };

        self.chunks.push_back(Chunk {
            timestamp: Utc::now(),
            size: data.len(),
            data: display,
            is_binary: is_binary_chunk(data),
        });
        self.retained_bytes += data.len();

        if self.limits.max_memory > 0 {
            while self.retained_bytes > self.limits.max_memory && !self.chunks.is_empty() {
                self.evict_oldest();
            }
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(chunk) = self.chunks.pop_front() {
            self.retained_bytes -= chunk.size;
            trace!("evicted streaming chunk of {} bytes", chunk.size);
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn retained_bytes(&self) -> usize {
        self.retained_bytes
    }

    pub fn observed_bytes(&self) -> u64 {
        self.observed_bytes
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub fn summary(&self) -> StreamingSummary {
        StreamingSummary {
            chunk_count: self.chunks.len(),
            max_chunk_size: self.limits.max_chunk_size,
            max_chunks: self.limits.max_chunks,
            total_size: ByteSize(self.observed_bytes).to_string(),
        }
    }

    /// Renders the retained chunks as the response body of a streaming record.
    pub fn render(&self) -> String {
        let mut out = format!(
            "[Streaming Response: {} chunks retained of {} received, total size {}, retained size {}]",
            self.chunks.len(),
            self.observed_chunks,
            ByteSize(self.observed_bytes),
            ByteSize(self.retained_bytes as u64)
        );
        for (index, chunk) in self.chunks.iter().enumerate() {
            let display = if chunk.is_binary {
                format_binary(&chunk.data)
            } else {
                String::from_utf8_lossy(&chunk.data).into_owned()
            };
            let preview: String = display.chars().take(SUMMARY_PREVIEW_CHARS).collect();
            let _ = write!(
                out,
                "\n#{} [{} bytes at {}, binary: {}] {}",
                index,
                chunk.size,
                chunk.timestamp.to_rfc3339(),
                chunk.is_binary,
                preview
            );
        }
        out
    }
}
