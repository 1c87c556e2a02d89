//! Data capture subsystem
//!
//! Everything that observes a live exchange and turns it into a [`Record`]:
//! - `types`: the record data model.
//! - `response_tap` and `chunk_buffer`: outbound capture, buffered or streaming.
//! - `request_logger`: structured log lines attached to a record.
//! - `coordinator`: skip rules, sampling and the per-exchange lifecycle.
//! - `process`: records for background work.

pub mod chunk_buffer;
pub mod coordinator;
pub mod process;
pub mod request_logger;
pub mod response_tap;
pub mod types;

pub use chunk_buffer::{ChunkBuffer, ChunkLimits};
pub use coordinator::{ActiveCapture, CaptureCoordinator, CaptureState, InboundRequest, SkipReason};
pub use process::ProcessHandle;
pub use request_logger::{LogMessage, RequestLogger};
pub use response_tap::{CapturedBody, ResponseTap, TapSettings, TappedResponse};
pub use types::{Record, RecordKind};
