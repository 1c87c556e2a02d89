pub mod configuration;
pub use configuration::Config;

pub mod content_inspection;

pub mod data_capture;
pub use data_capture::{CaptureCoordinator, InboundRequest, Record};

pub mod error_handling;

pub mod storage;
pub use storage::{open_store, Store};
