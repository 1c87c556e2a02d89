//! Error types shared by configuration, capture and storage.

pub mod types;
