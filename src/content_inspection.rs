//! Content classification for captured payloads.
//!
//! - `classifier`: binary/text detection, magic-number sniffing, bounded binary rendering.
//! - `multipart`: decomposition of multi-part form bodies into named, size-limited parts.

pub mod classifier;
pub mod multipart;

pub use classifier::{
    detect_file_type, format_binary, is_binary, is_binary_chunk, oversized_placeholder,
    render_payload, FileType,
};
pub use multipart::{decompose_multipart, is_multipart};
