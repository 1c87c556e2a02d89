//! Binary/text classification and file type sniffing for opaque payloads.
//!
//! All functions here are pure and bounded: they look at a fixed-size prefix of the
//! payload, never the whole thing, so they are safe to call on arbitrarily large bodies.

use std::fmt::{self, Write};

/// Bytes examined when deciding whether a payload is binary.
const SAMPLE_WINDOW: usize = 1024;
/// Upper bound on the number of sampled bytes for payloads larger than the window.
const MAX_SAMPLES: usize = 512;
/// Payloads up to this size get a hex preview in [`format_binary`].
const HEX_PREVIEW_LIMIT: usize = 512;
const HEX_PREVIEW_CHARS: usize = 200;

/// Fraction of control bytes above which a request/response body is binary.
pub const BODY_BINARY_THRESHOLD: f64 = 0.10;
/// Streaming chunks are judged more strictly.
pub const CHUNK_BINARY_THRESHOLD: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Jpeg,
    Png,
    Gif,
    Pdf,
    Zip,
    Rar,
    Mp3,
    Mp4,
    Text,
    Binary,
    Unknown,
}

impl FileType {
    pub fn label(self) -> &'static str {
        match self {
            FileType::Jpeg => "JPEG Image",
            FileType::Png => "PNG Image",
            FileType::Gif => "GIF Image",
            FileType::Pdf => "PDF Document",
            FileType::Zip => "ZIP Archive",
            FileType::Rar => "RAR Archive",
            FileType::Mp3 => "MP3 Audio",
            FileType::Mp4 => "MP4 Video",
            FileType::Text => "Text",
            FileType::Binary => "Binary",
            FileType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const MAGIC_NUMBERS: &[(&[u8], FileType)] = &[
    (&[0xFF, 0xD8, 0xFF], FileType::Jpeg),
    (&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], FileType::Png),
    (b"GIF87a", FileType::Gif),
    (b"GIF89a", FileType::Gif),
    (b"%PDF", FileType::Pdf),
    (&[b'P', b'K', 0x03, 0x04], FileType::Zip),
    (&[b'R', b'a', b'r', b'!', 0x1A, 0x07], FileType::Rar),
    (b"ID3", FileType::Mp3),
    (&[0xFF, 0xFB], FileType::Mp3),
];

fn is_control(byte: u8) -> bool {
    byte < 0x20 && !matches!(byte, b'\t' | b'\n' | b'\r')
}

fn is_printable(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte) || matches!(byte, b'\t' | b'\n' | b'\r')
}

/// Share of control bytes in a bounded sample of `data`.
///
/// Small payloads are scanned completely; larger ones are sampled at a fixed stride over the
/// first kilobyte so that at most [`MAX_SAMPLES`] bytes are examined.
pub fn control_ratio(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let window = &data[..data.len().min(SAMPLE_WINDOW)];
    let stride = window.len().div_ceil(MAX_SAMPLES).max(1);

    let mut sampled = 0usize;
    let mut control = 0usize;
    for &byte in window.iter().step_by(stride) {
        sampled += 1;
        if is_control(byte) {
            control += 1;
        }
    }
    control as f64 / sampled as f64
}

/// Returns `true` when more than 10% of the sampled bytes are control characters.
/// Empty input is never binary.
pub fn is_binary(data: &[u8]) -> bool {
    control_ratio(data) > BODY_BINARY_THRESHOLD
}

/// Stricter variant used for streaming chunks.
pub fn is_binary_chunk(data: &[u8]) -> bool {
    !data.is_empty() && control_ratio(data) >= CHUNK_BINARY_THRESHOLD
}

pub fn detect_file_type(data: &[u8]) -> FileType {
    for (magic, file_type) in MAGIC_NUMBERS {
        if data.starts_with(magic) {
            return *file_type;
        }
    }
    if data.len() >= 8 && &data[4..8] == b"ftyp" {
        return FileType::Mp4;
    }
    if data.len() < 8 {
        return FileType::Unknown;
    }

    let sample = &data[..data.len().min(100)];
    let printable = sample.iter().filter(|b| is_printable(**b)).count();
    if printable * 100 >= sample.len() * 80 {
        FileType::Text
    } else {
        FileType::Binary
    }
}

/// Renders a binary payload as a bounded, human readable placeholder.
pub fn format_binary(data: &[u8]) -> String {
    let file_type = detect_file_type(data);
    if data.len() > HEX_PREVIEW_LIMIT {
        return format!("[Binary File: {} bytes, Type: {}]", data.len(), file_type);
    }

    let preview_bytes = HEX_PREVIEW_CHARS / 2;
    let mut hex = String::with_capacity(HEX_PREVIEW_CHARS);
    for byte in data.iter().take(preview_bytes) {
        let _ = write!(hex, "{:02x}", byte);
    }
    let ellipsis = if data.len() > preview_bytes { "..." } else { "" };
    format!(
        "[Binary Data: {} bytes, Type: {}, Hex: {}{}]",
        data.len(),
        file_type,
        hex,
        ellipsis
    )
}

/// Size-only placeholder for bodies above the configured capture limit.
pub fn oversized_placeholder(size: usize) -> String {
    format!("[Body too large: {} bytes]", size)
}

/// Renders any payload for storage: text is decoded lossily, binary goes through [`format_binary`].
pub fn render_payload(data: &[u8]) -> String {
    if is_binary(data) {
        format_binary(data)
    } else {
        String::from_utf8_lossy(data).into_owned()
    }
}
