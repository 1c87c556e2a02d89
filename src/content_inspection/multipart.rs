//! Size-bounded decomposition of `multipart/form-data` bodies into a readable summary.

use std::fmt::Write;
use std::sync::LazyLock;

use bytesize::ByteSize;
use log::trace;
use regex::Regex;

use super::classifier::{detect_file_type, format_binary, is_binary};
use crate::configuration::types::MultipartConfig;

const TEXT_VALUE_PREVIEW: usize = 100;

static BOUNDARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)boundary=(?:"([^"]+)"|([^;\s]+))"#).expect("valid regex"));
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)(?:^|;)\s*name="([^"]*)""#).expect("valid regex"));
static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)filename="([^"]*)""#).expect("valid regex"));

#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Field {
        name: String,
        value: String,
    },
    File {
        field: String,
        filename: String,
        size: usize,
        content_type: String,
    },
}

pub fn is_multipart(content_type: &str) -> bool {
    content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("multipart/")
}

pub fn extract_boundary(content_type: &str) -> Option<String> {
    let caps = BOUNDARY_RE.captures(content_type)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
        .filter(|b| !b.is_empty())
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn strip_line_break(data: &[u8], pos: usize) -> usize {
    if data[pos..].starts_with(b"\r\n") {
        pos + 2
    } else if data[pos..].starts_with(b"\n") {
        pos + 1
    } else {
        pos
    }
}

fn header_value<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

fn truncate_chars(value: &str, limit: usize) -> String {
    match value.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &value[..idx]),
        None => value.to_string(),
    }
}

/// Splits `body` on `boundary` and classifies each part.
///
/// Only the first `max_part_size` bytes of a part are inspected; the reported size of a file
/// part is its full length. Returns `None` when no part could be located.
pub fn parse_parts(body: &[u8], boundary: &str, config: &MultipartConfig) -> Option<Vec<FormPart>> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut parts = Vec::new();
    let mut cursor = find(body, &delimiter, 0)?;

    loop {
        let mut start = cursor + delimiter.len();
        if body[start..].starts_with(b"--") {
            break;
        }
        start = strip_line_break(body, start);

        let next = match find(body, &delimiter, start) {
            Some(next) => next,
            None => break,
        };
        let mut end = next;
        if end >= 2 && &body[end - 2..end] == b"\r\n" {
            end -= 2;
        } else if end >= 1 && body[end - 1] == b'\n' {
            end -= 1;
        }
        let section = &body[start..end.max(start)];

        let (raw_headers, content) = match find(section, b"\r\n\r\n", 0) {
            Some(split) => (&section[..split], &section[split + 4..]),
            None => match find(section, b"\n\n", 0) {
                Some(split) => (&section[..split], &section[split + 2..]),
                None => (section, &section[section.len()..]),
            },
        };
        let headers = String::from_utf8_lossy(raw_headers);
        let disposition = header_value(&headers, "content-disposition").unwrap_or_default();
        let name = NAME_RE
            .captures(disposition)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        let inspected = match config.max_part_size {
            0 => content,
            cap => &content[..content.len().min(cap)],
        };

        let part = match FILENAME_RE.captures(disposition) {
            Some(caps) => {
                let declared = header_value(&headers, "content-type")
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let content_type = if config.skip_file_content {
                    declared
                } else {
                    detect_file_type(inspected).to_string()
                };
                FormPart::File {
                    field: name,
                    filename: caps[1].to_string(),
                    size: content.len(),
                    content_type,
                }
            }
            None => {
                let value = if is_binary(inspected) {
                    "[Binary]".to_string()
                } else {
                    truncate_chars(&String::from_utf8_lossy(inspected), TEXT_VALUE_PREVIEW)
                };
                FormPart::Field { name, value }
            }
        };
        trace!("parsed multipart part: {:?}", part);
        parts.push(part);
        cursor = next;
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

/// Renders a multipart body as one line per part; malformed bodies degrade to [`format_binary`].
pub fn decompose_multipart(content_type: &str, body: &[u8], config: &MultipartConfig) -> String {
    let parts = extract_boundary(content_type).and_then(|b| parse_parts(body, &b, config));
    let Some(parts) = parts else {
        return format_binary(body);
    };

    let mut out = format!("[Multipart Form Data: {} parts]", parts.len());
    for part in &parts {
        match part {
            FormPart::Field { name, value } => {
                let _ = write!(out, "\n- field \"{}\": {}", name, value);
            }
            FormPart::File {
                field,
                filename,
                size,
                content_type,
            } => {
                let _ = write!(
                    out,
                    "\n- file \"{}\" (filename: {}, size: {}, type: {})",
                    field,
                    filename,
                    ByteSize(*size as u64),
                    content_type
                );
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CT: &str = "multipart/form-data; boundary=XyZ";

    fn body() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            b"--XyZ\r\nContent-Disposition: form-data; name=\"username\"\r\n\r\nalice\r\n",
        );
        body.extend_from_slice(
            b"--XyZ\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\nContent-Type: image/png\r\n\r\n",
        );
        body.extend_from_slice(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0]);
        body.extend_from_slice(
            b"\r\n--XyZ\r\nContent-Disposition: form-data; name=\"blob\"\r\n\r\n",
        );
        body.extend_from_slice(&[0u8, 1, 2, 3, 4, 5]);
        body.extend_from_slice(b"\r\n--XyZ--\r\n");
        body
    }

    #[test]
    fn boundary_extraction() {
        assert_eq!(extract_boundary(CT), Some("XyZ".to_string()));
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=\"a b\"; charset=utf-8"),
            Some("a b".to_string())
        );
        assert_eq!(extract_boundary("multipart/form-data"), None);
    }

    #[test]
    fn parses_fields_and_files() {
        let parts = parse_parts(&body(), "XyZ", &MultipartConfig::default()).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts[0],
            FormPart::Field {
                name: "username".into(),
                value: "alice".into()
            }
        );
        assert_eq!(
            parts[1],
            FormPart::File {
                field: "avatar".into(),
                filename: "me.png".into(),
                size: 12,
                content_type: "image/png".into()
            }
        );
        assert_eq!(
            parts[2],
            FormPart::Field {
                name: "blob".into(),
                value: "[Binary]".into()
            }
        );
    }

    #[test]
    fn sniffs_file_content_when_allowed() {
        let config = MultipartConfig {
            skip_file_content: false,
            ..Default::default()
        };
        let parts = parse_parts(&body(), "XyZ", &config).unwrap();
        match &parts[1] {
            FormPart::File { content_type, .. } => assert_eq!(content_type, "PNG Image"),
            other => panic!("unexpected part {:?}", other),
        }
    }

    #[test]
    fn long_text_values_are_truncated() {
        let value = "v".repeat(250);
        let body = format!(
            "--XyZ\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\n{}\r\n--XyZ--\r\n",
            value
        );
        let rendered = decompose_multipart(CT, body.as_bytes(), &MultipartConfig::default());
        assert!(rendered.contains(&format!("{}...", "v".repeat(100))));
        assert!(!rendered.contains(&"v".repeat(101)));
    }

    #[test]
    fn part_inspection_is_capped() {
        let config = MultipartConfig {
            max_part_size: 4,
            ..Default::default()
        };
        let body =
            b"--XyZ\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nabcdefgh\r\n--XyZ--";
        let parts = parse_parts(body, "XyZ", &config).unwrap();
        assert_eq!(
            parts[0],
            FormPart::Field {
                name: "note".into(),
                value: "abcd".into()
            }
        );
    }

    #[test]
    fn rendered_summary() {
        let rendered = decompose_multipart(CT, &body(), &MultipartConfig::default());
        assert!(rendered.starts_with("[Multipart Form Data: 3 parts]"));
        assert!(rendered.contains("- field \"username\": alice"));
        assert!(rendered.contains("- file \"avatar\" (filename: me.png"));
        assert!(rendered.contains("- field \"blob\": [Binary]"));
    }

    #[test]
    fn missing_boundary_degrades_to_binary_rendering() {
        let rendered = decompose_multipart(
            "multipart/form-data",
            b"\x00\x01garbage",
            &MultipartConfig::default(),
        );
        assert!(rendered.starts_with("[Binary Data: 9 bytes"));
    }

    #[test]
    fn unknown_boundary_degrades_to_binary_rendering() {
        let rendered = decompose_multipart(
            "multipart/form-data; boundary=nope",
            &body(),
            &MultipartConfig::default(),
        );
        assert!(rendered.starts_with("[Binary"));
    }
}
