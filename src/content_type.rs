//! Content-type detection for uploads.
//!
//! Object stores serve whatever `Content-Type` they were given at put time,
//! so getting this right is what makes browsers render the deployed site
//! instead of downloading it. Detection is extension-first — the set of
//! file types a generated photo site contains is small and closed — with a
//! magic-byte sniff as the fallback for extensionless files.

use std::io::{self, Read};
use std::path::Path;

const FALLBACK: &str = "application/octet-stream";

/// How many leading bytes the sniffer considers.
const SNIFF_LEN: usize = 512;

const BY_EXTENSION: &[(&str, &str)] = &[
    ("avif", "image/avif"),
    ("css", "text/css; charset=utf-8"),
    ("gif", "image/gif"),
    ("htm", "text/html; charset=utf-8"),
    ("html", "text/html; charset=utf-8"),
    ("ico", "image/x-icon"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("js", "text/javascript; charset=utf-8"),
    ("json", "application/json"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("txt", "text/plain; charset=utf-8"),
    ("webmanifest", "application/manifest+json"),
    ("webp", "image/webp"),
    ("woff2", "font/woff2"),
    ("xml", "application/xml"),
];

/// Detect the MIME type for a local file.
///
/// Known extensions resolve without touching the file; anything else is
/// sniffed from its first bytes. Fails only if the sniff read fails.
pub fn detect(path: &Path) -> io::Result<String> {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let ext = ext.to_ascii_lowercase();
        if let Some((_, mime)) = BY_EXTENSION.iter().find(|(e, _)| *e == ext) {
            return Ok((*mime).to_string());
        }
    }
    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; SNIFF_LEN];
    let mut filled = 0;
    loop {
        let read = file.read(&mut buf[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
        if filled == SNIFF_LEN {
            break;
        }
    }
    Ok(sniff(&buf[..filled]).to_string())
}

/// Identify a payload from its leading bytes.
fn sniff(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "image/jpeg";
    }
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return "image/png";
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return "image/gif";
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return "image/webp";
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return "image/avif";
    }
    let head = String::from_utf8_lossy(bytes);
    let head = head.trim_start().to_ascii_lowercase();
    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        return "text/html; charset=utf-8";
    }
    if head.starts_with("<?xml") {
        return "application/xml";
    }
    if bytes.is_empty() || std::str::from_utf8(bytes).is_ok() {
        return "text/plain; charset=utf-8";
    }
    FALLBACK
}
