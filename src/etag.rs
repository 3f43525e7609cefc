//! Content fingerprinting for change detection.
//!
//! The sync engine decides whether a local file needs uploading by comparing
//! its digest against the remote etag for the same key, so the two must use
//! the same algorithm. That algorithm is MD5: it is what object stores
//! report as the etag for plain uploads, and `FsStore` mirrors it. This is a
//! change fingerprint, not a security boundary.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// MD5 digest of a file's contents, returned as a lowercase hex string.
///
/// Streams the file rather than loading it whole — deploy directories
/// contain full-resolution photos.
pub fn file_etag(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        context.consume(&buf[..read]);
    }
    Ok(format!("{:x}", context.compute()))
}

/// MD5 digest of an in-memory payload, hex-encoded. Matches [`file_etag`]
/// for identical bytes.
pub fn bytes_etag(contents: &[u8]) -> String {
    format!("{:x}", md5::compute(contents))
}
