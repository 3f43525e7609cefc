//! Object store trait and shared transfer types.
//!
//! The [`ObjectStore`] trait defines the four operations every store must
//! support: list, get, put, and delete. The rest of the crate is
//! store-agnostic — the sync engine only ever talks to this trait.
//!
//! The bundled implementation is [`FsStore`](crate::fs_store::FsStore), a
//! directory-backed store used for local deploy targets and integration
//! tests. Cloud stores (S3 and friends) implement the same trait out of tree.
//!
//! ## Keys and etags
//!
//! A key identifies an object both locally and remotely: the root-relative
//! path, always with a leading `/`. An etag is a hex digest of the object's
//! content (see [`etag`](crate::etag)); some backends wrap it in literal
//! quotation marks on the wire, so etags are passed through [`strip_quotes`]
//! before any comparison.

use std::path::PathBuf;
use thiserror::Error;

/// Canned ACL granting no public access.
pub const ACL_PRIVATE: &str = "private";

/// Canned ACL for world-readable site assets.
pub const ACL_PUBLIC_READ: &str = "public-read";

#[derive(Error, Debug)]
pub enum StoreError {
    /// The bucket or key does not exist. Callers must be able to tell this
    /// apart from every other failure: a listing of a missing bucket is an
    /// empty index, not an error.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid put for key {0}: neither local_path nor contents is set")]
    InvalidPut(String),
    #[error("store operation failed: {0}")]
    OperationFailed(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// An object as reported by a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub etag: String,
}

/// A file to upload: either backed by a path on disk or by an in-memory
/// payload, never both, never neither.
#[derive(Debug, Clone, Default)]
pub struct PutFile {
    pub key: String,
    pub bucket: String,
    pub local_path: Option<PathBuf>,
    pub contents: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub acl: Option<String>,
    pub server_side_encryption: Option<String>,
}

impl PutFile {
    /// A file with an empty key never participates in a sync.
    pub fn is_zero(&self) -> bool {
        self.key.is_empty()
    }

    /// Resolve the upload payload. Fails with [`StoreError::InvalidPut`]
    /// when neither source is set.
    pub fn read_contents(&self) -> Result<Vec<u8>, StoreError> {
        if let Some(path) = &self.local_path {
            return Ok(std::fs::read(path)?);
        }
        if let Some(contents) = &self.contents {
            if !contents.is_empty() {
                return Ok(contents.clone());
            }
        }
        Err(StoreError::InvalidPut(self.key.clone()))
    }
}

/// Fallback metadata applied to every upload that doesn't set its own.
/// Explicit per-file values always win.
#[derive(Debug, Clone, Default)]
pub struct PutDefaults {
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub acl: Option<String>,
    pub server_side_encryption: Option<String>,
}

impl PutDefaults {
    /// Fill unset metadata fields on `file` from these defaults.
    pub fn apply(&self, file: &mut PutFile) {
        if file.content_type.is_none() {
            file.content_type = self.content_type.clone();
        }
        if file.content_disposition.is_none() {
            file.content_disposition = self.content_disposition.clone();
        }
        if file.acl.is_none() {
            file.acl = self.acl.clone();
        }
        if file.server_side_encryption.is_none() {
            file.server_side_encryption = self.server_side_encryption.clone();
        }
    }
}

/// Trait for object store backends.
///
/// `Sync` is required because the sync engine calls into the store from
/// rayon worker threads.
pub trait ObjectStore: Sync {
    /// List every object in a bucket. A missing bucket is
    /// [`StoreError::NotFound`], which callers treat as an empty listing.
    fn list(&self, bucket: &str) -> Result<Vec<RemoteObject>, StoreError>;

    /// Fetch an object's metadata and contents.
    fn get(&self, bucket: &str, key: &str) -> Result<(RemoteObject, Vec<u8>), StoreError>;

    /// Upload a file.
    fn put(&self, file: &PutFile) -> Result<(), StoreError>;

    /// Remove an object.
    fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;
}

/// Strip surrounding whitespace and one layer of literal quotes from an
/// etag value. Some backends report `"abc123"` rather than `abc123`.
pub fn strip_quotes(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(trimmed)
}

/// Normalize a key so local and remote spellings compare equal: ensure a
/// leading `/`.
pub fn normalize_key(key: &str) -> String {
    if key.starts_with('/') {
        key.to_string()
    } else {
        format!("/{key}")
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Mock store that keeps objects in memory and records every operation.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon workers.
    #[derive(Default)]
    pub struct MockStore {
        pub objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
        pub operations: Mutex<Vec<RecordedOp>>,
        /// When set, `list` reports the bucket as missing.
        pub bucket_missing: bool,
        /// Keys whose `put` fails, for partial-failure tests.
        pub fail_put_keys: HashSet<String>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        List { bucket: String },
        Get { key: String },
        Put { key: String, content_type: Option<String>, acl: Option<String> },
        Delete { key: String },
    }

    impl MockStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// A store pre-seeded with objects; etags are computed from the
        /// contents the same way `FsStore` computes them.
        pub fn with_objects(objects: Vec<(&str, &[u8])>) -> Self {
            let store = Self::default();
            for (key, contents) in objects {
                store.seed(key, contents);
            }
            store
        }

        pub fn seed(&self, key: &str, contents: &[u8]) {
            let etag = format!("{:x}", md5::compute(contents));
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), (etag, contents.to_vec()));
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn keys(&self) -> Vec<String> {
            let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
            keys.sort();
            keys
        }

        fn record(&self, op: RecordedOp) {
            self.operations.lock().unwrap().push(op);
        }
    }

    impl ObjectStore for MockStore {
        fn list(&self, bucket: &str) -> Result<Vec<RemoteObject>, StoreError> {
            self.record(RecordedOp::List { bucket: to_owned(bucket) });
            if self.bucket_missing {
                return Err(StoreError::NotFound(to_owned(bucket)));
            }
            let objects = self.objects.lock().unwrap();
            let mut listed: Vec<RemoteObject> = objects
                .iter()
                // Report etags quoted, the way S3 does, so callers must
                // strip them.
                .map(|(key, (etag, _))| RemoteObject {
                    key: key.clone(),
                    etag: format!("\"{etag}\""),
                })
                .collect();
            listed.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(listed)
        }

        fn get(&self, _bucket: &str, key: &str) -> Result<(RemoteObject, Vec<u8>), StoreError> {
            self.record(RecordedOp::Get { key: to_owned(key) });
            let objects = self.objects.lock().unwrap();
            let (etag, contents) = objects
                .get(key)
                .ok_or_else(|| StoreError::NotFound(to_owned(key)))?;
            Ok((
                RemoteObject { key: to_owned(key), etag: etag.clone() },
                contents.clone(),
            ))
        }

        fn put(&self, file: &PutFile) -> Result<(), StoreError> {
            self.record(RecordedOp::Put {
                key: file.key.clone(),
                content_type: file.content_type.clone(),
                acl: file.acl.clone(),
            });
            if self.fail_put_keys.contains(&file.key) {
                return Err(StoreError::OperationFailed(format!(
                    "injected put failure for {}",
                    file.key
                )));
            }
            let contents = file.read_contents()?;
            let etag = format!("{:x}", md5::compute(&contents));
            self.objects
                .lock()
                .unwrap()
                .insert(file.key.clone(), (etag, contents));
            Ok(())
        }

        fn delete(&self, _bucket: &str, key: &str) -> Result<(), StoreError> {
            self.record(RecordedOp::Delete { key: to_owned(key) });
            self.objects
                .lock()
                .unwrap()
                .remove(key)
                .ok_or_else(|| StoreError::NotFound(to_owned(key)))?;
            Ok(())
        }
    }

    fn to_owned(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn strip_quotes_removes_one_layer() {
        assert_eq!(strip_quotes("\"abc123\""), "abc123");
        assert_eq!(strip_quotes("abc123"), "abc123");
        assert_eq!(strip_quotes("  \"abc123\"  "), "abc123");
    }

    #[test]
    fn strip_quotes_keeps_unbalanced_quotes() {
        assert_eq!(strip_quotes("\"abc"), "\"abc");
        assert_eq!(strip_quotes("abc\""), "abc\"");
    }

    #[test]
    fn normalize_key_adds_leading_slash() {
        assert_eq!(normalize_key("a/b.jpg"), "/a/b.jpg");
        assert_eq!(normalize_key("/a/b.jpg"), "/a/b.jpg");
    }

    #[test]
    fn put_file_requires_a_source() {
        let file = PutFile { key: "/x".into(), ..Default::default() };
        assert!(matches!(
            file.read_contents(),
            Err(StoreError::InvalidPut(key)) if key == "/x"
        ));
    }

    #[test]
    fn put_file_reads_inline_contents() {
        let file = PutFile {
            key: "/x".into(),
            contents: Some(b"payload".to_vec()),
            ..Default::default()
        };
        assert_eq!(file.read_contents().unwrap(), b"payload");
    }

    #[test]
    fn put_defaults_fill_only_unset_fields() {
        let defaults = PutDefaults {
            acl: Some(ACL_PUBLIC_READ.into()),
            content_type: Some("application/octet-stream".into()),
            ..Default::default()
        };
        let mut file = PutFile {
            key: "/x".into(),
            content_type: Some("image/jpeg".into()),
            ..Default::default()
        };
        defaults.apply(&mut file);
        assert_eq!(file.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(file.acl.as_deref(), Some(ACL_PUBLIC_READ));
    }

    #[test]
    fn mock_store_lists_with_quoted_etags() {
        let store = MockStore::with_objects(vec![("/a.jpg", b"aaa" as &[u8])]);
        let listed = store.list("photos").unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].etag.starts_with('"'));
        assert_eq!(
            strip_quotes(&listed[0].etag),
            format!("{:x}", md5::compute(b"aaa"))
        );
    }

    #[test]
    fn mock_store_missing_bucket_is_not_found() {
        let store = MockStore { bucket_missing: true, ..Default::default() };
        let err = store.list("nope").unwrap_err();
        assert!(err.is_not_found());
    }
}
