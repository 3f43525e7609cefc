//! Directory-backed object store.
//!
//! `FsStore` maps a bucket to a subdirectory and a key to a file path
//! inside it. It exists for two reasons: it makes `gal-deploy` usable
//! against a plain directory target (a staging area another tool ships to
//! the host), and it is the end-to-end harness for the integration tests —
//! the sync engine cannot tell it apart from a cloud store.
//!
//! Etags are MD5 hex digests of file contents, computed on demand during
//! `list`, matching what [`etag`](crate::etag) computes locally. That makes
//! a repeated sync against an `FsStore` a no-op, same as against S3.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::etag::file_etag;
use crate::store::{ObjectStore, PutFile, RemoteObject, StoreError};

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// A store rooted at `root`. The directory itself is created lazily on
    /// first put.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    /// Resolve a key to a path inside the bucket, rejecting traversal.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let rel = key.trim_start_matches('/');
        if rel.is_empty() || rel.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(StoreError::OperationFailed(format!("invalid key: {key}")));
        }
        Ok(self.bucket_dir(bucket).join(rel))
    }
}

impl ObjectStore for FsStore {
    fn list(&self, bucket: &str) -> Result<Vec<RemoteObject>, StoreError> {
        let dir = self.bucket_dir(bucket);
        if !dir.is_dir() {
            return Err(StoreError::NotFound(bucket.to_string()));
        }
        let mut objects = Vec::new();
        for entry in WalkDir::new(&dir) {
            let entry = entry.map_err(|err| {
                StoreError::Io(err.into_io_error().unwrap_or_else(|| {
                    io::Error::other("walk entry lost")
                }))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let key = key_for(&dir, entry.path());
            let etag = file_etag(entry.path())?;
            objects.push(RemoteObject { key, etag });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn get(&self, bucket: &str, key: &str) -> Result<(RemoteObject, Vec<u8>), StoreError> {
        let path = self.object_path(bucket, key)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let contents = fs::read(&path)?;
        let etag = crate::etag::bytes_etag(&contents);
        Ok((
            RemoteObject {
                key: key.to_string(),
                etag,
            },
            contents,
        ))
    }

    fn put(&self, file: &PutFile) -> Result<(), StoreError> {
        let contents = file.read_contents()?;
        let path = self.object_path(&file.bucket, &file.key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        fs::remove_file(&path)?;
        Ok(())
    }
}

fn key_for(bucket_dir: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(bucket_dir).unwrap_or(path);
    let mut key = String::new();
    for part in rel.components() {
        key.push('/');
        key.push_str(&part.as_os_str().to_string_lossy());
    }
    key
}
