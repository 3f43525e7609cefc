//! Directory-to-object-store synchronization.
//!
//! The engine behind `gal-deploy deploy`: diff a local directory tree
//! against a bucket listing by content hash, upload what's new or changed,
//! prune what no longer exists locally, and report which keys changed so
//! the CDN layer can invalidate them.
//!
//! ## Protocol
//!
//! A sync is three phases with one hard ordering constraint:
//!
//! 1. **List** — fetch the full bucket listing once, building a read-only
//!    index of key → etag. A missing bucket is an empty index (a first
//!    deploy targets a bucket that holds nothing yet).
//! 2. **Diff & upload** — for every local file: record its key, compare
//!    its digest against the remote etag, and upload on absence or
//!    mismatch. Only keys that already existed remotely are marked for
//!    invalidation — nothing downstream can have cached a key that never
//!    existed.
//! 3. **Prune** — every remote key not observed during phase 2 is an
//!    orphan: delete it and mark it for invalidation.
//!
//! Phase 3 must not start until phase 2 has fully finished populating the
//! local key set, otherwise pruning races an incomplete view and deletes
//! objects whose local files simply haven't been visited yet. Within a
//! phase, order is meaningless: each file's decision depends only on the
//! immutable remote index.
//!
//! ## Concurrency
//!
//! Both worker phases fan out across a fixed-size rayon pool (default:
//! available cores). Per-item failures never abort sibling work — a sync
//! over hundreds of images shouldn't fail wholesale because one file is
//! unreadable. Failures are reported as [`SyncEvent::ItemFailed`] as they
//! happen and rolled up into one aggregate error after the phase drains,
//! so the operator sees every failing key in a single pass.
//!
//! The sync is not transactional: cancellation and partial failure leave
//! already-performed puts and deletes in place.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use rayon::prelude::*;
use thiserror::Error;

use crate::content_type;
use crate::etag;
use crate::store::{normalize_key, strip_quotes, ObjectStore, PutDefaults, PutFile, StoreError};
use crate::walk::{self, DEFAULT_IGNORES, WalkError};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("listing bucket {bucket} failed: {source}")]
    Listing { bucket: String, source: StoreError },
    #[error("walking {root} failed: {source}")]
    Walk { root: PathBuf, source: WalkError },
    #[error("issues {stage}: {failed} of {total} items failed")]
    Aggregate {
        stage: Stage,
        failed: usize,
        total: usize,
    },
    #[error("worker pool init failed: {0}")]
    Pool(String),
    #[error("sync cancelled")]
    Cancelled,
}

/// Which worker phase an aggregate error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Prune,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Upload => write!(f, "sending files"),
            Stage::Prune => write!(f, "removing files"),
        }
    }
}

/// Failure of a single work item. Isolated to that item; surfaced via
/// [`SyncEvent::ItemFailed`] and counted into the aggregate stage error.
#[derive(Error, Debug)]
enum ItemError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Progress events emitted during a sync, in the order decisions are made.
/// Workers emit concurrently, so cross-key ordering is not meaningful.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The remote index was built; phase 2 is about to start.
    RemoteIndexed { objects: usize, files: usize },
    /// Local digest matched the remote etag; nothing to do.
    Unchanged { key: String },
    /// The file was uploaded (or would be, on a dry run). `replaced` is
    /// true when the key already existed remotely.
    Uploaded {
        key: String,
        content_type: String,
        replaced: bool,
        dry_run: bool,
    },
    /// A remote orphan was deleted (or would be, on a dry run).
    Deleted { key: String, dry_run: bool },
    /// The remote object still has a local counterpart.
    Kept { key: String },
    /// One work item failed; siblings keep going.
    ItemFailed { key: String, error: String },
}

/// Cooperative cancellation handle, observed by workers between items.
/// In-flight store calls are not interrupted and nothing is rolled back.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sync parameters plus the operations that use them.
///
/// Every field has a safe default ([`SyncManager::new`]); callers override
/// explicitly. The manager holds no connection state — the store comes in
/// per call — so one manager can serve many syncs.
#[derive(Debug, Clone)]
pub struct SyncManager {
    /// Suffix patterns excluded from the local walk.
    pub ignores: Vec<String>,
    /// Worker pool size for both phases. `None` means available cores.
    pub parallelism: Option<usize>,
    /// Compute and report every decision, but perform no put or delete.
    pub dry_run: bool,
    /// Metadata fallbacks applied to uploads that don't set their own.
    pub put_defaults: PutDefaults,
    /// Shared cancellation handle.
    pub cancel: CancelFlag,
}

impl Default for SyncManager {
    fn default() -> Self {
        Self {
            ignores: DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect(),
            parallelism: None,
            dry_run: false,
            put_defaults: PutDefaults::default(),
            cancel: CancelFlag::new(),
        }
    }
}

impl SyncManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker count for this sync: the configured parallelism, or the
    /// number of available cores.
    pub fn effective_parallelism(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.parallelism.filter(|n| *n > 0).unwrap_or(cores)
    }

    /// Synchronize `root` into `bucket`, returning the keys that changed
    /// — replaced uploads plus deletions — for downstream invalidation.
    /// New keys are uploaded but not reported as changed.
    ///
    /// `events` is an optional progress channel; pass `None` for silence.
    pub fn sync_directory(
        &self,
        store: &dyn ObjectStore,
        root: &Path,
        bucket: &str,
        events: Option<Sender<SyncEvent>>,
    ) -> Result<Vec<String>, SyncError> {
        let remote_objects = match store.list(bucket) {
            Ok(objects) => objects,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(source) => {
                return Err(SyncError::Listing {
                    bucket: bucket.to_string(),
                    source,
                });
            }
        };

        // Read-only for the rest of the sync.
        let remote_index: HashMap<String, String> = remote_objects
            .iter()
            .map(|obj| {
                (
                    normalize_key(&obj.key),
                    strip_quotes(&obj.etag).to_string(),
                )
            })
            .collect();

        let local_files = walk::walk_files(root, &self.ignores).map_err(|source| {
            SyncError::Walk {
                root: root.to_path_buf(),
                source,
            }
        })?;

        emit(
            &events,
            SyncEvent::RemoteIndexed {
                objects: remote_index.len(),
                files: local_files.len(),
            },
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.effective_parallelism())
            .build()
            .map_err(|err| SyncError::Pool(err.to_string()))?;

        let local_keys = Mutex::new(HashSet::new());
        let invalidated = Mutex::new(Vec::new());

        // Phase 2: diff & upload.
        let failed = Mutex::new(0usize);
        pool.install(|| {
            local_files
                .par_iter()
                .for_each_with(events.clone(), |events, path| {
                    if self.cancel.is_cancelled() {
                        return;
                    }
                    let key = walk::object_key(root, path);
                    // Always recorded, regardless of the upload decision:
                    // the prune phase needs every local key.
                    local_keys.lock().unwrap().insert(key.clone());
                    match self.sync_file(store, bucket, path, &key, &remote_index, events) {
                        Ok(Some(changed)) => invalidated.lock().unwrap().push(changed),
                        Ok(None) => {}
                        Err(err) => {
                            emit(
                                events,
                                SyncEvent::ItemFailed {
                                    key,
                                    error: err.to_string(),
                                },
                            );
                            *failed.lock().unwrap() += 1;
                        }
                    }
                });
        });
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let upload_failures = *failed.lock().unwrap();
        if upload_failures > 0 {
            return Err(SyncError::Aggregate {
                stage: Stage::Upload,
                failed: upload_failures,
                total: local_files.len(),
            });
        }

        // The pool has joined: the key set is complete and safe to read
        // without the lock.
        let local_keys = local_keys.into_inner().unwrap();

        // Phase 3: prune orphans.
        let failed = Mutex::new(0usize);
        pool.install(|| {
            remote_objects
                .par_iter()
                .for_each_with(events.clone(), |events, obj| {
                    if self.cancel.is_cancelled() {
                        return;
                    }
                    let key = normalize_key(&obj.key);
                    if local_keys.contains(&key) {
                        emit(events, SyncEvent::Kept { key });
                        return;
                    }
                    if !self.dry_run {
                        // Delete by the key exactly as the store listed it.
                        if let Err(err) = store.delete(bucket, &obj.key) {
                            emit(
                                events,
                                SyncEvent::ItemFailed {
                                    key,
                                    error: err.to_string(),
                                },
                            );
                            *failed.lock().unwrap() += 1;
                            return;
                        }
                    }
                    emit(
                        events,
                        SyncEvent::Deleted {
                            key: key.clone(),
                            dry_run: self.dry_run,
                        },
                    );
                    invalidated.lock().unwrap().push(key);
                });
        });
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let prune_failures = *failed.lock().unwrap();
        if prune_failures > 0 {
            return Err(SyncError::Aggregate {
                stage: Stage::Prune,
                failed: prune_failures,
                total: remote_objects.len(),
            });
        }

        Ok(invalidated.into_inner().unwrap())
    }

    /// Diff one local file against the remote index; upload on absence or
    /// mismatch. Returns the key if it must be invalidated downstream.
    fn sync_file(
        &self,
        store: &dyn ObjectStore,
        bucket: &str,
        path: &Path,
        key: &str,
        remote_index: &HashMap<String, String>,
        events: &Option<Sender<SyncEvent>>,
    ) -> Result<Option<String>, ItemError> {
        let remote_etag = remote_index.get(key);
        if let Some(remote_etag) = remote_etag {
            // Hash only when there is a remote counterpart to compare
            // against; a definitely-new file uploads unconditionally.
            let local_etag = etag::file_etag(path)?;
            if &local_etag == remote_etag {
                emit(events, SyncEvent::Unchanged { key: key.to_string() });
                return Ok(None);
            }
        }

        let content_type = content_type::detect(path)?;
        let mut file = PutFile {
            key: key.to_string(),
            bucket: bucket.to_string(),
            local_path: Some(path.to_path_buf()),
            content_type: Some(content_type.clone()),
            ..Default::default()
        };
        self.put_defaults.apply(&mut file);

        if !self.dry_run {
            store.put(&file)?;
        }

        let replaced = remote_etag.is_some();
        emit(
            events,
            SyncEvent::Uploaded {
                key: key.to_string(),
                content_type,
                replaced,
                dry_run: self.dry_run,
            },
        );
        Ok(replaced.then(|| key.to_string()))
    }
}

fn emit(events: &Option<Sender<SyncEvent>>, event: SyncEvent) {
    if let Some(tx) = events {
        // A dropped receiver silences events; it never fails the sync.
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{MockStore, RecordedOp};
    use std::fs;
    use tempfile::TempDir;

    fn write_site(tmp: &TempDir, files: &[(&str, &[u8])]) {
        for (rel, contents) in files {
            let path = tmp.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
    }

    fn puts(store: &MockStore) -> Vec<String> {
        store
            .get_operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Put { key, .. } => Some(key),
                _ => None,
            })
            .collect()
    }

    fn deletes(store: &MockStore) -> Vec<String> {
        store
            .get_operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Delete { key } => Some(key),
                _ => None,
            })
            .collect()
    }

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn upload_on_new_is_not_invalidated() {
        let tmp = TempDir::new().unwrap();
        write_site(&tmp, &[("a.jpg", b"fresh" as &[u8])]);
        let store = MockStore::new();

        let invalidated = SyncManager::new()
            .sync_directory(&store, tmp.path(), "photos", None)
            .unwrap();

        assert_eq!(puts(&store), vec!["/a.jpg"]);
        assert!(invalidated.is_empty());
    }

    #[test]
    fn skip_on_match_neither_uploads_nor_invalidates() {
        let tmp = TempDir::new().unwrap();
        write_site(&tmp, &[("b.jpg", b"same bytes" as &[u8])]);
        let store = MockStore::with_objects(vec![("/b.jpg", b"same bytes" as &[u8])]);

        let invalidated = SyncManager::new()
            .sync_directory(&store, tmp.path(), "photos", None)
            .unwrap();

        assert!(puts(&store).is_empty());
        assert!(deletes(&store).is_empty());
        assert!(invalidated.is_empty());
    }

    #[test]
    fn upload_on_change_is_invalidated() {
        let tmp = TempDir::new().unwrap();
        write_site(&tmp, &[("c.jpg", b"new contents" as &[u8])]);
        let store = MockStore::with_objects(vec![("/c.jpg", b"old contents" as &[u8])]);

        let invalidated = SyncManager::new()
            .sync_directory(&store, tmp.path(), "photos", None)
            .unwrap();

        assert_eq!(puts(&store), vec!["/c.jpg"]);
        assert_eq!(invalidated, vec!["/c.jpg"]);
    }

    #[test]
    fn prune_deletes_and_invalidates_orphans() {
        let tmp = TempDir::new().unwrap();
        let store = MockStore::with_objects(vec![("/d.jpg", b"orphan" as &[u8])]);

        let invalidated = SyncManager::new()
            .sync_directory(&store, tmp.path(), "photos", None)
            .unwrap();

        assert_eq!(deletes(&store), vec!["/d.jpg"]);
        assert_eq!(invalidated, vec!["/d.jpg"]);
        assert!(store.keys().is_empty());
    }

    #[test]
    fn full_scenario_matches_expected_invalidations() {
        // a.jpg new; b.jpg unchanged; c.jpg changed; /d.jpg orphaned.
        let tmp = TempDir::new().unwrap();
        write_site(
            &tmp,
            &[
                ("a.jpg", b"a new" as &[u8]),
                ("b.jpg", b"b same"),
                ("c.jpg", b"c changed"),
            ],
        );
        let store = MockStore::with_objects(vec![
            ("/b.jpg", b"b same" as &[u8]),
            ("/c.jpg", b"c original"),
            ("/d.jpg", b"d orphan"),
        ]);

        let invalidated = SyncManager::new()
            .sync_directory(&store, tmp.path(), "photos", None)
            .unwrap();

        assert_eq!(sorted(puts(&store)), vec!["/a.jpg", "/c.jpg"]);
        assert_eq!(deletes(&store), vec!["/d.jpg"]);
        assert_eq!(sorted(invalidated), vec!["/c.jpg", "/d.jpg"]);
        assert_eq!(store.keys(), vec!["/a.jpg", "/b.jpg", "/c.jpg"]);
    }

    #[test]
    fn second_sync_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        write_site(&tmp, &[("index.html", b"<html></html>" as &[u8]), ("p/x.jpg", b"pix")]);
        let store = MockStore::new();

        let manager = SyncManager::new();
        manager
            .sync_directory(&store, tmp.path(), "photos", None)
            .unwrap();

        let second = manager
            .sync_directory(&store, tmp.path(), "photos", None)
            .unwrap();

        assert!(second.is_empty());
        // Exactly the two first-run puts; the second run mutated nothing.
        assert_eq!(puts(&store).len(), 2);
        assert!(deletes(&store).is_empty());
    }

    #[test]
    fn dry_run_reports_without_mutating() {
        let tmp = TempDir::new().unwrap();
        write_site(&tmp, &[("a.jpg", b"new" as &[u8]), ("c.jpg", b"changed")]);
        let store = MockStore::with_objects(vec![
            ("/c.jpg", b"original" as &[u8]),
            ("/d.jpg", b"orphan"),
        ]);

        let manager = SyncManager {
            dry_run: true,
            ..SyncManager::new()
        };
        let invalidated = manager
            .sync_directory(&store, tmp.path(), "photos", None)
            .unwrap();

        assert!(puts(&store).is_empty());
        assert!(deletes(&store).is_empty());
        // Same report a real run would produce.
        assert_eq!(sorted(invalidated), vec!["/c.jpg", "/d.jpg"]);
        assert_eq!(store.keys(), vec!["/c.jpg", "/d.jpg"]);
    }

    #[test]
    fn missing_bucket_syncs_as_empty() {
        let tmp = TempDir::new().unwrap();
        write_site(&tmp, &[("a.jpg", b"fresh" as &[u8])]);
        let store = MockStore {
            bucket_missing: true,
            ..Default::default()
        };

        let invalidated = SyncManager::new()
            .sync_directory(&store, tmp.path(), "photos", None)
            .unwrap();

        assert!(invalidated.is_empty());
        assert_eq!(puts(&store), vec!["/a.jpg"]);
    }

    #[test]
    fn one_bad_item_does_not_stop_siblings() {
        let tmp = TempDir::new().unwrap();
        write_site(
            &tmp,
            &[
                ("ok1.jpg", b"one" as &[u8]),
                ("bad.jpg", b"two"),
                ("ok2.jpg", b"three"),
            ],
        );
        let store = MockStore {
            fail_put_keys: ["/bad.jpg".to_string()].into_iter().collect(),
            ..Default::default()
        };

        let err = SyncManager::new()
            .sync_directory(&store, tmp.path(), "photos", None)
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::Aggregate { stage: Stage::Upload, failed: 1, total: 3 }
        ));
        // The other two made it.
        assert_eq!(store.keys(), vec!["/ok1.jpg", "/ok2.jpg"]);
        assert_eq!(puts(&store).len(), 3);
    }

    #[test]
    fn item_failures_are_reported_individually() {
        let tmp = TempDir::new().unwrap();
        write_site(&tmp, &[("ok.jpg", b"one" as &[u8]), ("bad.jpg", b"two")]);
        let store = MockStore {
            fail_put_keys: ["/bad.jpg".to_string()].into_iter().collect(),
            ..Default::default()
        };

        let (tx, rx) = std::sync::mpsc::channel();
        SyncManager::new()
            .sync_directory(&store, tmp.path(), "photos", Some(tx))
            .unwrap_err();

        let events: Vec<SyncEvent> = rx.iter().collect();
        let failures: Vec<&SyncEvent> = events
            .iter()
            .filter(|e| matches!(e, SyncEvent::ItemFailed { .. }))
            .collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0],
            SyncEvent::ItemFailed { key, .. } if key == "/bad.jpg"
        ));
    }

    #[test]
    fn cancelled_sync_performs_no_work() {
        let tmp = TempDir::new().unwrap();
        write_site(&tmp, &[("a.jpg", b"fresh" as &[u8])]);
        let store = MockStore::new();

        let manager = SyncManager::new();
        manager.cancel.cancel();
        let err = manager
            .sync_directory(&store, tmp.path(), "photos", None)
            .unwrap_err();

        assert!(matches!(err, SyncError::Cancelled));
        assert!(puts(&store).is_empty());
    }

    #[test]
    fn events_narrate_the_sync() {
        let tmp = TempDir::new().unwrap();
        write_site(&tmp, &[("same.jpg", b"same" as &[u8]), ("new.jpg", b"new")]);
        let store = MockStore::with_objects(vec![
            ("/same.jpg", b"same" as &[u8]),
            ("/gone.jpg", b"orphan"),
        ]);

        let (tx, rx) = std::sync::mpsc::channel();
        SyncManager::new()
            .sync_directory(&store, tmp.path(), "photos", Some(tx))
            .unwrap();

        let events: Vec<SyncEvent> = rx.iter().collect();
        assert!(events.contains(&SyncEvent::RemoteIndexed { objects: 2, files: 2 }));
        assert!(events.contains(&SyncEvent::Unchanged { key: "/same.jpg".into() }));
        assert!(events.contains(&SyncEvent::Uploaded {
            key: "/new.jpg".into(),
            content_type: "image/jpeg".into(),
            replaced: false,
            dry_run: false,
        }));
        assert!(events.contains(&SyncEvent::Deleted { key: "/gone.jpg".into(), dry_run: false }));
    }

    #[test]
    fn put_defaults_reach_the_store() {
        let tmp = TempDir::new().unwrap();
        write_site(&tmp, &[("a.jpg", b"fresh" as &[u8])]);
        let store = MockStore::new();

        let manager = SyncManager {
            put_defaults: PutDefaults {
                acl: Some(crate::store::ACL_PUBLIC_READ.into()),
                ..Default::default()
            },
            ..SyncManager::new()
        };
        manager
            .sync_directory(&store, tmp.path(), "photos", None)
            .unwrap();

        let ops = store.get_operations();
        assert!(ops.iter().any(|op| matches!(
            op,
            RecordedOp::Put { key, content_type, acl }
                if key == "/a.jpg"
                    && content_type.as_deref() == Some("image/jpeg")
                    && acl.as_deref() == Some(crate::store::ACL_PUBLIC_READ)
        )));
    }

    #[test]
    fn explicit_parallelism_is_honored() {
        let manager = SyncManager {
            parallelism: Some(2),
            ..SyncManager::new()
        };
        assert_eq!(manager.effective_parallelism(), 2);

        let auto = SyncManager::new();
        assert!(auto.effective_parallelism() >= 1);
    }
}
