//! # gal-deploy
//!
//! Deploys a built static photo site to an object-store bucket. The build
//! output directory is the source of truth: whatever is in it after a sync
//! is exactly what the bucket holds — new and changed files uploaded,
//! orphaned remote objects pruned — and every key that *changed* comes back
//! out for CDN cache invalidation.
//!
//! # Architecture: Three-Phase Sync
//!
//! ```text
//! 1. List    bucket          →  remote index        (key → etag, read-only)
//! 2. Diff    local files     →  put new/changed     (parallel workers)
//! 3. Prune   remote orphans  →  delete              (parallel workers)
//! ```
//!
//! Change detection is by content hash, not timestamps: a local file's MD5
//! digest is compared against the remote etag for the same key, so a sync
//! after an identical rebuild is a no-op and a sync survives `git checkout`
//! resetting modification times. Phases 2 and 3 each fan out across a
//! fixed-size worker pool; phase 3 never starts before phase 2 has fully
//! recorded which keys exist locally.
//!
//! Per-file failures don't abort the run — the remaining files still sync,
//! every failure is reported, and one aggregate error is returned at the
//! end. A deploy of hundreds of photos shouldn't collapse because one file
//! was unreadable.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`sync`] | The engine — diff & upload, prune, orchestration, events |
//! | [`store`] | `ObjectStore` trait and transfer types; key/etag normalization |
//! | [`fs_store`] | Directory-backed store: local deploy targets, test harness |
//! | [`walk`] | Local file discovery with ignores; object key derivation |
//! | [`etag`] | MD5 content fingerprints, etag-compatible |
//! | [`content_type`] | MIME detection: extension map + magic-byte sniff |
//! | [`invalidate`] | CDN invalidation contract for changed keys |
//! | [`config`] | `deploy.toml` loading, defaults, stock config |
//! | [`output`] | CLI event formatting and the deploy report |
//!
//! # Design Decisions
//!
//! ## Store as a Trait
//!
//! The engine only ever sees [`store::ObjectStore`]. Cloud backends plug in
//! out of tree; the bundled [`fs_store::FsStore`] deploys to a plain
//! directory and doubles as the integration-test store, so the whole
//! pipeline is exercised without network access.
//!
//! ## New Keys Are Not Invalidated
//!
//! Invalidation exists to evict stale CDN copies. A key that never existed
//! remotely has no cached copies anywhere, so first-time uploads are
//! excluded from the changed-key list — invalidation requests are
//! rate-limited and sometimes billed, and a first deploy would otherwise
//! invalidate the entire site for nothing.
//!
//! ## Missing Bucket = Empty Bucket
//!
//! A listing that comes back "not found" is treated as an empty index, not
//! an error. The first deploy of a site targets a bucket that holds
//! nothing; failing on it would make bootstrap a special case.

pub mod config;
pub mod content_type;
pub mod etag;
pub mod fs_store;
pub mod invalidate;
pub mod output;
pub mod store;
pub mod sync;
pub mod walk;
