//! CLI output formatting for deploys.
//!
//! The sync engine emits [`SyncEvent`]s on a channel; the CLI drains them
//! on a printer thread so network workers never block on the terminal.
//! This module owns the line format for each event and the end-of-run
//! summary, so `deploy` and `plan` output stays consistent.

use serde::Serialize;

use crate::sync::SyncEvent;

/// One line per event. Dry-run variants mirror the real lines so a `plan`
/// reads like the deploy it predicts.
pub fn format_sync_event(event: &SyncEvent) -> String {
    match event {
        SyncEvent::RemoteIndexed { objects, files } => {
            format!("Remote index: {objects} objects, {files} local files")
        }
        SyncEvent::Unchanged { key } => format!("    unchanged {key}"),
        SyncEvent::Uploaded {
            key,
            content_type,
            replaced,
            dry_run,
        } => {
            let verb = if *dry_run { "(dry run) put" } else { "put" };
            let suffix = if *replaced { ", replaces remote" } else { "" };
            format!("    {verb} {key} ({content_type}{suffix})")
        }
        SyncEvent::Deleted { key, dry_run } => {
            let verb = if *dry_run { "(dry run) removed" } else { "removed" };
            format!("    {verb} {key}")
        }
        SyncEvent::Kept { key } => format!("    keeping {key}"),
        SyncEvent::ItemFailed { key, error } => format!("    error {key}: {error}"),
    }
}

/// Machine-readable record of what a deploy did, written by
/// `deploy --report`.
#[derive(Debug, Default, Serialize)]
pub struct DeployReport {
    pub bucket: String,
    pub dry_run: bool,
    /// Keys uploaded for the first time.
    pub uploaded: Vec<String>,
    /// Keys uploaded over an existing remote object.
    pub replaced: Vec<String>,
    /// Remote orphans removed.
    pub deleted: Vec<String>,
    pub unchanged: usize,
    /// Changed keys handed to the CDN layer.
    pub invalidated: Vec<String>,
}

impl DeployReport {
    pub fn from_events(
        bucket: &str,
        dry_run: bool,
        events: &[SyncEvent],
        invalidated: &[String],
    ) -> Self {
        let mut report = Self {
            bucket: bucket.to_string(),
            dry_run,
            invalidated: invalidated.to_vec(),
            ..Default::default()
        };
        for event in events {
            match event {
                SyncEvent::Uploaded { key, replaced, .. } => {
                    if *replaced {
                        report.replaced.push(key.clone());
                    } else {
                        report.uploaded.push(key.clone());
                    }
                }
                SyncEvent::Deleted { key, .. } => report.deleted.push(key.clone()),
                SyncEvent::Unchanged { .. } => report.unchanged += 1,
                _ => {}
            }
        }
        report.uploaded.sort();
        report.replaced.sort();
        report.deleted.sort();
        report
    }

    /// Human summary printed after the event stream.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} new, {} replaced, {} removed, {} unchanged; {} to invalidate",
            self.uploaded.len(),
            self.replaced.len(),
            self.deleted.len(),
            self.unchanged,
            self.invalidated.len(),
        );
        if self.dry_run {
            line.push_str(" (dry run)");
        }
        line
    }
}
