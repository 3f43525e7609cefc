//! CDN cache invalidation contract.
//!
//! After a sync, every changed key — replaced uploads and deletions — is
//! stale in any CDN fronting the bucket. The deploy pipeline hands the full
//! changed-key list to a [`CdnInvalidator`] in one batched call; concrete
//! implementations (CloudFront and friends) live out of tree. A failed
//! invalidation is fatal to the deploy: a sync that leaves stale edges
//! serving old content did not succeed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InvalidateError {
    #[error("no distribution configured")]
    NoDistribution,
    #[error("invalidation request failed: {0}")]
    Request(String),
}

/// A CDN that can mark cached keys stale.
pub trait CdnInvalidator {
    /// Issue one batched invalidation of `keys` against `distribution`.
    /// Called only with a non-empty key list.
    fn invalidate(&self, distribution: &str, keys: &[String]) -> Result<(), InvalidateError>;
}

/// Invalidator for targets with no CDN in front (e.g. an [`FsStore`]
/// staging directory): accepts every batch and does nothing.
///
/// [`FsStore`]: crate::fs_store::FsStore
pub struct NoopInvalidator;

impl CdnInvalidator for NoopInvalidator {
    fn invalidate(&self, _distribution: &str, _keys: &[String]) -> Result<(), InvalidateError> {
        Ok(())
    }
}
