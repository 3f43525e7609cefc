//! Deploy configuration.
//!
//! Loads `deploy.toml` from the project root. Every option has a safe
//! default, so the file is sparse — set only what you need. Flags override
//! config values (e.g. `--bucket`), and `gal-deploy gen-config` prints the
//! stock file with every option documented.
//!
//! ```toml
//! source = "dist"            # Directory to deploy
//! bucket = "my-photo-site"   # Target bucket
//! ignores = [".DS_Store", ".git"]
//!
//! [store]
//! root = "deploy"            # Directory-store root the bucket lives under
//!
//! [cdn]
//! distribution = "E2ABC..."  # Omit to skip invalidation
//!
//! [sync]
//! parallelism = 8            # Omit for auto (CPU cores)
//! acl = "public-read"        # Default ACL for uploads
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::PutDefaults;
use crate::sync::SyncManager;
use crate::walk::DEFAULT_IGNORES;

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILENAME: &str = "deploy.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    /// Directory whose contents are synchronized to the bucket.
    pub source: PathBuf,
    /// Target bucket. May be left empty and supplied with `--bucket`.
    pub bucket: String,
    /// Suffix patterns excluded from the upload set.
    pub ignores: Vec<String>,
    pub store: StoreConfig,
    pub cdn: CdnConfig,
    pub sync: SyncConfig,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("dist"),
            bucket: String::new(),
            ignores: DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect(),
            store: StoreConfig::default(),
            cdn: CdnConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

/// Directory-store settings (the bundled [`FsStore`](crate::fs_store::FsStore)
/// target). Cloud store endpoints are configured by their own tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Root directory buckets live under.
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("deploy"),
        }
    }
}

/// Optional CDN settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CdnConfig {
    /// Distribution identifier for invalidation requests.
    pub distribution: String,
}

impl CdnConfig {
    /// Whether a distribution is configured at all.
    pub fn is_zero(&self) -> bool {
        self.distribution.is_empty()
    }
}

/// Sync engine tuning and upload metadata defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Worker count for upload/prune phases. Omit for CPU cores.
    pub parallelism: Option<usize>,
    /// Default ACL for uploads.
    pub acl: Option<String>,
    /// Fallback content type when detection is overridden per deployment.
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub server_side_encryption: Option<String>,
}

impl DeployConfig {
    /// Load from an explicit path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load `deploy.toml` from `dir`, falling back to defaults when the
    /// file doesn't exist. A file that exists but fails to parse is an
    /// error — silently ignoring a typo'd config deploys to the wrong
    /// place.
    pub fn load_dir(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILENAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// Upload metadata fallbacks from the `[sync]` section.
    pub fn put_defaults(&self) -> PutDefaults {
        PutDefaults {
            content_type: self.sync.content_type.clone(),
            content_disposition: self.sync.content_disposition.clone(),
            acl: self.sync.acl.clone(),
            server_side_encryption: self.sync.server_side_encryption.clone(),
        }
    }

    /// Build a sync manager from this config.
    pub fn to_manager(&self, dry_run: bool) -> SyncManager {
        SyncManager {
            ignores: self.ignores.clone(),
            parallelism: self.sync.parallelism,
            dry_run,
            put_defaults: self.put_defaults(),
            ..SyncManager::new()
        }
    }
}

/// The stock `deploy.toml`, with every option present and documented.
/// Printed by `gal-deploy gen-config`.
pub fn stock_config_toml() -> String {
    r##"# gal-deploy configuration
# All options are optional - defaults shown below.

# Directory whose contents are synchronized to the bucket.
source = "dist"

# Target bucket. Can also be passed as --bucket.
bucket = ""

# Suffix patterns excluded from the upload set.
ignores = [".DS_Store", ".git"]

[store]
# Root directory buckets live under (directory-store target).
root = "deploy"

[cdn]
# Distribution identifier for cache invalidation. Empty = no CDN.
distribution = ""

[sync]
# Max parallel workers for upload and prune. Omit for auto = CPU cores.
# parallelism = 8

# Default ACL applied to every upload.
acl = "public-read"

# Fallback upload metadata. Detected content types always win.
# content_type = "application/octet-stream"
# content_disposition = "inline"
# server_side_encryption = "AES256"
"##
    .to_string()
}
