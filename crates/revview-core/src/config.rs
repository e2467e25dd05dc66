//! Centralized configuration for revview.
//!
//! Constant holders for store naming, remote defaults and cache paths, plus the
//! runtime [`ViewConfig`] a host passes when opening a view.

use crate::error::{Result, RevViewError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Cache store naming.
pub struct StoreConfig;

impl StoreConfig {
    pub const FILE_PREFIX: &'static str = "repo-";
    pub const FILE_EXTENSION: &'static str = "db";
    /// Namespace used when no credentials are supplied.
    pub const ANONYMOUS_NAMESPACE: &'static str = "data";
    pub const NAMESPACE_PREFIX: &'static str = "data-";
}

/// Remote repository defaults.
pub struct RemoteConfig;

impl RemoteConfig {
    /// Floor applied when the transport has no read timeout configured.
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
}

/// Shared directory configuration.
pub struct PathsConfig;

impl PathsConfig {
    pub const CACHE_DIR_NAME: &'static str = "caches";
    pub const APP_DIR_NAME: &'static str = "revview";
}

/// Characters not allowed in a cache file name.
static UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._\-]").unwrap());

/// Runtime options for opening a repository view.
#[derive(Debug, Clone, Default)]
pub struct ViewConfig {
    /// Base directory under which `caches/` is created.
    ///
    /// `None` uses the platform cache directory.
    pub cache_root: Option<PathBuf>,
    /// Maximum store-open attempts before giving up.
    ///
    /// `None` retries until the store opens.
    pub store_open_attempts: Option<u32>,
    /// Read timeout requested from the transport.
    pub read_timeout: Option<Duration>,
}

impl ViewConfig {
    /// Reject option combinations that can never open a view.
    pub fn validate(&self) -> Result<()> {
        if self.store_open_attempts == Some(0) {
            return Err(RevViewError::Config {
                message: "store_open_attempts must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Resolve the base directory for cache files.
    pub fn resolved_cache_root(&self) -> PathBuf {
        match &self.cache_root {
            Some(root) => root.clone(),
            None => default_cache_root(),
        }
    }

    /// Location of the cache store for a repository UUID.
    pub fn cache_file(&self, uuid: &str) -> PathBuf {
        cache_file_in(&self.resolved_cache_root(), uuid)
    }
}

/// Platform cache directory, falling back to the system temp directory.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(PathsConfig::APP_DIR_NAME)
}

/// `<root>/caches/repo-<uuid>.db`, with the UUID made filesystem-safe.
pub fn cache_file_in(root: &Path, uuid: &str) -> PathBuf {
    let safe_uuid = UNSAFE_FILE_CHARS.replace_all(uuid, "_");
    root.join(PathsConfig::CACHE_DIR_NAME).join(format!(
        "{}{}.{}",
        StoreConfig::FILE_PREFIX,
        safe_uuid,
        StoreConfig::FILE_EXTENSION
    ))
}

/// Namespace name for a credential identity.
pub fn namespace_for(credential_id: Option<&str>) -> String {
    match credential_id {
        Some(id) => format!("{}{}", StoreConfig::NAMESPACE_PREFIX, id),
        None => StoreConfig::ANONYMOUS_NAMESPACE.to_string(),
    }
}
