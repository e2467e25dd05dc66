//! Remote repository collaborator contracts.
//!
//! The wire protocol and authentication live behind these traits:
//! - [`RepositoryClient`]: one live session against a repository
//! - [`RepositoryConnector`]: opens sessions for a URL and credentials
//! - [`Credentials`]: opaque identity, used only as a cache namespace key
//!
//! [`memory::InMemoryRepository`] implements all of them without a network.

pub mod memory;

use crate::config::RemoteConfig;
use crate::error::Result;
use crate::model::{DirListing, NodeKind, Revision};
use std::time::Duration;
use url::Url;

/// A live session against one remote repository.
///
/// Sessions are not expected to be safe for concurrent use; the view
/// serializes access to its client.
pub trait RepositoryClient: Send {
    /// UUID identifying the repository.
    fn uuid(&mut self) -> Result<String>;

    /// Kind of node at `path` as of `revision`.
    fn check_path(&mut self, path: &str, revision: Revision) -> Result<NodeKind>;

    /// Directory listing with the revision it resolved to.
    fn get_dir(&mut self, path: &str, revision: Revision) -> Result<DirListing>;

    /// Resolve a file's revision. File content is not transferred.
    fn get_file(&mut self, path: &str, revision: Revision) -> Result<u64>;

    /// Current head revision.
    fn latest_revision(&mut self) -> Result<u64>;

    /// Release the session.
    fn close(&mut self);
}

/// Opaque credential identity.
pub trait Credentials: Send + Sync {
    /// Stable identifier, used purely to partition the cache.
    fn id(&self) -> &str;
}

/// Credential identity known only by its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialId(String);

impl CredentialId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl Credentials for CredentialId {
    fn id(&self) -> &str {
        &self.0
    }
}

/// Transport options handed to a connector.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    /// Requested read timeout. `None` or zero means "not configured".
    pub read_timeout: Option<Duration>,
}

impl ConnectionOptions {
    /// Read timeout the transport must enforce.
    ///
    /// A missing or zero timeout would let a blocked read hang forever, so it
    /// is replaced by [`RemoteConfig::DEFAULT_READ_TIMEOUT`].
    pub fn effective_read_timeout(&self) -> Duration {
        match self.read_timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => RemoteConfig::DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Opens repository sessions.
pub trait RepositoryConnector {
    fn connect(
        &self,
        url: &Url,
        credentials: Option<&dyn Credentials>,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn RepositoryClient>>;
}
