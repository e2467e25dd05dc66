//! Revision-addressed view over one remote repository.
//!
//! A [`RepositoryView`] answers "what is at this path, at this revision" from
//! its cache whenever the cached entry was captured at exactly the requested
//! revision, and otherwise asks the remote. If the remote cannot be reached the
//! last cached answer is served, whatever revision it was captured at.

use crate::config::{namespace_for, ViewConfig};
use crate::error::{Result, RevViewError};
use crate::model::{NodeEntry, NodeKind, Revision};
use crate::path::normalize_path;
use crate::remote::{ConnectionOptions, Credentials, RepositoryClient, RepositoryConnector};
use crate::store::{open_with_retry, NodeCache, NodeStore};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

type Client = Box<dyn RepositoryClient>;

/// Cached metadata view of one remote repository.
///
/// Owns one remote session and one cache store. Remote calls are serialized
/// through an internal lock; cache reads and writes are individually atomic.
/// Two callers missing on the same path may both refresh it, which is safe
/// since refreshes are idempotent.
pub struct RepositoryView {
    uuid: String,
    /// `None` once closed.
    client: Mutex<Option<Client>>,
    cache: NodeCache,
    cache_path: Option<PathBuf>,
}

impl RepositoryView {
    /// Create a builder for a repository URL.
    pub fn builder(url: Url) -> RepositoryViewBuilder {
        RepositoryViewBuilder::new(url)
    }

    /// Connect to a repository and open its cache.
    pub fn open(
        connector: &dyn RepositoryConnector,
        url: &Url,
        credentials: Option<&dyn Credentials>,
        config: &ViewConfig,
    ) -> Result<Self> {
        config.validate()?;
        let options = ConnectionOptions {
            read_timeout: config.read_timeout,
        };
        let client = connector.connect(url, credentials, &options)?;
        Self::with_client(client, credentials.map(|c| c.id()), config)
    }

    /// Build a view around an already-open session.
    ///
    /// The session is closed if the view cannot be built.
    pub fn with_client(
        mut client: Client,
        credential_id: Option<&str>,
        config: &ViewConfig,
    ) -> Result<Self> {
        let setup = config.validate().and_then(|()| {
            let uuid = client.uuid()?;
            let cache_path = config.cache_file(&uuid);
            let store = open_with_retry(&cache_path, config.store_open_attempts)?;
            Ok((uuid, cache_path, store))
        });

        let (uuid, cache_path, store) = match setup {
            Ok(parts) => parts,
            Err(e) => {
                client.close();
                return Err(e);
            }
        };

        Ok(Self::assemble(
            uuid,
            client,
            Arc::new(store),
            credential_id,
            Some(cache_path),
        ))
    }

    /// Build a view around an open session and a caller-supplied store.
    pub fn with_store(
        mut client: Client,
        store: Arc<dyn NodeStore>,
        credential_id: Option<&str>,
    ) -> Result<Self> {
        let uuid = match client.uuid() {
            Ok(uuid) => uuid,
            Err(e) => {
                client.close();
                return Err(e);
            }
        };
        Ok(Self::assemble(uuid, client, store, credential_id, None))
    }

    fn assemble(
        uuid: String,
        client: Client,
        store: Arc<dyn NodeStore>,
        credential_id: Option<&str>,
        cache_path: Option<PathBuf>,
    ) -> Self {
        let cache = NodeCache::new(store, namespace_for(credential_id));
        if let Err(e) = cache.store().commit() {
            debug!("Initial cache commit failed: {}", e);
        }

        info!(
            "Opened repository view {} (namespace '{}')",
            uuid,
            cache.namespace()
        );

        Self {
            uuid,
            client: Mutex::new(Some(client)),
            cache,
            cache_path,
        }
    }

    /// UUID of the remote repository.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Location of the cache store, when the view opened it itself.
    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    /// Cache namespace selected by the credential identity.
    pub fn namespace(&self) -> &str {
        self.cache.namespace()
    }

    /// The backing store, for inspection.
    pub fn store(&self) -> &Arc<dyn NodeStore> {
        self.cache.store()
    }

    /// Whether the cache store has been closed.
    pub fn is_closed(&self) -> bool {
        self.cache.store().is_closed()
    }

    /// Close the remote session and the cache store. Idempotent.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }

        let client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut client) = client {
            client.close();
        }

        if let Err(e) = self.cache.store().close() {
            warn!("Failed to close cache store for {}: {}", self.uuid, e);
        }
        info!("Closed repository view {}", self.uuid);
    }

    fn remote<T>(&self, op: impl FnOnce(&mut Client) -> Result<T>) -> Result<T> {
        let mut guard = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        let client = guard.as_mut().ok_or(RevViewError::StoreClosed)?;
        op(client)
    }

    /// Head revision of the remote repository. Never cached.
    pub fn latest_revision(&self) -> Result<u64> {
        self.remote(|client| client.latest_revision())
    }

    /// Kind of node at `path` as of `revision`.
    ///
    /// Directories are cached together with their children, so a later
    /// [`get_node`](Self::get_node) at the same resolved revision is free.
    pub fn check_path(&self, path: &str, revision: Revision) -> Result<NodeKind> {
        let path = normalize_path(path);
        let cached = self.cache.lookup(&path);

        if let Some(entry) = &cached {
            if entry.revision() == revision {
                debug!("Cache hit for {} at {}", path, revision);
                return Ok(entry.kind());
            }
        }

        debug!("Refreshing {} at {}", path, revision);
        let fetched = self.remote(|client| {
            let kind = client.check_path(&path, revision)?;
            if kind == NodeKind::Directory {
                Ok(NodeEntry::directory(client.get_dir(&path, revision)?))
            } else {
                Ok(NodeEntry::without_children(revision, kind))
            }
        });

        match fetched {
            Ok(entry) => {
                self.cache.remember(&path, &entry);
                Ok(entry.kind())
            }
            Err(e) => self.fall_back(&path, cached, e).map(|entry| entry.kind()),
        }
    }

    /// Full description of the node at `path` as of `revision`.
    ///
    /// A directory is always returned with its children. Listing them is the
    /// one remote call that has no cached fallback: if it fails, this fails.
    pub fn get_node(&self, path: &str, revision: Revision) -> Result<NodeEntry> {
        let path = normalize_path(path);
        let cached = self.cache.lookup(&path);

        let (entry, fetched) = match cached {
            Some(entry) if entry.revision() == revision => {
                debug!("Cache hit for {} at {}", path, revision);
                (entry, false)
            }
            cached => {
                debug!("Refreshing {} at {}", path, revision);
                match self.fetch_node(&path, revision) {
                    Ok(entry) => {
                        // Directories are only cached complete, and pinned
                        // directory listings are never cached from here.
                        if !entry.is_directory() {
                            self.cache.remember(&path, &entry);
                        }
                        (entry, true)
                    }
                    Err(e) => (self.fall_back(&path, cached, e)?, false),
                }
            }
        };

        if entry.is_complete() {
            return Ok(entry);
        }

        debug!("Listing children of {} at {}", path, revision);
        let listing = self.remote(|client| client.get_dir(&path, revision))?;
        let completed = NodeEntry::directory(listing);
        // Only repair entries that came from the cache; a fresh pinned listing stays unstored.
        if !fetched {
            self.cache.remember(&path, &completed);
        }
        Ok(completed)
    }

    fn fetch_node(&self, path: &str, revision: Revision) -> Result<NodeEntry> {
        self.remote(|client| {
            let kind = client.check_path(path, revision)?;
            let entry = match (revision, kind) {
                (Revision::Latest, NodeKind::Directory) => {
                    NodeEntry::directory(client.get_dir(path, revision)?)
                }
                (Revision::Latest, NodeKind::File) => {
                    let file_rev = client.get_file(path, revision)?;
                    NodeEntry::without_children(Revision::Number(file_rev), kind)
                }
                _ => NodeEntry::without_children(revision, kind),
            };
            Ok(entry)
        })
    }

    fn fall_back(
        &self,
        path: &str,
        cached: Option<NodeEntry>,
        err: RevViewError,
    ) -> Result<NodeEntry> {
        match cached {
            Some(entry) => {
                warn!(
                    "Remote unavailable for {} ({}), using cached entry from {}",
                    path,
                    err,
                    entry.revision()
                );
                Ok(entry)
            }
            None => Err(err),
        }
    }
}

impl Drop for RepositoryView {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builder for opening a [`RepositoryView`].
///
/// # Example
///
/// ```rust,ignore
/// let view = RepositoryView::builder(url)
///     .credentials(CredentialId::new("ci-bot"))
///     .cache_root("/var/lib/host")
///     .open(&connector)?;
/// ```
pub struct RepositoryViewBuilder {
    url: Url,
    credentials: Option<Box<dyn Credentials>>,
    config: ViewConfig,
}

impl RepositoryViewBuilder {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            credentials: None,
            config: ViewConfig::default(),
        }
    }

    /// Credentials for the session. Without them the anonymous namespace is used.
    pub fn credentials(mut self, credentials: impl Credentials + 'static) -> Self {
        self.credentials = Some(Box::new(credentials));
        self
    }

    /// Base directory for cache files.
    ///
    /// Default: the platform cache directory.
    pub fn cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.cache_root = Some(root.into());
        self
    }

    /// Give up opening the store after this many attempts.
    ///
    /// Default: retry until it opens.
    pub fn store_open_attempts(mut self, attempts: u32) -> Self {
        self.config.store_open_attempts = Some(attempts);
        self
    }

    /// Read timeout requested from the transport.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    /// Connect and open the view.
    pub fn open(self, connector: &dyn RepositoryConnector) -> Result<RepositoryView> {
        RepositoryView::open(
            connector,
            &self.url,
            self.credentials.as_deref(),
            &self.config,
        )
    }
}
