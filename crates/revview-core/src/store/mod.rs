//! Persistent path → node metadata store.
//!
//! One store file per remote repository, with one namespace per credential
//! identity. The store is only ever an optimization: [`NodeCache`] turns every
//! store failure into a cache miss.

mod cache;
mod sqlite;

pub use cache::NodeCache;
pub use sqlite::{open_with_retry, SqliteStore};

use crate::error::Result;
use crate::model::NodeEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-namespace statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub namespace: String,
    pub entry_count: usize,
    pub total_size_bytes: u64,
    /// When an entry in this namespace was last written.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Statistics across all namespaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub namespaces: Vec<NamespaceStats>,
}

/// Namespace-isolated persistent mapping from path to [`NodeEntry`].
///
/// Individual reads and writes are atomic per key; callers must not assume
/// anything stronger.
pub trait NodeStore: Send + Sync {
    /// Get the entry for a path.
    ///
    /// `Ok(None)` means the path is not cached. A stored value that fails to
    /// decode is an error, not a miss.
    fn get(&self, namespace: &str, path: &str) -> Result<Option<NodeEntry>>;

    /// Insert or overwrite the entry for a path.
    fn put(&self, namespace: &str, path: &str, entry: &NodeEntry) -> Result<()>;

    /// Make all writes so far durable.
    fn commit(&self) -> Result<()>;

    /// Release the store. Idempotent.
    fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Names of all namespaces with at least one entry.
    fn namespaces(&self) -> Result<Vec<String>>;

    /// All entries in a namespace, ordered by path.
    fn entries(&self, namespace: &str) -> Result<Vec<(String, NodeEntry)>>;

    fn stats(&self) -> Result<StoreStats>;

    /// Remove every entry in a namespace, returning how many were removed.
    fn clear_namespace(&self, namespace: &str) -> Result<usize>;
}
