//! Namespace handle that treats the store as a pure cache.

use super::NodeStore;
use crate::error::RevViewError;
use crate::model::NodeEntry;
use std::sync::Arc;
use tracing::{debug, warn};

/// One credential namespace within a [`NodeStore`].
///
/// Every store failure ends up here and becomes a miss (on read) or a no-op
/// (on write). Decode failures are logged louder than plain misses so a
/// schema problem does not pass for a cold cache.
#[derive(Clone)]
pub struct NodeCache {
    store: Arc<dyn NodeStore>,
    namespace: String,
}

impl NodeCache {
    pub fn new(store: Arc<dyn NodeStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    /// Cached entry for a path, `None` on a miss or any store failure.
    pub fn lookup(&self, path: &str) -> Option<NodeEntry> {
        match self.store.get(&self.namespace, path) {
            Ok(entry) => entry,
            Err(RevViewError::StoreClosed) => None,
            Err(e @ RevViewError::Json { .. }) => {
                warn!("Discarding unreadable cache entry for {}: {}", path, e);
                None
            }
            Err(e) => {
                debug!("Cache lookup for {} failed, treating as miss: {}", path, e);
                None
            }
        }
    }

    /// Store and commit an entry, ignoring failures.
    pub fn remember(&self, path: &str, entry: &NodeEntry) {
        let result = self
            .store
            .put(&self.namespace, path, entry)
            .and_then(|()| self.store.commit());
        if let Err(e) = result {
            debug!("Failed to cache entry for {}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::model::{NodeKind, Revision};
    use crate::store::{SqliteStore, StoreStats};
    use tempfile::TempDir;

    /// Store whose every operation fails.
    struct BrokenStore;

    impl NodeStore for BrokenStore {
        fn get(&self, _: &str, _: &str) -> Result<Option<NodeEntry>> {
            Err(RevViewError::Other("disk on fire".into()))
        }
        fn put(&self, _: &str, _: &str, _: &NodeEntry) -> Result<()> {
            Err(RevViewError::Other("disk on fire".into()))
        }
        fn commit(&self) -> Result<()> {
            Err(RevViewError::Other("disk on fire".into()))
        }
        fn close(&self) -> Result<()> {
            Ok(())
        }
        fn is_closed(&self) -> bool {
            false
        }
        fn namespaces(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        fn entries(&self, _: &str) -> Result<Vec<(String, NodeEntry)>> {
            Ok(vec![])
        }
        fn stats(&self) -> Result<StoreStats> {
            Err(RevViewError::Other("disk on fire".into()))
        }
        fn clear_namespace(&self, _: &str) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_failures_degrade_to_miss() {
        let cache = NodeCache::new(Arc::new(BrokenStore), "data");
        let entry = NodeEntry::without_children(Revision::Number(1), NodeKind::File);
        cache.remember("/a", &entry);
        assert_eq!(cache.lookup("/a"), None);
    }

    #[test]
    fn test_remember_then_lookup() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(temp.path().join("c.db")).unwrap());
        let alice = NodeCache::new(store.clone(), "data-alice");
        let anon = NodeCache::new(store, "data");

        let entry = NodeEntry::without_children(Revision::Latest, NodeKind::File);
        alice.remember("/a", &entry);
        assert_eq!(alice.lookup("/a"), Some(entry));
        assert_eq!(anon.lookup("/a"), None);
    }

    #[test]
    fn test_closed_store_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(temp.path().join("c.db")).unwrap());
        let cache = NodeCache::new(store.clone(), "data");
        let entry = NodeEntry::without_children(Revision::Number(2), NodeKind::File);
        cache.remember("/a", &entry);

        store.close().unwrap();
        assert_eq!(cache.lookup("/a"), None);
        cache.remember("/b", &entry);
    }
}
