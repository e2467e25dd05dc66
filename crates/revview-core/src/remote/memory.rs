//! In-memory versioned repository.
//!
//! Keeps every revision as a full snapshot of the tree, which is fine for the
//! small trees used in tests and demos. The repository can be switched offline
//! to simulate an outage, and counts every remote call it serves.

use super::{ConnectionOptions, Credentials, RepositoryClient, RepositoryConnector};
use crate::error::{Result, RevViewError};
use crate::model::{ChildEntry, DirListing, NodeKind, Revision};
use crate::path::{file_name, normalize_path, parent};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
struct NodeRecord {
    kind: NodeKind,
    changed_rev: u64,
    changed_at: DateTime<Utc>,
}

type Snapshot = BTreeMap<String, NodeRecord>;

/// Number of calls served per remote operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub uuid: usize,
    pub check_path: usize,
    pub get_dir: usize,
    pub get_file: usize,
    pub latest_revision: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.uuid + self.check_path + self.get_dir + self.get_file + self.latest_revision
    }
}

struct RepoState {
    uuid: String,
    /// Index is the revision number.
    revisions: Vec<Snapshot>,
    online: bool,
    calls: CallCounts,
    open_sessions: usize,
    last_credential_id: Option<String>,
    last_read_timeout: Option<Duration>,
}

impl RepoState {
    fn head(&self) -> u64 {
        (self.revisions.len() - 1) as u64
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online {
            Ok(())
        } else {
            Err(RevViewError::Remote {
                message: format!("repository {} is unreachable", self.uuid),
                cause: Some("simulated outage".to_string()),
            })
        }
    }

    fn resolve(&self, revision: Revision) -> Result<u64> {
        match revision {
            Revision::Latest => Ok(self.head()),
            Revision::Number(n) if n <= self.head() => Ok(n),
            Revision::Number(n) => Err(RevViewError::remote(format!("No such revision {}", n))),
        }
    }

    fn snapshot(&self, revision: Revision) -> Result<(u64, &Snapshot)> {
        let rev = self.resolve(revision)?;
        Ok((rev, &self.revisions[rev as usize]))
    }
}

/// Edits collected for one commit.
#[derive(Debug, Default)]
pub struct CommitBuilder {
    edits: Vec<Edit>,
}

#[derive(Debug)]
enum Edit {
    Add(String, NodeKind),
    Modify(String),
    Delete(String),
}

impl CommitBuilder {
    /// Add a file, creating missing parent directories.
    pub fn add_file(&mut self, path: &str) -> &mut Self {
        self.edits.push(Edit::Add(normalize_path(path), NodeKind::File));
        self
    }

    /// Add a directory, creating missing parent directories.
    pub fn add_dir(&mut self, path: &str) -> &mut Self {
        self.edits
            .push(Edit::Add(normalize_path(path), NodeKind::Directory));
        self
    }

    /// Record a content change to an existing node.
    pub fn modify(&mut self, path: &str) -> &mut Self {
        self.edits.push(Edit::Modify(normalize_path(path)));
        self
    }

    /// Delete a node and everything below it.
    pub fn delete(&mut self, path: &str) -> &mut Self {
        self.edits.push(Edit::Delete(normalize_path(path)));
        self
    }
}

/// A shared, versioned, in-memory repository.
///
/// Clones share the same underlying state.
#[derive(Clone)]
pub struct InMemoryRepository {
    state: Arc<Mutex<RepoState>>,
}

impl InMemoryRepository {
    /// Create a repository with only the root directory at revision 0.
    pub fn new(uuid: impl Into<String>) -> Self {
        let mut root = Snapshot::new();
        root.insert(
            "/".to_string(),
            NodeRecord {
                kind: NodeKind::Directory,
                changed_rev: 0,
                changed_at: Utc::now(),
            },
        );

        Self {
            state: Arc::new(Mutex::new(RepoState {
                uuid: uuid.into(),
                revisions: vec![root],
                online: true,
                calls: CallCounts::default(),
                open_sessions: 0,
                last_credential_id: None,
                last_read_timeout: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RepoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a set of edits as a new revision and return its number.
    pub fn commit(&self, build: impl FnOnce(&mut CommitBuilder)) -> u64 {
        self.commit_at(Utc::now(), build)
    }

    /// Like [`commit`](Self::commit) with an explicit commit date.
    pub fn commit_at(&self, date: DateTime<Utc>, build: impl FnOnce(&mut CommitBuilder)) -> u64 {
        let mut builder = CommitBuilder::default();
        build(&mut builder);

        let mut state = self.lock();
        let new_rev = state.head() + 1;
        let mut tree = state.revisions[state.head() as usize].clone();
        let stamp = NodeRecord {
            kind: NodeKind::Directory,
            changed_rev: new_rev,
            changed_at: date,
        };

        let mut touched = Vec::new();
        for edit in builder.edits {
            match edit {
                Edit::Add(path, kind) => {
                    let mut ancestor = parent(&path).map(str::to_string);
                    while let Some(dir) = ancestor {
                        tree.entry(dir.clone()).or_insert_with(|| stamp.clone());
                        ancestor = parent(&dir).map(str::to_string);
                    }
                    tree.insert(
                        path.clone(),
                        NodeRecord {
                            kind,
                            ..stamp.clone()
                        },
                    );
                    touched.push(path);
                }
                Edit::Modify(path) => {
                    if let Some(record) = tree.get_mut(&path) {
                        record.changed_rev = new_rev;
                        record.changed_at = date;
                        touched.push(path);
                    }
                }
                Edit::Delete(path) => {
                    let prefix = format!("{}/", path);
                    tree.retain(|p, _| p != &path && !p.starts_with(&prefix));
                    touched.push(path);
                }
            }
        }

        // Directory revisions bubble up to every ancestor of a change.
        for path in touched {
            let mut ancestor = parent(&path).map(str::to_string);
            while let Some(dir) = ancestor {
                if let Some(record) = tree.get_mut(&dir) {
                    record.changed_rev = new_rev;
                    record.changed_at = date;
                }
                ancestor = parent(&dir).map(str::to_string);
            }
        }

        state.revisions.push(tree);
        debug!("Committed r{} to in-memory repository {}", new_rev, state.uuid);
        new_rev
    }

    /// Open a session directly, bypassing the connector.
    pub fn client(&self) -> InMemoryClient {
        self.lock().open_sessions += 1;
        InMemoryClient {
            repo: self.clone(),
            closed: false,
        }
    }

    /// Simulate the repository becoming reachable or unreachable.
    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    pub fn head(&self) -> u64 {
        self.lock().head()
    }

    pub fn uuid(&self) -> String {
        self.lock().uuid.clone()
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn reset_calls(&self) {
        self.lock().calls = CallCounts::default();
    }

    /// Sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions
    }

    /// Credential id seen by the most recent connect.
    pub fn last_credential_id(&self) -> Option<String> {
        self.lock().last_credential_id.clone()
    }

    /// Effective read timeout seen by the most recent connect.
    pub fn last_read_timeout(&self) -> Option<Duration> {
        self.lock().last_read_timeout
    }
}

impl RepositoryConnector for InMemoryRepository {
    fn connect(
        &self,
        url: &Url,
        credentials: Option<&dyn Credentials>,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn RepositoryClient>> {
        {
            let mut state = self.lock();
            state.last_credential_id = credentials.map(|c| c.id().to_string());
            state.last_read_timeout = Some(options.effective_read_timeout());
        }
        debug!("Opening in-memory session for {}", url);
        Ok(Box::new(self.client()))
    }
}

/// One session against an [`InMemoryRepository`].
pub struct InMemoryClient {
    repo: InMemoryRepository,
    closed: bool,
}

impl InMemoryClient {
    /// Lock the repository for a call, counting it and checking availability.
    fn begin(&self, count: impl FnOnce(&mut CallCounts)) -> Result<MutexGuard<'_, RepoState>> {
        if self.closed {
            return Err(RevViewError::remote("session is closed"));
        }
        let mut state = self.repo.lock();
        count(&mut state.calls);
        state.ensure_online()?;
        Ok(state)
    }
}

impl RepositoryClient for InMemoryClient {
    fn uuid(&mut self) -> Result<String> {
        let state = self.begin(|c| c.uuid += 1)?;
        Ok(state.uuid.clone())
    }

    fn check_path(&mut self, path: &str, revision: Revision) -> Result<NodeKind> {
        let state = self.begin(|c| c.check_path += 1)?;
        let (_, tree) = state.snapshot(revision)?;
        Ok(tree
            .get(&normalize_path(path))
            .map(|record| record.kind)
            .unwrap_or(NodeKind::None))
    }

    fn get_dir(&mut self, path: &str, revision: Revision) -> Result<DirListing> {
        let state = self.begin(|c| c.get_dir += 1)?;
        let (rev, tree) = state.snapshot(revision)?;
        let path = normalize_path(path);

        match tree.get(&path) {
            Some(record) if record.kind == NodeKind::Directory => {}
            _ => {
                return Err(RevViewError::remote(format!(
                    "{} is not a directory in r{}",
                    path, rev
                )))
            }
        }

        let children = tree
            .iter()
            .filter(|(p, _)| p.as_str() != "/" && parent(p.as_str()) == Some(path.as_str()))
            .map(|(p, record)| {
                ChildEntry::new(record.changed_rev, record.changed_at, record.kind, file_name(p))
            })
            .collect();

        Ok(DirListing {
            revision: rev,
            children,
        })
    }

    fn get_file(&mut self, path: &str, revision: Revision) -> Result<u64> {
        let state = self.begin(|c| c.get_file += 1)?;
        let (rev, tree) = state.snapshot(revision)?;
        let path = normalize_path(path);

        match tree.get(&path) {
            Some(record) if record.kind == NodeKind::File => Ok(record.changed_rev),
            _ => Err(RevViewError::remote(format!(
                "{} is not a file in r{}",
                path, rev
            ))),
        }
    }

    fn latest_revision(&mut self) -> Result<u64> {
        let state = self.begin(|c| c.latest_revision += 1)?;
        Ok(state.head())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.repo.lock();
        state.open_sessions = state.open_sessions.saturating_sub(1);
    }
}

impl Drop for InMemoryClient {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_repo() -> InMemoryRepository {
        let repo = InMemoryRepository::new("abc123");
        repo.commit(|c| {
            c.add_dir("/trunk/lib");
            c.add_file("/trunk/lib/a.txt");
        });
        repo.commit(|c| {
            c.add_dir("/trunk/lib/b");
        });
        repo
    }

    #[test]
    fn test_check_path_by_revision() {
        let repo = sample_repo();
        let mut client = repo.client();

        assert_eq!(
            client.check_path("/trunk/lib/b", Revision::Latest).unwrap(),
            NodeKind::Directory
        );
        assert_eq!(
            client.check_path("/trunk/lib/b", Revision::Number(1)).unwrap(),
            NodeKind::None
        );
        assert_eq!(
            client.check_path("trunk/lib/a.txt", Revision::Number(1)).unwrap(),
            NodeKind::File
        );
        assert!(client.check_path("/", Revision::Number(99)).is_err());
    }

    #[test]
    fn test_get_dir_lists_children_with_change_revisions() {
        let repo = sample_repo();
        let mut client = repo.client();

        let listing = client.get_dir("/trunk/lib", Revision::Latest).unwrap();
        assert_eq!(listing.revision, 2);
        let names: Vec<_> = listing.children.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["a.txt", "b"]);
        assert_eq!(listing.children[0].revision(), 1);
        assert_eq!(listing.children[1].revision(), 2);
        assert_eq!(listing.children[1].kind(), NodeKind::Directory);

        assert!(client.get_dir("/trunk/lib/a.txt", Revision::Latest).is_err());
    }

    #[test]
    fn test_directory_revision_bubbles_up() {
        let repo = sample_repo();
        repo.commit(|c| {
            c.modify("/trunk/lib/a.txt");
        });
        let mut client = repo.client();
        let root = client.get_dir("/", Revision::Latest).unwrap();
        assert_eq!(root.children[0].name(), "trunk");
        assert_eq!(root.children[0].revision(), 3);
        assert_eq!(client.get_file("/trunk/lib/a.txt", Revision::Latest).unwrap(), 3);
        assert_eq!(client.get_file("/trunk/lib/a.txt", Revision::Number(2)).unwrap(), 1);
    }

    #[test]
    fn test_delete_removes_subtree() {
        let repo = sample_repo();
        repo.commit(|c| {
            c.delete("/trunk/lib");
        });
        let mut client = repo.client();
        assert_eq!(
            client.check_path("/trunk/lib/b", Revision::Latest).unwrap(),
            NodeKind::None
        );
        assert!(client.get_dir("/trunk", Revision::Latest).unwrap().children.is_empty());
    }

    #[test]
    fn test_offline_fails_and_counts() {
        let repo = sample_repo();
        let mut client = repo.client();
        repo.set_online(false);

        let err = client.latest_revision().unwrap_err();
        assert!(err.is_remote());
        assert_eq!(repo.calls().latest_revision, 1);

        repo.set_online(true);
        assert_eq!(client.latest_revision().unwrap(), 2);
    }

    #[test]
    fn test_sessions_are_tracked() {
        let repo = sample_repo();
        let mut client = repo.client();
        assert_eq!(repo.open_sessions(), 1);
        client.close();
        client.close();
        assert_eq!(repo.open_sessions(), 0);
        assert!(client.uuid().is_err());

        {
            let _other = repo.client();
            assert_eq!(repo.open_sessions(), 1);
        }
        assert_eq!(repo.open_sessions(), 0);
    }

    #[test]
    fn test_connector_records_identity_and_timeout() {
        let repo = sample_repo();
        let url = Url::parse("svn://example.org/repo").unwrap();
        let creds = crate::remote::CredentialId::new("bob");
        let _client = repo
            .connect(&url, Some(&creds), &ConnectionOptions::default())
            .unwrap();
        assert_eq!(repo.last_credential_id().as_deref(), Some("bob"));
        assert_eq!(repo.last_read_timeout(), Some(Duration::from_secs(60)));
    }
}
