//! revview - revision-addressed metadata cache for remote version-controlled trees.
//!
//! A [`RepositoryView`] sits between a caller and a remote repository and
//! answers node-kind and directory-listing queries for `(path, revision)`
//! pairs. Answers are cached per repository UUID and per credential identity
//! in a local SQLite file. When the remote is unreachable the last cached
//! answer is served instead of failing.
//!
//! The transport is pluggable through [`RepositoryConnector`] and
//! [`RepositoryClient`]; [`InMemoryRepository`] is a ready-made implementation
//! for tests and demos.
//!
//! # Example
//!
//! ```rust,ignore
//! use revview_core::{CredentialId, InMemoryRepository, RepositoryView, Revision};
//!
//! let repo = InMemoryRepository::new("abc123");
//! repo.commit(|c| {
//!     c.add_file("/trunk/lib/a.txt");
//! });
//!
//! let url = url::Url::parse("svn://example.org/repo")?;
//! let view = RepositoryView::builder(url)
//!     .credentials(CredentialId::new("ci-bot"))
//!     .cache_root("/var/lib/host")
//!     .open(&repo)?;
//!
//! let node = view.get_node("/trunk/lib", Revision::Latest)?;
//! println!("{} children", node.children().map_or(0, |c| c.len()));
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod path;
pub mod remote;
pub mod store;

mod view;

// Re-export commonly used types
pub use config::{PathsConfig, RemoteConfig, StoreConfig, ViewConfig};
pub use error::{Result, RevViewError};
pub use model::{ChildEntry, DirListing, NodeEntry, NodeKind, Revision};
pub use remote::memory::{CallCounts, InMemoryClient, InMemoryRepository};
pub use remote::{
    ConnectionOptions, CredentialId, Credentials, RepositoryClient, RepositoryConnector,
};
pub use store::{NamespaceStats, NodeCache, NodeStore, SqliteStore, StoreStats};
pub use view::{RepositoryView, RepositoryViewBuilder};
