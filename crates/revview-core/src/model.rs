//! Cached node metadata.
//!
//! These are the values stored per path in the cache. They carry only
//! metadata: node kind, revisions, child listings and modification times.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{ser, Deserialize, Serialize, Serializer};
use std::fmt;

/// Kind of node at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Nothing exists at the path.
    None,
    File,
    Directory,
    Unknown,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::None => "none",
            NodeKind::File => "file",
            NodeKind::Directory => "dir",
            NodeKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A revision request or a resolved revision.
///
/// Serialized as a signed integer where `-1` means [`Revision::Latest`].
/// Numbers above `i64::MAX` have no encoding and fail to serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "i64")]
pub enum Revision {
    /// Resolve against the current head.
    Latest,
    Number(u64),
}

impl Revision {
    const LATEST_SENTINEL: i64 = -1;
}

impl From<u64> for Revision {
    fn from(n: u64) -> Self {
        Revision::Number(n)
    }
}

impl TryFrom<Revision> for i64 {
    type Error = String;

    fn try_from(rev: Revision) -> Result<Self, Self::Error> {
        match rev {
            Revision::Latest => Ok(Revision::LATEST_SENTINEL),
            Revision::Number(n) => {
                i64::try_from(n).map_err(|_| format!("revision {} is out of range", n))
            }
        }
    }
}

impl Serialize for Revision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = i64::try_from(*self).map_err(ser::Error::custom)?;
        serializer.serialize_i64(encoded)
    }
}

impl TryFrom<i64> for Revision {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            Revision::LATEST_SENTINEL => Ok(Revision::Latest),
            n if n >= 0 => Ok(Revision::Number(n as u64)),
            n => Err(format!("invalid revision: {}", n)),
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Latest => write!(f, "HEAD"),
            Revision::Number(n) => write!(f, "r{}", n),
        }
    }
}

/// One immediate child of a cached directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    /// Last revision that modified this child.
    revision: u64,
    kind: NodeKind,
    /// Local name, not the full path.
    name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    last_modified: DateTime<Utc>,
}

impl ChildEntry {
    /// Create a child entry. `last_modified` is kept at millisecond precision.
    pub fn new(
        revision: u64,
        last_modified: DateTime<Utc>,
        kind: NodeKind,
        name: impl Into<String>,
    ) -> Self {
        Self {
            revision,
            kind,
            name: name.into(),
            last_modified: last_modified.trunc_subsecs(3),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }
}

/// Result of a directory listing from the remote repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    /// Revision the listing was resolved at.
    pub revision: u64,
    pub children: Vec<ChildEntry>,
}

/// Cached description of one path at one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Revision this description was captured at.
    revision: Revision,
    kind: NodeKind,
    /// `None` for a directory means the listing was never fetched.
    children: Option<Vec<ChildEntry>>,
}

impl NodeEntry {
    pub fn new(revision: Revision, kind: NodeKind, children: Option<Vec<ChildEntry>>) -> Self {
        Self {
            revision,
            kind,
            children,
        }
    }

    /// Entry for a node whose children are unknown or irrelevant.
    pub fn without_children(revision: Revision, kind: NodeKind) -> Self {
        Self::new(revision, kind, None)
    }

    /// Complete directory entry built from a listing.
    pub fn directory(listing: DirListing) -> Self {
        Self::new(
            Revision::Number(listing.revision),
            NodeKind::Directory,
            Some(listing.children),
        )
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn children(&self) -> Option<&[ChildEntry]> {
        self.children.as_deref()
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// False only for a directory whose children were never fetched.
    pub fn is_complete(&self) -> bool {
        !self.is_directory() || self.children.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_revision_sentinel_encoding() {
        assert_eq!(serde_json::to_string(&Revision::Latest).unwrap(), "-1");
        assert_eq!(serde_json::to_string(&Revision::Number(42)).unwrap(), "42");
        assert_eq!(
            serde_json::from_str::<Revision>("-1").unwrap(),
            Revision::Latest
        );
        assert!(serde_json::from_str::<Revision>("-7").is_err());
    }

    #[test]
    fn test_revision_beyond_i64_fails_to_encode() {
        let max = i64::MAX as u64;
        assert_eq!(
            serde_json::to_string(&Revision::Number(max)).unwrap(),
            max.to_string()
        );
        assert!(serde_json::to_string(&Revision::Number(max + 1)).is_err());
        assert!(serde_json::to_string(&Revision::Number(u64::MAX)).is_err());

        let entry = NodeEntry::without_children(Revision::Number(u64::MAX), NodeKind::File);
        assert!(serde_json::to_vec(&entry).is_err());
    }

    #[test]
    fn test_latest_never_equals_a_number() {
        assert_ne!(Revision::Latest, Revision::Number(0));
        assert_eq!(Revision::from(5), Revision::Number(5));
    }

    #[test]
    fn test_child_entry_truncates_to_millis() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let child = ChildEntry::new(5, at, NodeKind::File, "a.txt");
        assert_eq!(child.last_modified().timestamp_millis(), at.timestamp_millis());
        assert_eq!(child.last_modified().timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_child_entry_serializes_epoch_millis() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let child = ChildEntry::new(7, at, NodeKind::Directory, "b");
        let json = serde_json::to_value(&child).unwrap();
        assert_eq!(json["last_modified"], 1_700_000_000_123i64);
        assert_eq!(json["kind"], "directory");
        let back: ChildEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, child);
    }

    #[test]
    fn test_directory_completeness() {
        let incomplete = NodeEntry::without_children(Revision::Latest, NodeKind::Directory);
        assert!(!incomplete.is_complete());

        let empty = NodeEntry::directory(DirListing {
            revision: 3,
            children: vec![],
        });
        assert!(empty.is_complete());
        assert_eq!(empty.children(), Some(&[][..]));
        assert_eq!(empty.revision(), Revision::Number(3));

        let file = NodeEntry::without_children(Revision::Number(3), NodeKind::File);
        assert!(file.is_complete());
    }

    #[test]
    fn test_absent_children_survive_storage() {
        let entry = NodeEntry::without_children(Revision::Number(9), NodeKind::Directory);
        let json = serde_json::to_string(&entry).unwrap();
        let back: NodeEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.children(), None);
        assert_eq!(back, entry);
    }
}
