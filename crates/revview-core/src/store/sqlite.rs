//! SQLite-based node store.

use super::{NamespaceStats, NodeStore, StoreStats};
use crate::error::{Result, RevViewError};
use crate::model::NodeEntry;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// SQLite-based node store.
///
/// Each write is its own transaction in the write-ahead log, so several
/// views (or processes) can share one file. [`NodeStore::commit`] folds the
/// log back into the database file.
/// Thread-safe via internal mutex on the connection; `None` once closed.
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) a store at the specified database path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RevViewError::io_with_path(e, parent))?;
        }

        let conn = Connection::open(db_path).map_err(|e| RevViewError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        // A corrupt file is first detected here, when SQLite reads the header.
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000; PRAGMA synchronous=NORMAL;",
        )
        .map_err(|e| RevViewError::Database {
            message: format!("Failed to set pragmas: {}", e),
            source: Some(e),
        })?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: db_path.to_path_buf(),
        })
    }

    /// Location of the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS node_entries (
                namespace TEXT NOT NULL,
                path TEXT NOT NULL,
                value BLOB NOT NULL,
                size_bytes INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (namespace, path)
            );
            "#,
        )
        .map_err(|e| RevViewError::Database {
            message: format!("Failed to initialize store schema: {}", e),
            source: Some(e),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().map_err(|e| RevViewError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })?;
        let conn = guard.as_ref().ok_or(RevViewError::StoreClosed)?;
        f(conn)
    }

    fn decode(path: &str, value: &[u8]) -> Result<NodeEntry> {
        serde_json::from_slice(value).map_err(|e| RevViewError::Json {
            message: format!("Failed to decode cached entry for {}: {}", path, e),
            source: Some(e),
        })
    }
}

impl NodeStore for SqliteStore {
    fn get(&self, namespace: &str, path: &str) -> Result<Option<NodeEntry>> {
        self.with_conn(|conn| {
            let value: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT value FROM node_entries WHERE namespace = ?1 AND path = ?2",
                    params![namespace, path],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| RevViewError::Database {
                    message: format!("Failed to query node entry: {}", e),
                    source: Some(e),
                })?;

            value.map(|v| Self::decode(path, &v)).transpose()
        })
    }

    fn put(&self, namespace: &str, path: &str, entry: &NodeEntry) -> Result<()> {
        let value = serde_json::to_vec(entry).map_err(|e| RevViewError::Json {
            message: format!("Failed to encode node entry for {}: {}", path, e),
            source: Some(e),
        })?;

        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT OR REPLACE INTO node_entries
                (namespace, path, value, size_bytes, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    namespace,
                    path,
                    value,
                    value.len() as i64,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(|e| RevViewError::Database {
                message: format!("Failed to store node entry: {}", e),
                source: Some(e),
            })?;
            Ok(())
        })
    }

    fn commit(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))
                .map_err(|e| RevViewError::Database {
                    message: format!("Failed to checkpoint cache database: {}", e),
                    source: Some(e),
                })
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(conn) = guard.take() else {
            return Ok(());
        };

        conn.close().map_err(|(_, e)| RevViewError::Database {
            message: format!("Failed to close cache database: {}", e),
            source: Some(e),
        })?;

        debug!("Closed cache store {}", self.path.display());
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn namespaces(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT namespace FROM node_entries ORDER BY namespace")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    fn entries(&self, namespace: &str) -> Result<Vec<(String, NodeEntry)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT path, value FROM node_entries WHERE namespace = ?1 ORDER BY path",
            )?;
            let rows = stmt
                .query_map(params![namespace], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                })?
                .filter_map(|r| r.ok())
                .filter_map(|(path, value)| match Self::decode(&path, &value) {
                    Ok(entry) => Some((path, entry)),
                    Err(e) => {
                        warn!("Skipping undecodable entry: {}", e);
                        None
                    }
                })
                .collect();
            Ok(rows)
        })
    }

    fn stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT namespace, COUNT(*), COALESCE(SUM(size_bytes), 0), MAX(updated_at)
                FROM node_entries
                GROUP BY namespace
                ORDER BY namespace
                "#,
            )?;

            let namespaces: Vec<NamespaceStats> = stmt
                .query_map([], |row| {
                    let entry_count: i64 = row.get(1)?;
                    let total_size_bytes: i64 = row.get(2)?;
                    let last_modified: Option<String> = row.get(3)?;
                    Ok(NamespaceStats {
                        namespace: row.get(0)?,
                        entry_count: entry_count as usize,
                        total_size_bytes: total_size_bytes as u64,
                        last_modified: last_modified
                            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                            .map(|dt| dt.with_timezone(&Utc)),
                    })
                })?
                .filter_map(|r| r.ok())
                .collect();

            Ok(StoreStats {
                total_entries: namespaces.iter().map(|n| n.entry_count).sum(),
                total_size_bytes: namespaces.iter().map(|n| n.total_size_bytes).sum(),
                namespaces,
            })
        })
    }

    fn clear_namespace(&self, namespace: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM node_entries WHERE namespace = ?1",
                params![namespace],
            )?;
            debug!("Cleared {} entries from namespace '{}'", deleted, namespace);
            Ok(deleted)
        })
    }
}

/// Open a store, deleting the backing files after every failed attempt.
///
/// A cache file left corrupt by a crash is always safe to discard. With
/// `max_attempts = None` this loops until the store opens.
pub fn open_with_retry(db_path: &Path, max_attempts: Option<u32>) -> Result<SqliteStore> {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match SqliteStore::open(db_path) {
            Ok(store) => {
                if attempts > 1 {
                    info!(
                        "Opened cache store {} after {} attempts",
                        db_path.display(),
                        attempts
                    );
                }
                return Ok(store);
            }
            Err(e) => {
                warn!(
                    "Failed to open cache store {} (attempt {}): {}",
                    db_path.display(),
                    attempts,
                    e
                );
                remove_store_files(db_path);
                if max_attempts.is_some_and(|max| attempts >= max) {
                    return Err(RevViewError::StoreOpen {
                        path: db_path.to_path_buf(),
                        attempts,
                    });
                }
            }
        }
    }
}

fn sidecar(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_store_files(db_path: &Path) {
    let files = [
        db_path.to_path_buf(),
        sidecar(db_path, "-wal"),
        sidecar(db_path, "-shm"),
    ];
    for file in &files {
        match std::fs::remove_file(file) {
            Ok(()) => debug!("Deleted {}", file.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {}: {}", file.display(), e),
        }
    }
}
