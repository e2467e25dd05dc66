//! Error types for revview.
//!
//! Remote failures are the only errors a caller of the query operations ever
//! sees. Store failures are produced here too, but the view converts them into
//! cache misses before they can escape.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the revview library.
#[derive(Debug, Error)]
pub enum RevViewError {
    // Remote repository errors
    #[error("Remote repository error: {message}")]
    Remote {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    // Store errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Failed to open cache store at {path:?} after {attempts} attempts")]
    StoreOpen { path: PathBuf, attempts: u32 },

    #[error("Repository view is closed")]
    StoreClosed,

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for revview operations.
pub type Result<T> = std::result::Result<T, RevViewError>;

impl From<std::io::Error> for RevViewError {
    fn from(err: std::io::Error) -> Self {
        RevViewError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RevViewError {
    fn from(err: serde_json::Error) -> Self {
        RevViewError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for RevViewError {
    fn from(err: rusqlite::Error) -> Self {
        RevViewError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RevViewError {
    /// Create a remote error from a message.
    pub fn remote(message: impl Into<String>) -> Self {
        RevViewError::Remote {
            message: message.into(),
            cause: None,
        }
    }

    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        RevViewError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether this error came from talking to the remote repository.
    pub fn is_remote(&self) -> bool {
        matches!(self, RevViewError::Remote { .. })
    }

    /// Whether this error came from the cache store.
    ///
    /// Serialization failures count as store errors since they only occur
    /// when encoding or decoding cached entries.
    pub fn is_store(&self) -> bool {
        matches!(
            self,
            RevViewError::Database { .. }
                | RevViewError::StoreOpen { .. }
                | RevViewError::StoreClosed
                | RevViewError::Json { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RevViewError::remote("connection refused");
        assert_eq!(
            err.to_string(),
            "Remote repository error: connection refused"
        );
    }

    #[test]
    fn test_remote_classification() {
        assert!(RevViewError::remote("down").is_remote());
        assert!(!RevViewError::StoreClosed.is_remote());
        assert!(!RevViewError::Config {
            message: "bad".into()
        }
        .is_remote());
    }

    #[test]
    fn test_store_classification() {
        assert!(RevViewError::StoreClosed.is_store());
        assert!(RevViewError::from(rusqlite::Error::InvalidQuery).is_store());
        assert!(!RevViewError::remote("down").is_store());
    }
}
