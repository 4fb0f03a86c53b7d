//! Error types for objcache.
//!
//! Storage and snapshot failures are mostly logged and swallowed by the
//! engine; the variants here surface only where a caller can act on them
//! (construction, invalid identifiers) or inside the store layers.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the objcache library.
#[derive(Debug, Error)]
pub enum ObjCacheError {
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

    // Identifier errors
    #[error("Invalid cache id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("Invalid namespace {namespace:?}: {reason}")]
    InvalidNamespace { namespace: String, reason: String },

    #[error("Namespace already open in this process: {namespace}")]
    NamespaceInUse { namespace: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for objcache operations.
pub type Result<T> = std::result::Result<T, ObjCacheError>;

impl From<std::io::Error> for ObjCacheError {
    fn from(err: std::io::Error) -> Self {
        ObjCacheError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ObjCacheError {
    fn from(err: serde_json::Error) -> Self {
        ObjCacheError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl ObjCacheError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ObjCacheError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create an invalid-id error.
    pub fn invalid_id(id: &str, reason: impl Into<String>) -> Self {
        ObjCacheError::InvalidId {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from the storage layer rather than the caller.
    pub fn is_storage_error(&self) -> bool {
        matches!(self, ObjCacheError::Io { .. } | ObjCacheError::Json { .. })
    }
}
