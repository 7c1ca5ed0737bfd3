//! Error types
//!
//! `StoreError` covers failures of the document store adapter; the
//! repository wraps it in `RepositoryError` together with the failures it
//! detects locally (blank ids, invalid notes, undecodable documents).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a document store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend unreachable (network, shutdown, injected failure)
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    /// Backend refused the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Stored document is not a JSON object
    #[error("Document '{id}' is invalid: {details}")]
    InvalidDocument { id: String, details: String },

    /// Failed to read or write the backing file
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to encode or decode the backing file
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store went away while a listener was attached
    #[error("Document store closed")]
    Closed,
}

impl StoreError {
    /// Create an error from an I/O error with path context
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => {
                StoreError::PermissionDenied(format!("cannot access '{}'", path.display()))
            }
            _ => StoreError::Io {
                path,
                source: error,
            },
        }
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Io { .. } | StoreError::Closed
        )
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the note repository
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Blank identifier, rejected without contacting the store
    #[error("Note not found: '{id}'")]
    NotFound { id: String },

    /// Note failed local validation
    #[error("Invalid note: {0}")]
    InvalidNote(String),

    /// A stored document could not be read as a note
    #[error("Could not decode note '{id}': {source}")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;
