//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying store could not be opened.
    #[error("cannot open storage at {location}: {source}")]
    Open {
        /// Where the adapter tried to open its store.
        location: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An I/O error occurred while reading or writing a value.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored value is unreadable.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The storage is closed.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Returns true if the store itself could not be reached, as opposed to a
    /// single read or write failing.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, StorageError::Open { .. } | StorageError::Closed)
    }
}
