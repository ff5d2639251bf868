//! Error types for the sync engine.

use thiserror::Error;
use tidesync_protocol::ProtocolError;
use tidesync_storage::StorageError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Collisions are not errors: the authority reports them as a regular
/// outcome and the engine surfaces them as notifications.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The dataset is not managed by this client.
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),

    /// The record does not exist in the dataset.
    #[error("unknown uid {uid} in dataset {dataset_id}")]
    UnknownUid {
        /// Dataset searched.
        dataset_id: String,
        /// The uid that was not found.
        uid: String,
    },

    /// A create was requested without a payload.
    #[error("null data")]
    NullData,

    /// Loading or saving the local cache failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Network or authority error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Protocol error (unexpected message shape).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A configuration value has the wrong shape.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Storage(e) => !e.is_connection_failure(),
            _ => false,
        }
    }

    /// Returns the reason reported in a `sync_failed` notification.
    pub fn reason(&self) -> String {
        match self {
            SyncError::Transport { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Codec(e) => SyncError::Codec(e),
            ProtocolError::InvalidMessage(message) => SyncError::Protocol(message),
        }
    }
}
