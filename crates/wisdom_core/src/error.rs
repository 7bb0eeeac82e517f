//! Error types for Wisdom core.

use rusqlite::ErrorCode;
use std::io;
use thiserror::Error;
use wisdom_sync_protocol::EntityType;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
///
/// Every mutation is all-or-nothing: when any of these is returned from a
/// write, nothing from that write is visible in the store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input rejected before any transaction opened.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the rejected input.
        message: String,
    },

    /// Write collides with state owned by another document or origin.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// Referenced entity does not exist and never existed.
    #[error("{} not found: {entity_id}", entity_type.as_str())]
    NotFound {
        /// Kind of entity looked up.
        entity_type: EntityType,
        /// Identifier looked up.
        entity_id: String,
    },

    /// SQLite error (transaction, commit, disk or connectivity fault).
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// JSON encoding or decoding of metadata/payloads failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Schema migration failed or migration state is inconsistent.
    #[error("migration failed: {message}")]
    Migration {
        /// Description of the failure.
        message: String,
    },

    /// Store is not ready to serve traffic.
    #[error("store not ready: {message}")]
    NotReady {
        /// What is missing.
        message: String,
    },

    /// A stored value could not be interpreted.
    #[error("corrupt row: {message}")]
    Corrupt {
        /// Description of the bad value.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a not-found error for a document.
    pub fn document_not_found(doc_id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: EntityType::Document,
            entity_id: doc_id.into(),
        }
    }

    /// Creates a migration error.
    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration {
            message: message.into(),
        }
    }

    /// Creates a not-ready error.
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady {
            message: message.into(),
        }
    }

    /// Creates a corrupt row error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    /// Returns true if the caller should retry the whole logical operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Storage(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            CoreError::Io(_) => true,
            _ => false,
        }
    }

    /// Returns true if the error is caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::Validation { .. } | CoreError::Conflict { .. } | CoreError::NotFound { .. }
        )
    }
}
