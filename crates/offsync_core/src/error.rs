//! Error types for the offsync core.

use offsync_store::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in queue and error list operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The durable store failed. In-memory state is unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// A persisted row could not be decoded.
    #[error("cannot decode row from {table}: {message}")]
    Deserialization {
        /// Table the row was read from.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// A bookmark was used while cancelled or not current.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the misuse.
        message: String,
    },
}

impl CoreError {
    /// Creates a deserialization error.
    pub fn deserialization(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Deserialization {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Returns true if this error came from the durable store.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this error reports bookmark misuse.
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}
