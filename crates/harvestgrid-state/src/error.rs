//! Error types for the HarvestGrid state store.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while reading or writing state files.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt record {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("invalid key: {0:?}")]
    InvalidKey(String),
}

impl StateError {
    /// Absent or unreadable input, as opposed to a failure writing state.
    pub fn is_missing_input(&self) -> bool {
        matches!(
            self,
            StateError::NotFound(_) | StateError::Corrupt { .. } | StateError::InvalidKey(_)
        )
    }
}
