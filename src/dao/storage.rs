//! Backend-agnostic storage error and conditional-write outcomes.

use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not serve the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human readable description of the failing operation.
        message: String,
        /// Underlying backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Outcome of a single-key conditional entity update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectOutcome {
    /// The condition held and the write went through.
    Applied,
    /// The guard already matched; nothing was written.
    AlreadyApplied,
    /// The target entity does not exist.
    NotFound,
}

/// Outcome of the task status compare-and-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCasOutcome {
    /// This caller won the `SCHEDULED|IN_PROGRESS -> COMPLETE` transition.
    Completed,
    /// Another caller finalized the task first.
    AlreadyComplete,
    /// No task record exists for the id.
    NotFound,
}
