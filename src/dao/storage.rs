//! Storage error surface shared by every `LobbyStore` backend.

use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failure raised by a storage backend, whatever the database behind it.
///
/// Mirror writes log these and move on; only the initial create/join path
/// surfaces them to the client.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not serve the request.
    #[error("storage unavailable: {operation}")]
    Unavailable {
        /// Description of the operation that failed.
        operation: String,
        /// Backend-specific cause.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Wrap a backend failure with the operation it interrupted.
    pub fn unavailable(
        operation: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        StorageError::Unavailable {
            operation: operation.into(),
            source: Box::new(source),
        }
    }
}
