use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or the operation failed inside it.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human readable description of the failed operation.
        message: String,
        /// Backend-specific failure cause.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A stored document could not be decoded into its entity shape.
    #[error("malformed document: {message}")]
    Malformed {
        /// Description of the decoding failure.
        message: String,
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

    /// Construct a malformed-document error.
    pub fn malformed(message: impl Into<String>) -> Self {
        StorageError::Malformed {
            message: message.into(),
        }
    }
}
