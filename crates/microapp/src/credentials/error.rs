//! Credential store error types.

use thiserror::Error;

/// Errors raised by a [`CredentialStore`](super::CredentialStore) backend.
///
/// "Not found" is never an error; stores return `Ok(None)` for that.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Local filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared store (redis) failure.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The store could not be reached in time.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be interpreted.
    #[error("Corrupt credential entry: {0}")]
    Corrupt(String),

    /// A blocking store task panicked or was cancelled.
    #[error("Store task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Join(err.to_string())
    }
}
