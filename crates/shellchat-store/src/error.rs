//! Storage error types.

use thiserror::Error;

/// Message store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure (open, schema, query)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Encryption or key derivation failure
    #[error("crypto error: {0}")]
    Crypto(#[from] shellchat_crypto::CryptoError),

    /// Filesystem failure around the database file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key derivation task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(String),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
