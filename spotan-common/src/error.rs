//! Common error types for spotan

use thiserror::Error;

/// Common result type for spotan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across spotan crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The same identity was seen twice where identities must be unique
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
