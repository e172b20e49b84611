//! Application Error Types
//!
//! Error returned by user repositories. Layer-specific failures (bus, token
//! codec, auth client) have their own enums.

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Repository fault not raised by the database driver itself.
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
