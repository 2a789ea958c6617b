//! Common error types for mixcritic

use thiserror::Error;

/// Common result type for mixcritic operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across mixcritic services
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

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for SQLite lock contention that is worth retrying
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database(db_err) => {
                let message = db_err.to_string();
                message.contains("database is locked") || message.contains("database table is locked")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_not_lock_contention() {
        assert!(!Error::Internal("database is locked".to_string()).is_lock_contention());
        assert!(!Error::Config("missing".to_string()).is_lock_contention());
    }

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("track 42".to_string());
        assert_eq!(err.to_string(), "Not found: track 42");
    }
}
