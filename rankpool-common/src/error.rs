//! Common error types for rankpool

use thiserror::Error;

/// Common result type for rankpool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across rankpool crates
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

    /// Pool catalog misconfiguration (missing or non-directory root)
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not enough unclaimed resources left for a new session.
    ///
    /// Not retried automatically: an operator has to add resources or
    /// lower `n_total`.
    #[error("Pool exhausted: {remaining} unclaimed resources remain, {needed} needed")]
    PoolExhausted { remaining: usize, needed: usize },

    /// Atomic allocation step failed and was rolled back in full
    #[error("Transaction failed: {0}")]
    TransactionFailed(#[source] sqlx::Error),

    /// Store stayed locked past the configured wait; safe to retry the call
    #[error("Store busy after {attempts} attempts ({elapsed_ms} ms)")]
    Busy { attempts: u32, elapsed_ms: u64 },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the store reported lock contention (`SQLITE_BUSY` / `SQLITE_LOCKED`)
    pub fn is_lock_error(&self) -> bool {
        match self {
            Error::Database(err) | Error::TransactionFailed(err) => is_sqlite_lock_error(err),
            _ => false,
        }
    }

    /// True when repeating the whole call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Busy { .. }) || self.is_lock_error()
    }
}

/// Detect SQLite busy/locked conditions on a raw sqlx error
pub fn is_sqlite_lock_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            // SQLITE_BUSY = 5, SQLITE_LOCKED = 6 (extended codes keep the low byte)
            let primary = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            matches!(primary, Some(5) | Some(6))
                || db_err.message().contains("database is locked")
        }
        _ => false,
    }
}
