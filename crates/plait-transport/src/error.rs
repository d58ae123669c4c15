//! Transport failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The backend could not serve the request (poisoned lock, lost worker).
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("schema migration failed: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
