//! Error types for keyload handling.

use plait_core::{CoreError, PskId};
use thiserror::Error;

/// Errors that can occur while building or opening keyloads.
#[derive(Debug, Error)]
pub enum KeyloadError {
    /// A keyload must name at least one recipient.
    #[error("keyload recipient set is empty")]
    EmptyRecipientSet,

    /// None of the key slots is addressed to this identity.
    #[error("not a recipient of this keyload")]
    NoAccess,

    /// A PSK recipient was named that the sender does not hold.
    #[error("unknown pre-shared key: {0:?}")]
    UnknownPsk(PskId),

    /// Encryption error.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for keyload operations.
pub type Result<T> = std::result::Result<T, KeyloadError>;
