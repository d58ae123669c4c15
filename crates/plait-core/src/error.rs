//! Error types for Plait core.

use thiserror::Error;

use crate::types::Link;

/// Errors raised by identities, links, frames and sequencing.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("seed must not be empty")]
    InvalidSeed,

    #[error("link generator is not bound to a channel")]
    UnboundChannel,

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("no session key for keyload {0}")]
    NoAccess(Link),

    #[error("a different frame already occupies link {0}")]
    LinkConflict(Link),

    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("unknown publisher: {0}")]
    UnknownPublisher(String),

    #[error("sequence space exhausted for {0}")]
    SequenceExhausted(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
