//! Error types for channel participants.

use plait_core::{CoreError, Identifier, Link};
use plait_keyload::KeyloadError;
use plait_transport::TransportError;
use thiserror::Error;

/// Errors that can occur during Author and Subscriber operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// An identity or PSK seed was empty.
    #[error("seed must not be empty")]
    InvalidSeed,

    /// The user has not announced or received a channel.
    #[error("not bound to a channel")]
    UnboundChannel,

    /// Bad digest, signature or authentication tag.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Decryption was attempted without a valid session key.
    #[error("no access: {0}")]
    NoAccess(String),

    /// A different frame occupies the link (address collision or race).
    #[error("link conflict at {0}")]
    LinkConflict(Link),

    /// Nothing is stored at the link.
    #[error("no message at {0}")]
    NotFound(Link),

    /// A keyload must name at least one recipient.
    #[error("keyload recipient set is empty")]
    EmptyRecipientSet,

    /// A keyload recipient is not a known subscriber or held PSK.
    #[error("unknown keyload recipient: {0}")]
    UnknownRecipient(Identifier),

    /// Exported state could not be decrypted.
    #[error("wrong password or corrupted state blob")]
    BadPassword,

    /// The operation or message requires authority this participant lacks.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The operation is not valid in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Unknown frame or state blob version.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// Payload exceeds the configured maximum.
    #[error("payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// Structurally invalid frame, payload or blob.
    #[error("malformed: {0}")]
    Malformed(String),

    /// Encryption error.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<CoreError> for ChannelError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidSeed => ChannelError::InvalidSeed,
            CoreError::UnboundChannel => ChannelError::UnboundChannel,
            CoreError::AuthenticationFailed(msg) => ChannelError::AuthenticationFailed(msg),
            CoreError::InvalidPublicKey => {
                ChannelError::AuthenticationFailed("invalid public key".into())
            }
            CoreError::InvalidSignature => {
                ChannelError::AuthenticationFailed("invalid signature".into())
            }
            CoreError::NoAccess(link) => {
                ChannelError::NoAccess(format!("no session key for keyload {}", link))
            }
            CoreError::LinkConflict(link) => ChannelError::LinkConflict(link),
            CoreError::UnsupportedVersion(v) => ChannelError::UnsupportedVersion(v),
            CoreError::Malformed(msg) => ChannelError::Malformed(msg),
            CoreError::Encryption(msg) => ChannelError::Encryption(msg),
            CoreError::UnknownPublisher(id) => {
                ChannelError::InvalidState(format!("unknown publisher {}", id))
            }
            CoreError::SequenceExhausted(id) => {
                ChannelError::InvalidState(format!("sequence space exhausted for {}", id))
            }
        }
    }
}

impl From<KeyloadError> for ChannelError {
    fn from(err: KeyloadError) -> Self {
        match err {
            KeyloadError::EmptyRecipientSet => ChannelError::EmptyRecipientSet,
            KeyloadError::NoAccess => ChannelError::NoAccess("not a keyload recipient".into()),
            KeyloadError::UnknownPsk(id) => ChannelError::UnknownRecipient(Identifier::Psk(id)),
            KeyloadError::Encryption(msg) => ChannelError::Encryption(msg),
            KeyloadError::Serialization(msg) => ChannelError::Malformed(msg),
            KeyloadError::Core(err) => err.into(),
        }
    }
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
