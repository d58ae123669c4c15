//! # Plait Core
//!
//! Pure primitives for Plait channels: identities, deterministic links,
//! authenticated frames and publisher sequencing.
//!
//! This crate contains no I/O. It is pure computation over cryptographic
//! data structures.
//!
//! ## Key Types
//!
//! - [`Identity`] - Signing and key-exchange keys plus a PSK store
//! - [`Identifier`] - Public name of a participant
//! - [`Link`] - `(channel_id, message_id)` address of a message
//! - [`LinkGenerator`] - Deterministic link derivation for one channel
//! - [`FrameBuilder`] / [`Frame`] - Message wrap and unwrap
//! - [`SequencingStore`] - Per-publisher cursors
//!
//! ## Canonicalization
//!
//! Frame headers are encoded using deterministic CBOR. See [`canonical`].

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod identity;
pub mod link;
pub mod psk;
pub mod sequencing;
pub mod types;
pub mod validation;

pub use canonical::{canonical_header_bytes, decode_header};
pub use crypto::{
    derive_key, Blake3Hash, Ed25519PublicKey, Ed25519Signature, EncryptionKey, EncryptionNonce,
    Keypair, SharedKey, X25519PublicKey, X25519StaticSecret,
};
pub use error::{CoreError, Result};
pub use frame::{frame_digest, Frame, FrameBuilder, FrameHeader, MessageKind, WrappedFrame};
pub use identity::{Identity, IdentitySecrets};
pub use link::{BranchingMode, LinkGenerator};
pub use psk::{Psk, PskId};
pub use sequencing::{Cursor, RecordResult, SequencingStore, FIRST_SEQ};
pub use types::{ChannelId, Identifier, Link, MsgId};
pub use validation::validate_header;
