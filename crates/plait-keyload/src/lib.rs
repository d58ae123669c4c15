//! # Plait Keyload
//!
//! Access control for Plait channels.
//!
//! ## Overview
//!
//! An author controls who can read masked payloads by publishing keyloads.
//! A keyload carries one fresh session key, wrapped once per recipient.
//! Anyone can see who a keyload is addressed to; only recipients can
//! recover the key.
//!
//! ## Key Concepts
//!
//! - **Recipients**: Subscribers (by signing + exchange key) and PSKs
//! - **KeySlot**: The session key wrapped for one recipient
//! - **KeyloadPayload**: The public payload of a Keyload message
//! - **SessionKeys**: Every key a user has recovered, by keyload link
//!
//! ## Wrapping
//!
//! 1. **Exchange slots**: X25519 ECDH between a fresh ephemeral key and the
//!    subscriber's exchange key
//! 2. **PSK slots**: A wrapping key derived from the pre-shared key
//!
//! Both wrapping keys are bound to the keyload's link and a per-keyload
//! nonce, so a slot copied into another keyload does not open.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use plait_core::{EncryptionKey, Identity, Link};
//! use plait_keyload::{KeyloadPayload, Recipients, SessionKeys};
//!
//! # fn demo(link: Link) -> plait_keyload::Result<()> {
//! let author = Identity::generate(b"author seed")?;
//! let reader = Identity::generate(b"reader seed")?;
//!
//! let recipients = Recipients::new()
//!     .with_member(author.public_key(), author.exchange_public_key())
//!     .with_member(reader.public_key(), reader.exchange_public_key());
//!
//! let key = EncryptionKey::generate();
//! let payload = KeyloadPayload::seal(&link, &key, &recipients, &author)?;
//!
//! let mut keys = SessionKeys::new();
//! keys.adopt(link, payload.open(&link, &reader)?);
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod error;
pub mod keyload;
pub mod session;
pub mod slot;

pub use crypto::EphemeralKeyPair;
pub use error::{KeyloadError, Result};
pub use keyload::{KeyloadPayload, Recipients};
pub use session::{SessionKeyEntry, SessionKeys, SessionKeysSnapshot};
pub use slot::KeySlot;
