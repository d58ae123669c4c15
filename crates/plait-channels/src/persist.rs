//! Password-protected export and import of a participant's state.
//!
//! Blob layout:
//!
//! ```text
//! "PLT" | version (1) | memory KiB (4) | passes (4) | lanes (4) | salt (16)
//!       | nonce (12) | ciphertext + tag
//! ```
//!
//! The key is stretched from the password and salt with Argon2id using the
//! cost parameters stored in the blob. Everything before the nonce is
//! authenticated as associated data. The plaintext is a CBOR snapshot of
//! identity secrets, configuration and session state.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use plait_core::{EncryptionKey, Identity, IdentitySecrets};
use plait_transport::Transport;

use crate::author::Author;
use crate::config::UserConfig;
use crate::error::{ChannelError, Result};
use crate::state::{SessionState, StateSnapshot};
use crate::subscriber::Subscriber;
use crate::user::User;

const MAGIC: &[u8; 3] = b"PLT";
pub const EXPORT_VERSION: u8 = 2;
const SALT_LEN: usize = 16;
const COSTS_OFFSET: usize = MAGIC.len() + 1;
const SALT_OFFSET: usize = COSTS_OFFSET + 12;
const HEADER_LEN: usize = SALT_OFFSET + SALT_LEN;

/// Argon2id costs written into new blobs.
const KDF_MEMORY_KIB: u32 = 19 * 1024;
const KDF_PASSES: u32 = 2;
const KDF_LANES: u32 = 1;

/// Imported blobs asking for more than this are refused.
const KDF_MAX_MEMORY_KIB: u32 = 1024 * 1024;
const KDF_MAX_PASSES: u32 = 64;
const KDF_MAX_LANES: u32 = 16;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    identity: IdentitySecrets,
    config: UserConfig,
    state: StateSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KdfCosts {
    memory_kib: u32,
    passes: u32,
    lanes: u32,
}

impl KdfCosts {
    const DEFAULT: Self = Self {
        memory_kib: KDF_MEMORY_KIB,
        passes: KDF_PASSES,
        lanes: KDF_LANES,
    };

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.memory_kib.to_be_bytes());
        out.extend_from_slice(&self.passes.to_be_bytes());
        out.extend_from_slice(&self.lanes.to_be_bytes());
    }

    fn read(bytes: &[u8]) -> Result<Self> {
        let word = |i: usize| -> Result<u32> {
            bytes
                .get(i * 4..i * 4 + 4)
                .and_then(|b| b.try_into().ok())
                .map(u32::from_be_bytes)
                .ok_or_else(|| ChannelError::Malformed("truncated key derivation costs".into()))
        };
        let costs = Self {
            memory_kib: word(0)?,
            passes: word(1)?,
            lanes: word(2)?,
        };
        if costs.memory_kib > KDF_MAX_MEMORY_KIB
            || costs.passes > KDF_MAX_PASSES
            || costs.lanes > KDF_MAX_LANES
        {
            return Err(ChannelError::Malformed(format!(
                "key derivation costs out of range: {:?}",
                costs
            )));
        }
        Ok(costs)
    }

    fn derive(&self, password: &[u8], salt: &[u8]) -> Result<EncryptionKey> {
        let params = Params::new(self.memory_kib, self.passes, self.lanes, Some(32))
            .map_err(|e| ChannelError::Malformed(format!("key derivation costs: {}", e)))?;
        let mut key = Zeroizing::new([0u8; 32]);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(password, salt, &mut *key)
            .map_err(|e| ChannelError::Encryption(format!("password stretching failed: {}", e)))?;
        Ok(EncryptionKey::from_bytes(*key))
    }
}

impl<T: Transport> User<T> {
    /// Serialize and encrypt this participant's full state.
    pub fn export(&self, password: &[u8]) -> Result<Vec<u8>> {
        let snapshot = Snapshot {
            identity: self.identity().to_secrets(),
            config: self.config().clone(),
            state: self.state.to_snapshot(),
        };
        let mut plaintext = Zeroizing::new(Vec::new());
        ciborium::into_writer(&snapshot, &mut *plaintext)
            .map_err(|e| ChannelError::Malformed(e.to_string()))?;

        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let costs = KdfCosts::DEFAULT;

        let mut blob = Vec::with_capacity(HEADER_LEN + plaintext.len() + 28);
        blob.extend_from_slice(MAGIC);
        blob.push(EXPORT_VERSION);
        costs.write(&mut blob);
        blob.extend_from_slice(&salt);

        let sealed = costs.derive(password, &salt)?.seal(&plaintext, &blob)?;
        blob.extend_from_slice(&sealed);
        tracing::debug!(bytes = blob.len(), "exported state");
        Ok(blob)
    }

    /// Restore a participant from `export` output. Operations then continue
    /// from the exported cursors.
    pub(crate) fn import_user(bytes: &[u8], password: &[u8], transport: T) -> Result<Self> {
        if bytes.len() < COSTS_OFFSET || &bytes[..MAGIC.len()] != MAGIC {
            return Err(ChannelError::Malformed("not an exported state blob".into()));
        }
        let version = bytes[MAGIC.len()];
        if version != EXPORT_VERSION {
            return Err(ChannelError::UnsupportedVersion(version));
        }
        if bytes.len() < HEADER_LEN {
            return Err(ChannelError::Malformed("truncated state blob".into()));
        }
        let (header, sealed) = bytes.split_at(HEADER_LEN);
        let costs = KdfCosts::read(&header[COSTS_OFFSET..SALT_OFFSET])?;
        let salt = &header[SALT_OFFSET..];

        let plaintext = Zeroizing::new(
            costs
                .derive(password, salt)?
                .open(sealed, header)
                .map_err(|_| ChannelError::BadPassword)?,
        );
        let snapshot: Snapshot = ciborium::from_reader(plaintext.as_slice())
            .map_err(|e| ChannelError::Malformed(e.to_string()))?;

        let identity = Identity::from_secrets(&snapshot.identity);
        let state = SessionState::from_snapshot(&snapshot.state);
        tracing::debug!(identifier = %identity.identifier(), "imported state");
        Ok(User::from_parts(
            identity,
            snapshot.config.clone(),
            transport,
            state,
        ))
    }
}

impl<T: Transport> Author<T> {
    /// Restore an author from `export` output.
    pub fn import(bytes: &[u8], password: &[u8], transport: T) -> Result<Self> {
        let user = User::import_user(bytes, password, transport)?;
        if user.channel_address().is_some() && !user.is_channel_author() {
            return Err(ChannelError::NotAuthorized(
                "exported state belongs to a subscriber".into(),
            ));
        }
        Ok(Self(user))
    }
}

impl<T: Transport> Subscriber<T> {
    /// Restore a subscriber from `export` output.
    pub fn import(bytes: &[u8], password: &[u8], transport: T) -> Result<Self> {
        let user = User::import_user(bytes, password, transport)?;
        if user.is_channel_author() {
            return Err(ChannelError::NotAuthorized(
                "exported state belongs to the channel author".into(),
            ));
        }
        Ok(Self(user))
    }
}
