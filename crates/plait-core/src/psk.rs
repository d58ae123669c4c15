//! Pre-shared keys.
//!
//! A PSK is derived from caller-supplied secret bytes; its [`PskId`] is a
//! public 16-byte handle derived from the key itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{derive_key, EncryptionKey};
use crate::error::{CoreError, Result};

/// A 16-byte public handle for a pre-shared key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PskId(pub [u8; 16]);

impl PskId {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PskId({})", self.to_hex())
    }
}

/// A 32-byte pre-shared key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Psk([u8; 32]);

impl Psk {
    /// Derive a PSK from arbitrary secret bytes.
    pub fn from_secret(secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            return Err(CoreError::InvalidSeed);
        }
        Ok(Self(derive_key("plait-psk-v0 key", &[secret])))
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The public id of this key.
    pub fn id(&self) -> PskId {
        let digest = derive_key("plait-psk-v0 id", &[&self.0]);
        let mut id = [0u8; 16];
        id.copy_from_slice(&digest[..16]);
        PskId(id)
    }

    /// The key used to wrap a session key for holders of this PSK.
    pub fn wrap_key(&self, context: &[u8]) -> EncryptionKey {
        EncryptionKey::from_bytes(derive_key("plait-keyload-v0 psk wrap", &[&self.0, context]))
    }
}

impl fmt::Debug for Psk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Psk({:?})", self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psk_derivation_is_deterministic() {
        let a = Psk::from_secret(b"shared secret").unwrap();
        let b = Psk::from_secret(b"shared secret").unwrap();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), Psk::from_secret(b"other").unwrap().id());
    }

    #[test]
    fn test_psk_empty_secret_rejected() {
        assert!(matches!(Psk::from_secret(b""), Err(CoreError::InvalidSeed)));
    }

    #[test]
    fn test_wrap_key_depends_on_context() {
        let psk = Psk::from_secret(b"s").unwrap();
        assert_ne!(psk.wrap_key(b"a").as_bytes(), psk.wrap_key(b"b").as_bytes());
    }
}
