//! Key slots: one wrapped copy of the session key per recipient.
//!
//! Exchange slots use X25519 ECDH with a fresh ephemeral key; PSK slots wrap
//! under a key derived from the pre-shared key. Both bind the wrapped key to
//! the keyload context and to the recipient's identifier.

use serde::{Deserialize, Serialize};

use plait_core::{
    Ed25519PublicKey, EncryptionKey, EncryptionNonce, Identifier, Psk, PskId, X25519PublicKey,
    X25519StaticSecret,
};

use crate::crypto::EphemeralKeyPair;
use crate::error::{KeyloadError, Result};

/// A session key wrapped for a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeySlot {
    Exchange {
        /// The recipient's signing identity.
        recipient: Ed25519PublicKey,
        /// The recipient's key-exchange key the slot was sealed to.
        exchange_key: X25519PublicKey,
        /// Ephemeral X25519 public key (sender's side of ECDH).
        ephemeral: X25519PublicKey,
        nonce: EncryptionNonce,
        wrapped_key: Vec<u8>,
    },
    Psk {
        id: PskId,
        nonce: EncryptionNonce,
        wrapped_key: Vec<u8>,
    },
}

impl KeySlot {
    /// Wrap `key` for a subscriber via ephemeral ECDH.
    pub fn for_exchange(
        context: &[u8],
        key: &EncryptionKey,
        recipient: Ed25519PublicKey,
        exchange_key: X25519PublicKey,
    ) -> Result<Self> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();
        let wrap_key = ephemeral
            .diffie_hellman(&exchange_key)
            .derive_encryption_key(context);

        let nonce = EncryptionNonce::generate();
        let aad = Identifier::Ed25519(recipient).to_bytes();
        let wrapped_key = wrap_key
            .encrypt(key.as_bytes(), &nonce, &aad)
            .map_err(|e| KeyloadError::Encryption(e.to_string()))?;

        Ok(KeySlot::Exchange {
            recipient,
            exchange_key,
            ephemeral: ephemeral_public,
            nonce,
            wrapped_key,
        })
    }

    /// Wrap `key` for every holder of `psk`.
    pub fn for_psk(context: &[u8], key: &EncryptionKey, psk: &Psk) -> Result<Self> {
        let id = psk.id();
        let nonce = EncryptionNonce::generate();
        let aad = Identifier::Psk(id).to_bytes();
        let wrapped_key = psk
            .wrap_key(context)
            .encrypt(key.as_bytes(), &nonce, &aad)
            .map_err(|e| KeyloadError::Encryption(e.to_string()))?;

        Ok(KeySlot::Psk {
            id,
            nonce,
            wrapped_key,
        })
    }

    /// Who this slot is addressed to.
    pub fn identifier(&self) -> Identifier {
        match self {
            KeySlot::Exchange { recipient, .. } => Identifier::Ed25519(*recipient),
            KeySlot::Psk { id, .. } => Identifier::Psk(*id),
        }
    }

    /// Unwrap an exchange slot with the recipient's secret.
    pub fn open_exchange(&self, context: &[u8], secret: &X25519StaticSecret) -> Result<EncryptionKey> {
        let KeySlot::Exchange {
            recipient,
            ephemeral,
            nonce,
            wrapped_key,
            ..
        } = self
        else {
            return Err(KeyloadError::NoAccess);
        };

        let wrap_key = secret.diffie_hellman(ephemeral).derive_encryption_key(context);
        let aad = Identifier::Ed25519(*recipient).to_bytes();
        let bytes = wrap_key
            .decrypt(wrapped_key, nonce, &aad)
            .map_err(|_| KeyloadError::NoAccess)?;
        key_from_bytes(&bytes)
    }

    /// Unwrap a PSK slot.
    pub fn open_psk(&self, context: &[u8], psk: &Psk) -> Result<EncryptionKey> {
        let KeySlot::Psk {
            id,
            nonce,
            wrapped_key,
        } = self
        else {
            return Err(KeyloadError::NoAccess);
        };

        let aad = Identifier::Psk(*id).to_bytes();
        let bytes = psk
            .wrap_key(context)
            .decrypt(wrapped_key, nonce, &aad)
            .map_err(|_| KeyloadError::NoAccess)?;
        key_from_bytes(&bytes)
    }
}

fn key_from_bytes(bytes: &[u8]) -> Result<EncryptionKey> {
    let arr: [u8; 32] = bytes.try_into().map_err(|_| {
        KeyloadError::Encryption(format!(
            "invalid key length: expected 32, got {}",
            bytes.len()
        ))
    })?;
    Ok(EncryptionKey::from_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use plait_core::Identity;

    #[test]
    fn test_exchange_slot_roundtrip() {
        let recipient = Identity::generate(b"recipient").unwrap();
        let key = EncryptionKey::generate();
        let slot = KeySlot::for_exchange(
            b"ctx",
            &key,
            recipient.public_key(),
            recipient.exchange_public_key(),
        )
        .unwrap();

        let opened = slot.open_exchange(b"ctx", recipient.exchange_secret()).unwrap();
        assert_eq!(opened.as_bytes(), key.as_bytes());
        assert_eq!(slot.identifier(), recipient.identifier());
    }

    #[test]
    fn test_exchange_slot_wrong_recipient() {
        let recipient = Identity::generate(b"recipient").unwrap();
        let outsider = Identity::generate(b"outsider").unwrap();
        let slot = KeySlot::for_exchange(
            b"ctx",
            &EncryptionKey::generate(),
            recipient.public_key(),
            recipient.exchange_public_key(),
        )
        .unwrap();

        assert!(matches!(
            slot.open_exchange(b"ctx", outsider.exchange_secret()),
            Err(KeyloadError::NoAccess)
        ));
    }

    #[test]
    fn test_exchange_slot_bound_to_context() {
        let recipient = Identity::generate(b"recipient").unwrap();
        let slot = KeySlot::for_exchange(
            b"ctx-a",
            &EncryptionKey::generate(),
            recipient.public_key(),
            recipient.exchange_public_key(),
        )
        .unwrap();
        assert!(slot.open_exchange(b"ctx-b", recipient.exchange_secret()).is_err());
    }

    #[test]
    fn test_psk_slot_roundtrip() {
        let psk = Psk::from_secret(b"group").unwrap();
        let key = EncryptionKey::generate();
        let slot = KeySlot::for_psk(b"ctx", &key, &psk).unwrap();

        assert_eq!(slot.open_psk(b"ctx", &psk).unwrap().as_bytes(), key.as_bytes());
        let other = Psk::from_secret(b"other").unwrap();
        assert!(slot.open_psk(b"ctx", &other).is_err());
        assert!(slot.open_exchange(b"ctx", &X25519StaticSecret::from_bytes([1; 32])).is_err());
    }
}
