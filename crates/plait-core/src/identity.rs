//! Participant identity.
//!
//! An [`Identity`] owns an Ed25519 signing key, an X25519 key-exchange secret
//! and a store of pre-shared keys. Both asymmetric keys are derived from one
//! seed, so the same seed always yields the same identity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{
    derive_key, Ed25519PublicKey, Ed25519Signature, Keypair, X25519PublicKey, X25519StaticSecret,
};
use crate::error::{CoreError, Result};
use crate::psk::{Psk, PskId};
use crate::types::Identifier;

/// Key material and PSK store of one participant.
#[derive(Clone)]
pub struct Identity {
    keypair: Keypair,
    exchange: X25519StaticSecret,
    psks: BTreeMap<PskId, Psk>,
}

impl Identity {
    /// Derive an identity from seed bytes.
    pub fn generate(seed: &[u8]) -> Result<Self> {
        if seed.is_empty() {
            return Err(CoreError::InvalidSeed);
        }
        let signing = Zeroizing::new(derive_key("plait-identity-v0 signing", &[seed]));
        let exchange = Zeroizing::new(derive_key("plait-identity-v0 exchange", &[seed]));
        Ok(Self {
            keypair: Keypair::from_seed(&signing),
            exchange: X25519StaticSecret::from_bytes(*exchange),
            psks: BTreeMap::new(),
        })
    }

    pub fn identifier(&self) -> Identifier {
        Identifier::Ed25519(self.keypair.public_key())
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    pub fn exchange_public_key(&self) -> X25519PublicKey {
        self.exchange.public_key()
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        self.keypair.sign(message)
    }

    pub fn exchange_secret(&self) -> &X25519StaticSecret {
        &self.exchange
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pre-shared keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Derive a PSK from `secret` and keep it. Idempotent per secret.
    pub fn store_psk(&mut self, secret: &[u8]) -> Result<PskId> {
        let psk = Psk::from_secret(secret)?;
        let id = psk.id();
        self.psks.insert(id, psk);
        Ok(id)
    }

    /// Forget a PSK. Returns whether it was present.
    pub fn remove_psk(&mut self, id: &PskId) -> bool {
        self.psks.remove(id).is_some()
    }

    pub fn psk(&self, id: &PskId) -> Option<&Psk> {
        self.psks.get(id)
    }

    pub fn psk_ids(&self) -> impl Iterator<Item = &PskId> {
        self.psks.keys()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────

    /// Raw key material, for encrypted export only.
    pub fn to_secrets(&self) -> IdentitySecrets {
        IdentitySecrets {
            signing: self.keypair.seed(),
            exchange: self.exchange.to_bytes(),
            psks: self.psks.values().map(|psk| *psk.as_bytes()).collect(),
        }
    }

    /// Rebuild an identity from [`Identity::to_secrets`] output.
    pub fn from_secrets(secrets: &IdentitySecrets) -> Self {
        let psks = secrets
            .psks
            .iter()
            .map(|bytes| {
                let psk = Psk::from_bytes(*bytes);
                (psk.id(), psk)
            })
            .collect();
        Self {
            keypair: Keypair::from_seed(&secrets.signing),
            exchange: X25519StaticSecret::from_bytes(secrets.exchange),
            psks,
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key())
            .field("psks", &self.psks.len())
            .finish()
    }
}

/// Serializable identity key material. Wiped on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct IdentitySecrets {
    pub signing: [u8; 32],
    pub exchange: [u8; 32],
    pub psks: Vec<[u8; 32]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_deterministic() {
        let a = Identity::generate(b"author seed").unwrap();
        let b = Identity::generate(b"author seed").unwrap();
        assert_eq!(a.identifier(), b.identifier());
        assert_eq!(a.exchange_public_key(), b.exchange_public_key());

        let c = Identity::generate(b"other seed").unwrap();
        assert_ne!(a.identifier(), c.identifier());
    }

    #[test]
    fn test_empty_seed_rejected() {
        assert!(matches!(Identity::generate(b""), Err(CoreError::InvalidSeed)));
    }

    #[test]
    fn test_store_and_remove_psk() {
        let mut identity = Identity::generate(b"seed").unwrap();
        let id = identity.store_psk(b"group secret").unwrap();
        assert_eq!(identity.store_psk(b"group secret").unwrap(), id);
        assert_eq!(identity.psk_ids().count(), 1);

        assert!(identity.remove_psk(&id));
        assert!(!identity.remove_psk(&id));
        assert!(identity.psk(&id).is_none());
    }

    #[test]
    fn test_secrets_roundtrip() {
        let mut identity = Identity::generate(b"seed").unwrap();
        let psk_id = identity.store_psk(b"psk").unwrap();

        let restored = Identity::from_secrets(&identity.to_secrets());
        assert_eq!(restored.identifier(), identity.identifier());
        assert_eq!(restored.exchange_public_key(), identity.exchange_public_key());
        assert!(restored.psk(&psk_id).is_some());
    }

    #[test]
    fn test_signature_verifies_under_identifier() {
        let identity = Identity::generate(b"seed").unwrap();
        let sig = identity.sign(b"frame");
        identity.public_key().verify(b"frame", &sig).unwrap();
    }
}
