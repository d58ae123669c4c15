//! One-time X25519 keys for key slots.

use x25519_dalek::{EphemeralSecret, PublicKey};

use plait_core::{SharedKey, X25519PublicKey};

/// A keyload's sender half of one exchange slot.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = X25519PublicKey::from(PublicKey::from(&secret));
        Self { secret, public }
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.public
    }

    /// Agree on a shared key with a recipient. Takes `self` so the secret
    /// is gone after one slot.
    pub fn diffie_hellman(self, recipient: &X25519PublicKey) -> SharedKey {
        let shared = self.secret.diffie_hellman(&PublicKey::from(recipient.0));
        SharedKey::from_bytes(shared.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plait_core::X25519StaticSecret;

    #[test]
    fn test_ephemeral_key_agreement() {
        let bob = X25519StaticSecret::from_bytes([9; 32]);
        let alice = EphemeralKeyPair::generate();
        let alice_public = alice.public_key();

        let alice_shared = alice.diffie_hellman(&bob.public_key());
        let bob_shared = bob.diffie_hellman(&alice_public);
        assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
    }
}
