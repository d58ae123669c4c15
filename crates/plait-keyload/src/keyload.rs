//! Keyload payloads.
//!
//! A keyload distributes one fresh session key to an explicit recipient set.
//! The payload is public: it lists who can open it, but the key itself is
//! only recoverable through a matching [`KeySlot`].

use rand::RngCore;
use serde::{Deserialize, Serialize};

use plait_core::{
    Ed25519PublicKey, EncryptionKey, Identifier, Identity, Link, PskId, X25519PublicKey,
};

use crate::error::{KeyloadError, Result};
use crate::slot::KeySlot;

/// The recipients of a keyload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    members: Vec<(Ed25519PublicKey, X25519PublicKey)>,
    psks: Vec<PskId>,
}

impl Recipients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signing participant. Duplicates are ignored.
    pub fn with_member(mut self, public_key: Ed25519PublicKey, exchange_key: X25519PublicKey) -> Self {
        self.add_member(public_key, exchange_key);
        self
    }

    /// Add a pre-shared key. Duplicates are ignored.
    pub fn with_psk(mut self, id: PskId) -> Self {
        self.add_psk(id);
        self
    }

    pub fn add_member(&mut self, public_key: Ed25519PublicKey, exchange_key: X25519PublicKey) {
        if !self.members.iter().any(|(pk, _)| *pk == public_key) {
            self.members.push((public_key, exchange_key));
        }
    }

    pub fn add_psk(&mut self, id: PskId) {
        if !self.psks.contains(&id) {
            self.psks.push(id);
        }
    }

    pub fn members(&self) -> &[(Ed25519PublicKey, X25519PublicKey)] {
        &self.members
    }

    pub fn psks(&self) -> &[PskId] {
        &self.psks
    }

    pub fn len(&self) -> usize {
        self.members.len() + self.psks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.psks.is_empty()
    }

    /// Every recipient as an identifier.
    pub fn identifiers(&self) -> Vec<Identifier> {
        self.members
            .iter()
            .map(|(pk, _)| Identifier::Ed25519(*pk))
            .chain(self.psks.iter().map(|id| Identifier::Psk(*id)))
            .collect()
    }
}

/// Public payload of a Keyload message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyloadPayload {
    /// Random salt mixed into every slot's wrapping key.
    pub nonce: [u8; 16],
    pub slots: Vec<KeySlot>,
}

impl KeyloadPayload {
    /// Wrap `key` for every recipient of a keyload published at `link`.
    ///
    /// PSK recipients must be held by `sender`.
    pub fn seal(
        link: &Link,
        key: &EncryptionKey,
        recipients: &Recipients,
        sender: &Identity,
    ) -> Result<Self> {
        if recipients.is_empty() {
            return Err(KeyloadError::EmptyRecipientSet);
        }

        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let context = slot_context(link, &nonce);

        let mut slots = Vec::with_capacity(recipients.len());
        for (public_key, exchange_key) in recipients.members() {
            slots.push(KeySlot::for_exchange(
                &context,
                key,
                *public_key,
                *exchange_key,
            )?);
        }
        for id in recipients.psks() {
            let psk = sender.psk(id).ok_or(KeyloadError::UnknownPsk(*id))?;
            slots.push(KeySlot::for_psk(&context, key, psk)?);
        }

        Ok(Self { nonce, slots })
    }

    /// Recover the session key as `identity`.
    ///
    /// Fails with [`KeyloadError::NoAccess`] when no slot opens; nothing
    /// about the key is revealed in that case.
    pub fn open(&self, link: &Link, identity: &Identity) -> Result<EncryptionKey> {
        let context = slot_context(link, &self.nonce);
        let own = identity.public_key();

        for slot in &self.slots {
            let opened = match slot {
                KeySlot::Exchange { recipient, .. } if *recipient == own => {
                    slot.open_exchange(&context, identity.exchange_secret())
                }
                KeySlot::Psk { id, .. } => match identity.psk(id) {
                    Some(psk) => slot.open_psk(&context, psk),
                    None => continue,
                },
                _ => continue,
            };
            if let Ok(key) = opened {
                return Ok(key);
            }
        }
        Err(KeyloadError::NoAccess)
    }

    /// Every identifier the keyload is addressed to.
    pub fn recipients(&self) -> impl Iterator<Item = Identifier> + '_ {
        self.slots.iter().map(KeySlot::identifier)
    }

    /// Signing recipients with the exchange keys they were sealed to.
    pub fn members(&self) -> impl Iterator<Item = (Ed25519PublicKey, X25519PublicKey)> + '_ {
        self.slots.iter().filter_map(|slot| match slot {
            KeySlot::Exchange {
                recipient,
                exchange_key,
                ..
            } => Some((*recipient, *exchange_key)),
            KeySlot::Psk { .. } => None,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| KeyloadError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| KeyloadError::Serialization(e.to_string()))
    }
}

fn slot_context(link: &Link, nonce: &[u8; 16]) -> Vec<u8> {
    let mut context = Vec::with_capacity(80);
    context.extend_from_slice(&link.to_bytes());
    context.extend_from_slice(nonce);
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use plait_core::{ChannelId, MsgId};

    fn link() -> Link {
        Link::new(ChannelId([1; 32]), MsgId([2; 32]))
    }

    fn member(identity: &Identity) -> (Ed25519PublicKey, X25519PublicKey) {
        (identity.public_key(), identity.exchange_public_key())
    }

    #[test]
    fn test_empty_recipients_rejected() {
        let author = Identity::generate(b"author").unwrap();
        let result = KeyloadPayload::seal(&link(), &EncryptionKey::generate(), &Recipients::new(), &author);
        assert!(matches!(result, Err(KeyloadError::EmptyRecipientSet)));
    }

    #[test]
    fn test_members_and_psk_holders_open() {
        let mut author = Identity::generate(b"author").unwrap();
        let alice = Identity::generate(b"alice").unwrap();
        let mut psk_holder = Identity::generate(b"psk holder").unwrap();
        let psk_id = author.store_psk(b"group secret").unwrap();
        psk_holder.store_psk(b"group secret").unwrap();

        let (pk, xk) = member(&alice);
        let recipients = Recipients::new().with_member(pk, xk).with_psk(psk_id);
        let key = EncryptionKey::generate();
        let payload = KeyloadPayload::seal(&link(), &key, &recipients, &author).unwrap();

        assert_eq!(payload.open(&link(), &alice).unwrap().as_bytes(), key.as_bytes());
        assert_eq!(payload.open(&link(), &psk_holder).unwrap().as_bytes(), key.as_bytes());
        assert_eq!(
            payload.recipients().collect::<Vec<_>>(),
            vec![alice.identifier(), Identifier::Psk(psk_id)]
        );
    }

    #[test]
    fn test_outsider_denied() {
        let author = Identity::generate(b"author").unwrap();
        let alice = Identity::generate(b"alice").unwrap();
        let mallory = Identity::generate(b"mallory").unwrap();
        let (pk, xk) = member(&alice);
        let payload = KeyloadPayload::seal(
            &link(),
            &EncryptionKey::generate(),
            &Recipients::new().with_member(pk, xk),
            &author,
        )
        .unwrap();

        assert!(matches!(payload.open(&link(), &mallory), Err(KeyloadError::NoAccess)));
    }

    #[test]
    fn test_slots_bound_to_link() {
        let author = Identity::generate(b"author").unwrap();
        let alice = Identity::generate(b"alice").unwrap();
        let (pk, xk) = member(&alice);
        let payload = KeyloadPayload::seal(
            &link(),
            &EncryptionKey::generate(),
            &Recipients::new().with_member(pk, xk),
            &author,
        )
        .unwrap();

        let other = Link::new(ChannelId([1; 32]), MsgId([3; 32]));
        assert!(payload.open(&other, &alice).is_err());
    }

    #[test]
    fn test_unknown_psk_rejected() {
        let author = Identity::generate(b"author").unwrap();
        let recipients = Recipients::new().with_psk(PskId([7; 16]));
        assert!(matches!(
            KeyloadPayload::seal(&link(), &EncryptionKey::generate(), &recipients, &author),
            Err(KeyloadError::UnknownPsk(_))
        ));
    }

    #[test]
    fn test_payload_serialization() {
        let author = Identity::generate(b"author").unwrap();
        let (pk, xk) = member(&author);
        let payload = KeyloadPayload::seal(
            &link(),
            &EncryptionKey::generate(),
            &Recipients::new().with_member(pk, xk),
            &author,
        )
        .unwrap();
        let decoded = KeyloadPayload::from_bytes(&payload.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(decoded.members().collect::<Vec<_>>(), vec![(pk, xk)]);
    }

    #[test]
    fn test_recipient_dedup() {
        let alice = Identity::generate(b"alice").unwrap();
        let (pk, xk) = member(&alice);
        let recipients = Recipients::new()
            .with_member(pk, xk)
            .with_member(pk, xk)
            .with_psk(PskId([1; 16]))
            .with_psk(PskId([1; 16]));
        assert_eq!(recipients.len(), 2);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(16))]

        #[test]
        fn test_every_member_recovers_the_key(count in 1usize..6) {
            let author = Identity::generate(b"author").unwrap();
            let members: Vec<Identity> = (0..count)
                .map(|i| Identity::generate(format!("member {}", i).as_bytes()).unwrap())
                .collect();
            let recipients = members.iter().fold(Recipients::new(), |set, m| {
                let (pk, xk) = member(m);
                set.with_member(pk, xk)
            });
            let key = EncryptionKey::generate();
            let payload = KeyloadPayload::seal(&link(), &key, &recipients, &author).unwrap();

            for m in &members {
                let opened = payload.open(&link(), m).unwrap();
                proptest::prop_assert_eq!(opened.as_bytes(), key.as_bytes());
            }
            proptest::prop_assert!(payload.open(&link(), &author).is_err());
        }
    }
}
