//! Public payloads of the channel control messages.
//!
//! Encoded as CBOR. Keyload payloads live in `plait-keyload`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use plait_core::{
    BranchingMode, ChannelId, Ed25519PublicKey, Identifier, Link, LinkGenerator, X25519PublicKey,
};

use crate::error::{ChannelError, Result};

/// Announce: the channel's root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncePayload {
    pub author: Ed25519PublicKey,
    pub exchange_key: X25519PublicKey,
    pub branching: BranchingMode,
    pub channel_index: u64,
}

impl AnnouncePayload {
    /// Check that the payload describes the channel announced at `link`.
    pub fn verify(&self, link: &Link, sender: &Identifier) -> Result<()> {
        if *sender != Identifier::Ed25519(self.author) {
            return Err(ChannelError::AuthenticationFailed(
                "announcement not signed by its author".into(),
            ));
        }
        let channel = ChannelId::derive(&self.author, self.channel_index);
        if LinkGenerator::bound(channel).announce_link()? != *link {
            return Err(ChannelError::LinkConflict(*link));
        }
        Ok(())
    }
}

/// Subscribe: a subscriber's request to be included in keyloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribePayload {
    pub exchange_key: X25519PublicKey,
}

/// Sequence: locates a publisher's `seq`-th content message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePayload {
    pub publisher: Identifier,
    pub seq: u64,
    pub ref_link: Link,
}

pub(crate) fn encode<P: Serialize>(payload: &P) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(payload, &mut buf).map_err(|e| ChannelError::Malformed(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn decode<P: DeserializeOwned>(bytes: &[u8]) -> Result<P> {
    ciborium::from_reader(bytes).map_err(|e| ChannelError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use plait_core::Identity;

    fn announce(identity: &Identity, index: u64) -> (Link, AnnouncePayload) {
        let mut links = LinkGenerator::new();
        let link = links.channel_root(&identity.public_key(), index);
        let payload = AnnouncePayload {
            author: identity.public_key(),
            exchange_key: identity.exchange_public_key(),
            branching: BranchingMode::MultiBranch,
            channel_index: index,
        };
        (link, payload)
    }

    #[test]
    fn test_announce_verifies() {
        let author = Identity::generate(b"author").unwrap();
        let (link, payload) = announce(&author, 3);
        payload.verify(&link, &author.identifier()).unwrap();

        let decoded: AnnouncePayload = decode(&encode(&payload).unwrap()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_announce_rejects_other_sender() {
        let author = Identity::generate(b"author").unwrap();
        let mallory = Identity::generate(b"mallory").unwrap();
        let (link, payload) = announce(&author, 0);
        assert!(matches!(
            payload.verify(&link, &mallory.identifier()),
            Err(ChannelError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_announce_rejects_wrong_link() {
        let author = Identity::generate(b"author").unwrap();
        let (_, payload) = announce(&author, 0);
        let (other, _) = announce(&author, 1);
        assert!(matches!(
            payload.verify(&other, &author.identifier()),
            Err(ChannelError::LinkConflict(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            decode::<SequencePayload>(&[0xff, 0x00]),
            Err(ChannelError::Malformed(_))
        ));
    }
}
