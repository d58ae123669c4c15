//! Strong type definitions for channel addressing.
//!
//! Channel and message ids are 32-byte newtypes; a [`Link`] pairs the two.
//! An [`Identifier`] names a participant.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::Ed25519PublicKey;
use crate::psk::PskId;

macro_rules! id32 {
    ($(#[$meta:meta])* $name:ident, $debug:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex string.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }

            /// The all-zero id (sentinel).
            pub const ZERO: Self = Self([0u8; 32]);
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $debug, &self.to_hex()[..16])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", &self.to_hex()[..16])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;

            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; 32] = slice.try_into()?;
                Ok(Self(arr))
            }
        }
    };
}

id32!(
    /// A 32-byte channel identifier, fixed when the channel is announced.
    ChannelId,
    "ChannelId"
);

id32!(
    /// A 32-byte message identifier, unique within its channel.
    MsgId,
    "MsgId"
);

/// The address of a single message: `(channel_id, message_id)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    pub channel: ChannelId,
    pub msg: MsgId,
}

impl Link {
    pub const fn new(channel: ChannelId, msg: MsgId) -> Self {
        Self { channel, msg }
    }

    /// The 64 raw bytes `channel || msg`.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.channel.0);
        out[32..].copy_from_slice(&self.msg.0);
        out
    }

    /// Parse the 64-byte form produced by [`Link::to_bytes`].
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 64 {
            return None;
        }
        let channel = ChannelId::try_from(&bytes[..32]).ok()?;
        let msg = MsgId::try_from(&bytes[32..]).ok()?;
        Some(Self { channel, msg })
    }

    /// Full hex form `channel:msg`.
    pub fn to_hex(&self) -> String {
        format!("{}:{}", self.channel.to_hex(), self.msg.to_hex())
    }

    /// Parse the form produced by [`Link::to_hex`].
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let (channel, msg) = s
            .split_once(':')
            .ok_or(hex::FromHexError::InvalidStringLength)?;
        Ok(Self {
            channel: ChannelId::from_hex(channel)?,
            msg: MsgId::from_hex(msg)?,
        })
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({}:{})", self.channel, self.msg)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.msg)
    }
}

/// A participant identifier.
///
/// Signing participants are named by their Ed25519 public key. Symmetric-only
/// recipients are named by the id of a pre-shared key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Identifier {
    Ed25519(Ed25519PublicKey),
    Psk(PskId),
}

impl Identifier {
    const ED25519_TAG: u8 = 0;
    const PSK_TAG: u8 = 1;

    /// Tagged byte encoding used for link derivation and frame headers.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Identifier::Ed25519(pk) => {
                let mut out = Vec::with_capacity(33);
                out.push(Self::ED25519_TAG);
                out.extend_from_slice(pk.as_bytes());
                out
            }
            Identifier::Psk(id) => {
                let mut out = Vec::with_capacity(17);
                out.push(Self::PSK_TAG);
                out.extend_from_slice(id.as_bytes());
                out
            }
        }
    }

    /// Parse the tagged encoding produced by [`Identifier::to_bytes`].
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let (tag, rest) = bytes.split_first()?;
        match *tag {
            Self::ED25519_TAG => {
                let arr: [u8; 32] = rest.try_into().ok()?;
                Some(Identifier::Ed25519(Ed25519PublicKey(arr)))
            }
            Self::PSK_TAG => {
                let arr: [u8; 16] = rest.try_into().ok()?;
                Some(Identifier::Psk(PskId(arr)))
            }
            _ => None,
        }
    }

    /// The signing key, if this identifier can sign.
    pub fn public_key(&self) -> Option<&Ed25519PublicKey> {
        match self {
            Identifier::Ed25519(pk) => Some(pk),
            Identifier::Psk(_) => None,
        }
    }
}

impl From<Ed25519PublicKey> for Identifier {
    fn from(pk: Ed25519PublicKey) -> Self {
        Identifier::Ed25519(pk)
    }
}

impl From<PskId> for Identifier {
    fn from(id: PskId) -> Self {
        Identifier::Psk(id)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Ed25519(pk) => write!(f, "Identifier({:?})", pk),
            Identifier::Psk(id) => write!(f, "Identifier({:?})", id),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Ed25519(pk) => write!(f, "ed25519:{}", &pk.to_hex()[..16]),
            Identifier::Psk(id) => write!(f, "psk:{}", id.to_hex()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_id_hex_roundtrip() {
        let id = MsgId::from_bytes([0x42; 32]);
        let recovered = MsgId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_channel_id_display() {
        let id = ChannelId::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", id), "abababababababab");
        assert!(format!("{:?}", id).starts_with("ChannelId("));
    }

    #[test]
    fn test_link_bytes_and_hex() {
        let link = Link::new(ChannelId::from_bytes([1; 32]), MsgId::from_bytes([2; 32]));
        assert_eq!(Link::from_slice(&link.to_bytes()), Some(link));
        assert_eq!(Link::from_hex(&link.to_hex()).unwrap(), link);
        assert!(Link::from_slice(&[0u8; 63]).is_none());
    }

    #[test]
    fn test_identifier_tagged_encoding() {
        let signer = Identifier::Ed25519(Ed25519PublicKey([7; 32]));
        let psk = Identifier::Psk(PskId([9; 16]));

        assert_eq!(signer.to_bytes().len(), 33);
        assert_eq!(psk.to_bytes().len(), 17);
        assert_eq!(Identifier::from_slice(&signer.to_bytes()), Some(signer));
        assert_eq!(Identifier::from_slice(&psk.to_bytes()), Some(psk));
        assert_eq!(Identifier::from_slice(&[2, 0, 0]), None);
        assert!(psk.public_key().is_none());
    }

    #[test]
    fn test_identifier_ordering_is_total() {
        let a = Identifier::Ed25519(Ed25519PublicKey([1; 32]));
        let b = Identifier::Ed25519(Ed25519PublicKey([2; 32]));
        let c = Identifier::Psk(PskId([0; 16]));
        let mut ids = vec![c, b, a];
        ids.sort();
        assert_eq!(ids, vec![a, b, c]);
    }

    proptest::proptest! {
        #[test]
        fn test_identifier_parse_is_total(bytes in proptest::collection::vec(proptest::num::u8::ANY, 0..40)) {
            if let Some(id) = Identifier::from_slice(&bytes) {
                proptest::prop_assert_eq!(id.to_bytes(), bytes);
            }
        }
    }
}
