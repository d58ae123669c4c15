//! Frames: the wire form of every channel message.
//!
//! ```text
//! frame = header || bstr(public) || bstr(masked) || [signature] || digest
//! ```
//!
//! The header is canonical CBOR (see [`crate::canonical`]). The masked
//! section is sealed with ChaCha20-Poly1305 under a session key, with the
//! header and public section as associated data. Signed frames carry an
//! Ed25519 signature over everything before it, and every frame ends with a
//! Blake3 digest of all preceding bytes.

use bytes::Bytes;

use crate::canonical::{canonical_header_bytes, decode_header, encode_bytes, read_bytes};
use crate::crypto::{derive_key, Blake3Hash, EncryptionKey, Ed25519Signature};
use crate::error::{CoreError, Result};
use crate::identity::Identity;
use crate::types::{Identifier, Link};
use crate::validation::validate_header;

/// The current frame schema version.
pub const FRAME_VERSION: u8 = 0;

pub const SIGNATURE_LEN: usize = 64;
pub const DIGEST_LEN: usize = 32;

const SIGN_CONTEXT: &[u8] = b"plait-sign-v0";

/// The kind of message a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    // Channel lifecycle (0x00 - 0x0F)
    Announce = 0x01,
    Subscribe = 0x02,
    Unsubscribe = 0x03,

    // Access control (0x10 - 0x1F)
    Keyload = 0x10,

    // Content (0x20 - 0x2F)
    SignedPacket = 0x20,
    TaggedPacket = 0x21,

    // Sequencing (0x30 - 0x3F)
    Sequence = 0x30,
}

impl MessageKind {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Announce),
            0x02 => Some(Self::Subscribe),
            0x03 => Some(Self::Unsubscribe),
            0x10 => Some(Self::Keyload),
            0x20 => Some(Self::SignedPacket),
            0x21 => Some(Self::TaggedPacket),
            0x30 => Some(Self::Sequence),
            _ => None,
        }
    }

    /// Kinds that occupy a publisher's sequence slots.
    pub fn is_sequenced(self) -> bool {
        matches!(
            self,
            Self::Keyload | Self::SignedPacket | Self::TaggedPacket
        )
    }
}

/// Frame metadata, covered by both the signature and the digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Schema version (currently 0).
    pub version: u8,

    pub kind: MessageKind,

    /// The link this frame is published at.
    pub link: Link,

    /// The message this one is linked to (None only for Announce).
    pub previous: Option<Link>,

    pub sender: Identifier,

    /// The sender's sequence number for this message.
    pub seq: u64,

    /// The keyload whose session key sealed the masked section.
    pub keyload: Option<Link>,

    pub signed: bool,
    pub encrypted: bool,
}

/// Blake3 digest appended to every frame.
pub fn frame_digest(body: &[u8]) -> Blake3Hash {
    Blake3Hash(derive_key("plait-frame-v0 digest", &[body]))
}

/// The output of [`FrameBuilder::build`].
#[derive(Debug, Clone)]
pub struct WrappedFrame {
    pub header: FrameHeader,
    pub bytes: Vec<u8>,
    pub digest: Blake3Hash,
}

/// Builder for outgoing frames.
pub struct FrameBuilder {
    kind: MessageKind,
    link: Link,
    previous: Option<Link>,
    seq: u64,
    public: Bytes,
    masked: Bytes,
    signed: bool,
    session: Option<(Link, EncryptionKey)>,
}

impl FrameBuilder {
    /// Start a frame of `kind` published at `link`.
    ///
    /// Every kind except TaggedPacket is signed.
    pub fn new(kind: MessageKind, link: Link) -> Self {
        Self {
            kind,
            link,
            previous: None,
            seq: 0,
            public: Bytes::new(),
            masked: Bytes::new(),
            signed: kind != MessageKind::TaggedPacket,
            session: None,
        }
    }

    pub fn previous(mut self, previous: Link) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn public(mut self, payload: impl Into<Bytes>) -> Self {
        self.public = payload.into();
        self
    }

    pub fn masked(mut self, payload: impl Into<Bytes>) -> Self {
        self.masked = payload.into();
        self
    }

    /// Seal the masked section under the session key of `keyload`.
    pub fn encrypt(mut self, keyload: Link, key: &EncryptionKey) -> Self {
        self.session = Some((keyload, key.clone()));
        self
    }

    /// Encode, seal and sign the frame as `identity`.
    pub fn build(self, identity: &Identity) -> Result<WrappedFrame> {
        let header = FrameHeader {
            version: FRAME_VERSION,
            kind: self.kind,
            link: self.link,
            previous: self.previous,
            sender: identity.identifier(),
            seq: self.seq,
            keyload: self.session.as_ref().map(|(link, _)| *link),
            signed: self.signed,
            encrypted: self.session.is_some(),
        };
        validate_header(&header)?;

        let mut body = canonical_header_bytes(&header);
        encode_bytes(&mut body, &self.public);

        let masked = match &self.session {
            Some((_, key)) => key.seal(&self.masked, &body)?,
            None if self.masked.is_empty() => Vec::new(),
            None => {
                return Err(CoreError::Malformed(
                    "masked payload requires a session key".into(),
                ))
            }
        };
        encode_bytes(&mut body, &masked);

        if header.signed {
            let signature = identity.sign(&signing_message(&body));
            body.extend_from_slice(signature.as_bytes());
        }

        let digest = frame_digest(&body);
        body.extend_from_slice(digest.as_bytes());

        Ok(WrappedFrame {
            header,
            bytes: body,
            digest,
        })
    }
}

fn signing_message(body: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(SIGN_CONTEXT.len() + body.len());
    msg.extend_from_slice(SIGN_CONTEXT);
    msg.extend_from_slice(body);
    msg
}

/// A frame whose digest, structure and signature have been verified.
///
/// The masked section stays sealed until [`Frame::open_masked`].
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub public: Bytes,
    masked: Bytes,
    aad: Vec<u8>,
    digest: Blake3Hash,
}

impl Frame {
    /// Decode and authenticate `bytes` fetched from `expected`.
    pub fn decode(bytes: &[u8], expected: &Link) -> Result<Self> {
        if bytes.len() < DIGEST_LEN + 1 {
            return Err(CoreError::Malformed("frame too short".into()));
        }
        let (body, digest_bytes) = bytes.split_at(bytes.len() - DIGEST_LEN);
        let digest = frame_digest(body);
        if digest.as_bytes().as_slice() != digest_bytes {
            return Err(CoreError::AuthenticationFailed("frame digest mismatch".into()));
        }

        let (header, header_len) = decode_header(body)?;
        validate_header(&header)?;

        let (public, public_len) = read_bytes(&body[header_len..])?;
        let aad_len = header_len + public_len;
        let (masked, masked_len) = read_bytes(&body[aad_len..])?;
        let signed_len = aad_len + masked_len;
        let trailer = &body[signed_len..];

        if !header.encrypted && !masked.is_empty() {
            return Err(CoreError::Malformed("plaintext masked section".into()));
        }

        if header.link != *expected {
            return Err(CoreError::LinkConflict(*expected));
        }

        if header.signed {
            let sig: [u8; SIGNATURE_LEN] = trailer
                .try_into()
                .map_err(|_| CoreError::Malformed("invalid signature length".into()))?;
            let signer = header
                .sender
                .public_key()
                .ok_or_else(|| CoreError::Malformed("signed frame without signing key".into()))?;
            signer
                .verify(&signing_message(&body[..signed_len]), &Ed25519Signature(sig))
                .map_err(|_| CoreError::AuthenticationFailed("bad signature".into()))?;
        } else if !trailer.is_empty() {
            return Err(CoreError::Malformed("trailing bytes".into()));
        }

        Ok(Self {
            public: Bytes::copy_from_slice(public),
            masked: Bytes::copy_from_slice(masked),
            aad: body[..aad_len].to_vec(),
            header,
            digest,
        })
    }

    pub fn digest(&self) -> Blake3Hash {
        self.digest
    }

    pub fn kind(&self) -> MessageKind {
        self.header.kind
    }

    pub fn link(&self) -> Link {
        self.header.link
    }

    pub fn sender(&self) -> Identifier {
        self.header.sender
    }

    /// Decrypt the masked section. Unencrypted frames yield an empty payload.
    pub fn open_masked(&self, key: &EncryptionKey) -> Result<Bytes> {
        if !self.header.encrypted {
            return Ok(Bytes::new());
        }
        key.open(&self.masked, &self.aad)
            .map(Bytes::from)
            .map_err(|_| CoreError::AuthenticationFailed("masked payload tag mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkGenerator;

    fn setup() -> (Identity, LinkGenerator, Link) {
        let identity = Identity::generate(b"frame author").unwrap();
        let mut gen = LinkGenerator::new();
        let root = gen.channel_root(&identity.public_key(), 0);
        (identity, gen, root)
    }

    #[test]
    fn test_announce_roundtrip() {
        let (identity, _, root) = setup();
        let wrapped = FrameBuilder::new(MessageKind::Announce, root)
            .public(b"announce".to_vec())
            .build(&identity)
            .unwrap();

        let frame = Frame::decode(&wrapped.bytes, &root).unwrap();
        assert_eq!(frame.header, wrapped.header);
        assert_eq!(frame.public.as_ref(), b"announce");
        assert_eq!(frame.digest(), wrapped.digest);
        assert_eq!(frame.sender(), identity.identifier());
    }

    #[test]
    fn test_encrypted_packet_roundtrip() {
        let (identity, gen, root) = setup();
        let key = EncryptionKey::generate();
        let link = gen.chain_link(&root, 1).unwrap();
        let wrapped = FrameBuilder::new(MessageKind::TaggedPacket, link)
            .previous(root)
            .seq(1)
            .public(b"public".to_vec())
            .masked(b"secret".to_vec())
            .encrypt(root, &key)
            .build(&identity)
            .unwrap();

        assert!(!wrapped.header.signed);
        let frame = Frame::decode(&wrapped.bytes, &link).unwrap();
        assert_eq!(frame.header.keyload, Some(root));
        assert_eq!(frame.open_masked(&key).unwrap().as_ref(), b"secret");
        assert!(matches!(
            frame.open_masked(&EncryptionKey::generate()),
            Err(CoreError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_every_bit_flip_is_detected() {
        let (identity, gen, root) = setup();
        let link = gen.chain_link(&root, 1).unwrap();
        let wrapped = FrameBuilder::new(MessageKind::SignedPacket, link)
            .previous(root)
            .seq(1)
            .public(b"hello".to_vec())
            .build(&identity)
            .unwrap();

        for byte in 0..wrapped.bytes.len() {
            let mut tampered = wrapped.bytes.clone();
            tampered[byte] ^= 0x01;
            assert!(
                matches!(
                    Frame::decode(&tampered, &link),
                    Err(CoreError::AuthenticationFailed(_))
                ),
                "flip at byte {} was not detected",
                byte
            );
        }
    }

    #[test]
    fn test_frame_at_wrong_link_conflicts() {
        let (identity, gen, root) = setup();
        let link = gen.chain_link(&root, 1).unwrap();
        let elsewhere = gen.chain_link(&root, 2).unwrap();
        let wrapped = FrameBuilder::new(MessageKind::SignedPacket, link)
            .previous(root)
            .seq(1)
            .build(&identity)
            .unwrap();

        assert!(matches!(
            Frame::decode(&wrapped.bytes, &elsewhere),
            Err(CoreError::LinkConflict(l)) if l == elsewhere
        ));
    }

    #[test]
    fn test_masked_without_key_rejected() {
        let (identity, gen, root) = setup();
        let link = gen.chain_link(&root, 1).unwrap();
        let result = FrameBuilder::new(MessageKind::SignedPacket, link)
            .previous(root)
            .masked(b"secret".to_vec())
            .build(&identity);
        assert!(matches!(result, Err(CoreError::Malformed(_))));
    }

    #[test]
    fn test_forged_signature_detected_after_redigest() {
        let (identity, gen, root) = setup();
        let link = gen.chain_link(&root, 1).unwrap();
        let wrapped = FrameBuilder::new(MessageKind::SignedPacket, link)
            .previous(root)
            .seq(1)
            .public(b"original".to_vec())
            .build(&identity)
            .unwrap();

        // Corrupt the signature and recompute the digest so only the
        // signature check can catch it.
        let mut body = wrapped.bytes[..wrapped.bytes.len() - DIGEST_LEN].to_vec();
        let last = body.len() - 1;
        body[last] ^= 0x80;
        let digest = frame_digest(&body);
        body.extend_from_slice(digest.as_bytes());

        assert!(matches!(
            Frame::decode(&body, &link),
            Err(CoreError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_message_kind_codes() {
        for kind in [
            MessageKind::Announce,
            MessageKind::Subscribe,
            MessageKind::Unsubscribe,
            MessageKind::Keyload,
            MessageKind::SignedPacket,
            MessageKind::TaggedPacket,
            MessageKind::Sequence,
        ] {
            assert_eq!(MessageKind::from_u8(kind.to_u8()), Some(kind));
        }
        assert!(MessageKind::Keyload.is_sequenced());
        assert!(!MessageKind::Sequence.is_sequenced());
    }
}
