//! Structural validation of frame headers.
//!
//! Checks the flag and linkage rules each message kind must follow. Runs on
//! both wrap and unwrap, so a malformed frame is never produced or accepted.

use crate::error::{CoreError, Result};
use crate::frame::{FrameHeader, MessageKind};
use crate::types::Identifier;

/// Validate the structure of a frame header.
pub fn validate_header(header: &FrameHeader) -> Result<()> {
    let fail = |msg: &str| Err(CoreError::Malformed(format!("{:?}: {}", header.kind, msg)));

    if header.encrypted != header.keyload.is_some() {
        return fail("keyload link must accompany encryption");
    }
    if header.signed && !matches!(header.sender, Identifier::Ed25519(_)) {
        return fail("signed frames need a signing sender");
    }
    if header.kind != MessageKind::Announce && header.previous.is_none() {
        return fail("missing previous link");
    }

    match header.kind {
        MessageKind::Announce => {
            if header.previous.is_some() {
                return fail("announce cannot link to a previous message");
            }
            if !header.signed || header.encrypted {
                return fail("announce must be signed and public");
            }
        }
        MessageKind::Subscribe
        | MessageKind::Unsubscribe
        | MessageKind::Keyload
        | MessageKind::Sequence => {
            if !header.signed || header.encrypted {
                return fail("must be signed and public");
            }
        }
        MessageKind::SignedPacket => {
            if !header.signed {
                return fail("must be signed");
            }
        }
        MessageKind::TaggedPacket => {
            if header.signed || !header.encrypted {
                return fail("must be encrypted and unsigned");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519PublicKey;
    use crate::frame::FRAME_VERSION;
    use crate::psk::PskId;
    use crate::types::{ChannelId, Link, MsgId};

    fn header(kind: MessageKind) -> FrameHeader {
        let channel = ChannelId([1; 32]);
        FrameHeader {
            version: FRAME_VERSION,
            kind,
            link: Link::new(channel, MsgId([2; 32])),
            previous: Some(Link::new(channel, MsgId([3; 32]))),
            sender: Identifier::Ed25519(Ed25519PublicKey([4; 32])),
            seq: 1,
            keyload: None,
            signed: true,
            encrypted: false,
        }
    }

    #[test]
    fn test_valid_signed_packet() {
        assert!(validate_header(&header(MessageKind::SignedPacket)).is_ok());
    }

    #[test]
    fn test_announce_rules() {
        let mut h = header(MessageKind::Announce);
        assert!(validate_header(&h).is_err());
        h.previous = None;
        assert!(validate_header(&h).is_ok());
    }

    #[test]
    fn test_tagged_packet_rules() {
        let mut h = header(MessageKind::TaggedPacket);
        assert!(validate_header(&h).is_err());
        h.signed = false;
        h.encrypted = true;
        h.keyload = h.previous;
        assert!(validate_header(&h).is_ok());
    }

    #[test]
    fn test_encryption_needs_keyload() {
        let mut h = header(MessageKind::SignedPacket);
        h.encrypted = true;
        assert!(validate_header(&h).is_err());
    }

    #[test]
    fn test_psk_sender_cannot_sign() {
        let mut h = header(MessageKind::Keyload);
        h.sender = Identifier::Psk(PskId([0; 16]));
        assert!(validate_header(&h).is_err());
    }

    #[test]
    fn test_keyload_must_be_public() {
        let mut h = header(MessageKind::Keyload);
        h.encrypted = true;
        h.keyload = h.previous;
        assert!(validate_header(&h).is_err());
    }
}
