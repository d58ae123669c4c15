//! Canonical CBOR encoding for frame headers.
//!
//! This module implements the subset of RFC 8949 Core Deterministic Encoding
//! that frame headers need:
//! - Map keys are small integers written in ascending order
//! - Integers and lengths use the smallest valid encoding
//! - Definite lengths only
//!
//! Decoding re-encodes the parsed header and requires the bytes to match, so
//! every header has exactly one accepted encoding.

use ciborium::value::Value;

use crate::error::{CoreError, Result};
use crate::frame::{FrameHeader, MessageKind, FRAME_VERSION};
use crate::types::{ChannelId, Identifier, Link, MsgId};

/// Header field keys (integer keys for compact encoding).
mod keys {
    pub const VERSION: u64 = 0;
    pub const KIND: u64 = 1;
    pub const CHANNEL: u64 = 2;
    pub const MSG: u64 = 3;
    pub const PREVIOUS: u64 = 4;
    pub const SENDER: u64 = 5;
    pub const SEQ: u64 = 6;
    pub const KEYLOAD: u64 = 7;
    pub const FLAGS: u64 = 8;

    pub const COUNT: u64 = 9;
}

const FLAG_SIGNED: u64 = 0b01;
const FLAG_ENCRYPTED: u64 = 0b10;

/// Encode a frame header to canonical CBOR bytes.
pub fn canonical_header_bytes(header: &FrameHeader) -> Vec<u8> {
    let mut buf = Vec::with_capacity(160);
    encode_uint(&mut buf, 5, keys::COUNT);

    encode_uint(&mut buf, 0, keys::VERSION);
    encode_uint(&mut buf, 0, header.version as u64);

    encode_uint(&mut buf, 0, keys::KIND);
    encode_uint(&mut buf, 0, header.kind.to_u8() as u64);

    encode_uint(&mut buf, 0, keys::CHANNEL);
    encode_bytes(&mut buf, header.link.channel.as_bytes());

    encode_uint(&mut buf, 0, keys::MSG);
    encode_bytes(&mut buf, header.link.msg.as_bytes());

    encode_uint(&mut buf, 0, keys::PREVIOUS);
    encode_optional_msg(&mut buf, header.previous.as_ref());

    encode_uint(&mut buf, 0, keys::SENDER);
    encode_bytes(&mut buf, &header.sender.to_bytes());

    encode_uint(&mut buf, 0, keys::SEQ);
    encode_uint(&mut buf, 0, header.seq);

    encode_uint(&mut buf, 0, keys::KEYLOAD);
    encode_optional_msg(&mut buf, header.keyload.as_ref());

    let mut flags = 0;
    if header.signed {
        flags |= FLAG_SIGNED;
    }
    if header.encrypted {
        flags |= FLAG_ENCRYPTED;
    }
    encode_uint(&mut buf, 0, keys::FLAGS);
    encode_uint(&mut buf, 0, flags);

    buf
}

fn encode_optional_msg(buf: &mut Vec<u8>, link: Option<&Link>) {
    match link {
        Some(link) => encode_bytes(buf, link.msg.as_bytes()),
        None => buf.push(0xf6),
    }
}

/// Encode an unsigned integer with the given major type.
pub(crate) fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
pub(crate) fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Read a minimally encoded byte string from the front of `buf`.
///
/// Returns the contents and the number of bytes consumed.
pub(crate) fn read_bytes(buf: &[u8]) -> Result<(&[u8], usize)> {
    let (&initial, rest) = buf
        .split_first()
        .ok_or_else(|| CoreError::Malformed("missing byte string".into()))?;
    if initial >> 5 != 2 {
        return Err(CoreError::Malformed("expected byte string".into()));
    }

    let (len, width): (u64, usize) = match initial & 0x1f {
        n @ 0..=23 => (n as u64, 0),
        24 => (read_be(rest, 1)?, 1),
        25 => (read_be(rest, 2)?, 2),
        26 => (read_be(rest, 4)?, 4),
        27 => (read_be(rest, 8)?, 8),
        _ => return Err(CoreError::Malformed("indefinite length".into())),
    };

    let mut canonical = Vec::with_capacity(9);
    encode_uint(&mut canonical, 2, len);
    if canonical.len() != 1 + width {
        return Err(CoreError::Malformed("non-minimal length".into()));
    }

    let len = usize::try_from(len).map_err(|_| CoreError::Malformed("length overflow".into()))?;
    let start = 1 + width;
    let end = start
        .checked_add(len)
        .filter(|end| *end <= buf.len())
        .ok_or_else(|| CoreError::Malformed("truncated byte string".into()))?;
    Ok((&buf[start..end], end))
}

fn read_be(buf: &[u8], width: usize) -> Result<u64> {
    if buf.len() < width {
        return Err(CoreError::Malformed("truncated length".into()));
    }
    Ok(buf[..width]
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | *byte as u64))
}

/// Decode a header from the front of `bytes`.
///
/// Returns the header and its encoded length.
pub fn decode_header(bytes: &[u8]) -> Result<(FrameHeader, usize)> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::Malformed(e.to_string()))?;
    let header = cbor_value_to_header(&value)?;

    let encoded = canonical_header_bytes(&header);
    if !bytes.starts_with(&encoded) {
        return Err(CoreError::Malformed("non-canonical header".into()));
    }
    Ok((header, encoded.len()))
}

/// Convert a CBOR Value (map) back to a FrameHeader.
fn cbor_value_to_header(value: &Value) -> Result<FrameHeader> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(CoreError::Malformed("expected map".into())),
    };

    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
            .map(|(_, v)| v)
    };

    let uint = |key: u64, name: &str| -> Result<u64> {
        match get(key) {
            Some(Value::Integer(i)) => u64::try_from(i128::from(*i))
                .map_err(|_| CoreError::Malformed(format!("invalid {}", name))),
            _ => Err(CoreError::Malformed(format!("missing {}", name))),
        }
    };

    let bytes32 = |key: u64, name: &str| -> Result<[u8; 32]> {
        match get(key) {
            Some(Value::Bytes(b)) => b
                .as_slice()
                .try_into()
                .map_err(|_| CoreError::Malformed(format!("invalid {}", name))),
            _ => Err(CoreError::Malformed(format!("missing {}", name))),
        }
    };

    let optional32 = |key: u64, name: &str| -> Result<Option<MsgId>> {
        match get(key) {
            Some(Value::Null) => Ok(None),
            Some(Value::Bytes(b)) => b
                .as_slice()
                .try_into()
                .map(|arr| Some(MsgId(arr)))
                .map_err(|_| CoreError::Malformed(format!("invalid {}", name))),
            _ => Err(CoreError::Malformed(format!("missing {}", name))),
        }
    };

    let version = uint(keys::VERSION, "version")?;
    if version != FRAME_VERSION as u64 {
        return Err(CoreError::UnsupportedVersion(version.min(u8::MAX as u64) as u8));
    }

    let kind_code = uint(keys::KIND, "kind")?;
    let kind = u8::try_from(kind_code)
        .ok()
        .and_then(MessageKind::from_u8)
        .ok_or_else(|| CoreError::Malformed(format!("invalid kind: {}", kind_code)))?;

    let channel = ChannelId(bytes32(keys::CHANNEL, "channel")?);
    let link = Link::new(channel, MsgId(bytes32(keys::MSG, "msg")?));

    let sender = match get(keys::SENDER) {
        Some(Value::Bytes(b)) => Identifier::from_slice(b)
            .ok_or_else(|| CoreError::Malformed("invalid sender".into()))?,
        _ => return Err(CoreError::Malformed("missing sender".into())),
    };

    let flags = uint(keys::FLAGS, "flags")?;
    if flags & !(FLAG_SIGNED | FLAG_ENCRYPTED) != 0 {
        return Err(CoreError::Malformed(format!("unknown flags: {:#b}", flags)));
    }

    Ok(FrameHeader {
        version: FRAME_VERSION,
        kind,
        link,
        previous: optional32(keys::PREVIOUS, "previous")?.map(|msg| Link::new(channel, msg)),
        sender,
        seq: uint(keys::SEQ, "seq")?,
        keyload: optional32(keys::KEYLOAD, "keyload")?.map(|msg| Link::new(channel, msg)),
        signed: flags & FLAG_SIGNED != 0,
        encrypted: flags & FLAG_ENCRYPTED != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519PublicKey;

    fn sample_header() -> FrameHeader {
        let channel = ChannelId([3; 32]);
        FrameHeader {
            version: FRAME_VERSION,
            kind: MessageKind::SignedPacket,
            link: Link::new(channel, MsgId([4; 32])),
            previous: Some(Link::new(channel, MsgId([5; 32]))),
            sender: Identifier::Ed25519(Ed25519PublicKey([6; 32])),
            seq: 300,
            keyload: None,
            signed: true,
            encrypted: false,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample_header();
        let bytes = canonical_header_bytes(&header);
        let (decoded, len) = decode_header(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(len, bytes.len());
    }

    #[test]
    fn test_header_decoding_ignores_trailing_bytes() {
        let mut bytes = canonical_header_bytes(&sample_header());
        let len = bytes.len();
        bytes.extend_from_slice(b"payload");
        let (_, consumed) = decode_header(&bytes).unwrap();
        assert_eq!(consumed, len);
    }

    #[test]
    fn test_non_minimal_integer_rejected() {
        let header = sample_header();
        let mut bytes = canonical_header_bytes(&header);
        // The version value sits at offset 2; widen it to the two-byte form.
        bytes.splice(2..3, [0x18, 0x00]);
        assert!(decode_header(&bytes).is_err());
    }

    #[test]
    fn test_unsupported_version() {
        let mut header = sample_header();
        header.version = 7;
        let bytes = canonical_header_bytes(&header);
        assert!(matches!(
            decode_header(&bytes),
            Err(CoreError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_integer_encoding() {
        let mut buf = Vec::new();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);
    }

    #[test]
    fn test_read_bytes() {
        let mut buf = Vec::new();
        encode_bytes(&mut buf, &[9u8; 30]);
        buf.push(0xff);
        let (content, consumed) = read_bytes(&buf).unwrap();
        assert_eq!(content, &[9u8; 30]);
        assert_eq!(consumed, 32);

        assert!(read_bytes(&[0x58, 0x01, 0x00]).is_err()); // non-minimal length
        assert!(read_bytes(&[0x45, 0x00]).is_err()); // truncated
        assert!(read_bytes(&[0x01]).is_err()); // wrong major type
    }
}
