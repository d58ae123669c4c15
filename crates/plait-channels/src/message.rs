//! Messages as seen by a channel participant.

use bytes::Bytes;

use plait_core::{Frame, Identifier, Link, MessageKind};

/// A received (or replayed) channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub link: Link,
    /// The message this one is linked to. `None` only for Announce.
    pub previous_link: Option<Link>,
    pub publisher: Identifier,
    pub kind: MessageKind,
    pub signed: bool,
    pub encrypted: bool,
    pub seq: u64,
    pub public_payload: Bytes,
    /// The decrypted masked payload, or `None` when this user holds no key
    /// for it. Unencrypted messages carry an empty payload.
    pub masked_payload: Option<Bytes>,
}

impl Message {
    pub(crate) fn from_frame(frame: &Frame, masked_payload: Option<Bytes>) -> Self {
        let header = &frame.header;
        Self {
            link: header.link,
            previous_link: header.previous,
            publisher: header.sender,
            kind: header.kind,
            signed: header.signed,
            encrypted: header.encrypted,
            seq: header.seq,
            public_payload: frame.public.clone(),
            masked_payload,
        }
    }

    /// Whether this user could read everything in the message.
    pub fn is_readable(&self) -> bool {
        self.masked_payload.is_some()
    }
}

/// Links produced by a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendResponse {
    /// Where the message itself was published.
    pub link: Link,
    /// The Sequence message locating it (multi-branch channels only).
    pub sequence: Option<Link>,
}

/// Lifecycle state of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// No channel.
    Unbound,
    /// A channel announcement was received.
    Announced,
    /// A Subscribe message was sent.
    Subscribed,
    /// Able to read and publish encrypted content.
    Active,
}
