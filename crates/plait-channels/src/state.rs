//! Per-user session state.
//!
//! Everything a participant knows about its channel lives in one
//! [`SessionState`] value. Operations work on a copy and swap it in once
//! every step (including the transport round-trip) has succeeded.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use plait_core::{
    Blake3Hash, BranchingMode, ChannelId, Cursor, Ed25519PublicKey, FrameHeader, Identifier,
    Link, LinkGenerator, MessageKind, SequencingStore, X25519PublicKey,
};
use plait_keyload::{SessionKeys, SessionKeysSnapshot};

use crate::error::{ChannelError, Result};

/// What the announcement fixed about a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub announce: Link,
    pub author: Ed25519PublicKey,
    pub author_exchange_key: X25519PublicKey,
    pub branching: BranchingMode,
}

#[derive(Debug, Clone)]
pub(crate) struct SessionState {
    pub(crate) links: LinkGenerator,
    pub(crate) channel: Option<ChannelInfo>,
    pub(crate) sequencing: SequencingStore,
    /// Author side: accepted subscribers.
    pub(crate) subscribers: BTreeSet<Ed25519PublicKey>,
    /// Key-exchange keys of every participant met so far.
    pub(crate) exchange_keys: BTreeMap<Ed25519PublicKey, X25519PublicKey>,
    /// Subscriber side: the link of our Subscribe message.
    pub(crate) registration: Option<Link>,
    pub(crate) session_keys: SessionKeys,
    /// The keyload governing each content message, by the message's link.
    /// A keyload governs itself.
    pub(crate) keyloads: BTreeMap<Link, Link>,
    /// Digest of every frame processed, by link.
    pub(crate) seen: BTreeMap<Link, Blake3Hash>,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self {
            links: LinkGenerator::new(),
            channel: None,
            sequencing: SequencingStore::new(BranchingMode::default()),
            subscribers: BTreeSet::new(),
            exchange_keys: BTreeMap::new(),
            registration: None,
            session_keys: SessionKeys::new(),
            keyloads: BTreeMap::new(),
            seen: BTreeMap::new(),
        }
    }

    pub(crate) fn require_channel(&self) -> Result<ChannelInfo> {
        self.channel.ok_or(ChannelError::UnboundChannel)
    }

    /// Bind to an announced channel and register its author.
    pub(crate) fn bind(&mut self, info: ChannelInfo) {
        self.links.bind(info.id);
        self.sequencing = SequencingStore::new(info.branching);
        self.sequencing.register(
            Identifier::Ed25519(info.author),
            Cursor::start(info.announce),
        );
        self.exchange_keys.insert(info.author, info.author_exchange_key);
        self.channel = Some(info);
    }

    /// Start tracking `identifier` from the announcement.
    pub(crate) fn track(&mut self, identifier: Identifier) -> Result<()> {
        let info = self.require_channel()?;
        self.sequencing.register(identifier, Cursor::start(info.announce));
        Ok(())
    }

    pub(crate) fn learn_participant(
        &mut self,
        public_key: Ed25519PublicKey,
        exchange_key: X25519PublicKey,
    ) -> Result<()> {
        self.exchange_keys.insert(public_key, exchange_key);
        self.track(Identifier::Ed25519(public_key))
    }

    pub(crate) fn add_subscriber(
        &mut self,
        public_key: Ed25519PublicKey,
        exchange_key: X25519PublicKey,
    ) -> Result<()> {
        self.learn_participant(public_key, exchange_key)?;
        self.subscribers.insert(public_key);
        Ok(())
    }

    /// Whether the frame at `link` was processed before. A different frame
    /// at a processed link is a conflict.
    pub(crate) fn check_seen(&self, link: &Link, digest: &Blake3Hash) -> Result<bool> {
        match self.seen.get(link) {
            None => Ok(false),
            Some(known) if known == digest => Ok(true),
            Some(known) => {
                tracing::warn!(
                    %link,
                    known = %known.to_hex(),
                    received = %digest.to_hex(),
                    "different frame at processed link"
                );
                Err(ChannelError::LinkConflict(*link))
            }
        }
    }

    pub(crate) fn mark_seen(&mut self, link: Link, digest: Blake3Hash) {
        self.seen.insert(link, digest);
    }

    /// Remember which keyload governs the content message `header`
    /// describes.
    pub(crate) fn record_keyload(&mut self, header: &FrameHeader) {
        let keyload = match header.kind {
            MessageKind::Keyload => Some(header.link),
            _ => header.keyload,
        };
        if let Some(keyload) = keyload {
            self.keyloads.insert(header.link, keyload);
        }
    }

    /// The keyload a message linked to `link_to` must be sealed under.
    pub(crate) fn keyload_for(&self, link_to: &Link) -> Result<Link> {
        self.keyloads.get(link_to).copied().ok_or_else(|| {
            ChannelError::NoAccess(format!("{} is not governed by a known keyload", link_to))
        })
    }

    /// Check that a content frame sits at the address its header implies.
    pub(crate) fn verify_placement(&self, header: &FrameHeader) -> Result<()> {
        let previous = header
            .previous
            .ok_or_else(|| ChannelError::Malformed("content without previous link".into()))?;
        let expected = match self.sequencing.mode() {
            BranchingMode::SingleBranch => self.links.chain_link(&previous, header.seq)?,
            BranchingMode::MultiBranch => {
                self.links.branch_link(&previous, &header.sender, header.seq)?
            }
            BranchingMode::SingleDepth => self.links.next_link(&header.sender, header.seq)?,
        };
        if expected != header.link {
            return Err(ChannelError::Malformed(format!(
                "{:?} at {} is not at its derived address",
                header.kind, header.link
            )));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn to_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            channel: self.channel,
            sequencing: self.sequencing.clone(),
            subscribers: self.subscribers.iter().copied().collect(),
            exchange_keys: self
                .exchange_keys
                .iter()
                .map(|(pk, xk)| (*pk, *xk))
                .collect(),
            registration: self.registration,
            session_keys: self.session_keys.export(),
            keyloads: self.keyloads.iter().map(|(l, k)| (*l, *k)).collect(),
            seen: self.seen.iter().map(|(l, d)| (*l, *d)).collect(),
        }
    }

    pub(crate) fn from_snapshot(snapshot: &StateSnapshot) -> Self {
        let links = match &snapshot.channel {
            Some(info) => LinkGenerator::bound(info.id),
            None => LinkGenerator::new(),
        };
        Self {
            links,
            channel: snapshot.channel,
            sequencing: snapshot.sequencing.clone(),
            subscribers: snapshot.subscribers.iter().copied().collect(),
            exchange_keys: snapshot.exchange_keys.iter().copied().collect(),
            registration: snapshot.registration,
            session_keys: SessionKeys::import(&snapshot.session_keys),
            keyloads: snapshot.keyloads.iter().copied().collect(),
            seen: snapshot.seen.iter().copied().collect(),
        }
    }
}

/// Serializable form of [`SessionState`].
#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct StateSnapshot {
    pub(crate) channel: Option<ChannelInfo>,
    pub(crate) sequencing: SequencingStore,
    pub(crate) subscribers: Vec<Ed25519PublicKey>,
    pub(crate) exchange_keys: Vec<(Ed25519PublicKey, X25519PublicKey)>,
    pub(crate) registration: Option<Link>,
    pub(crate) session_keys: SessionKeysSnapshot,
    pub(crate) keyloads: Vec<(Link, Link)>,
    pub(crate) seen: Vec<(Link, Blake3Hash)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use plait_core::{EncryptionKey, Identity, MsgId};

    fn bound_state(mode: BranchingMode) -> (SessionState, ChannelInfo) {
        let author = Identity::generate(b"state author").unwrap();
        let mut links = LinkGenerator::new();
        let announce = links.channel_root(&author.public_key(), 0);
        let info = ChannelInfo {
            id: announce.channel,
            announce,
            author: author.public_key(),
            author_exchange_key: author.exchange_public_key(),
            branching: mode,
        };
        let mut state = SessionState::new();
        state.bind(info);
        (state, info)
    }

    #[test]
    fn test_bind_registers_author() {
        let (state, info) = bound_state(BranchingMode::MultiBranch);
        let author = Identifier::Ed25519(info.author);
        assert_eq!(state.sequencing.cursor_for(&author), Some(Cursor::start(info.announce)));
        assert_eq!(state.sequencing.mode(), BranchingMode::MultiBranch);
        assert_eq!(state.links.announce_link().unwrap(), info.announce);
    }

    #[test]
    fn test_seen_conflict() {
        let (mut state, info) = bound_state(BranchingMode::SingleBranch);
        let digest = Blake3Hash::hash(b"frame");
        assert!(!state.check_seen(&info.announce, &digest).unwrap());

        state.mark_seen(info.announce, digest);
        assert!(state.check_seen(&info.announce, &digest).unwrap());
        assert!(matches!(
            state.check_seen(&info.announce, &Blake3Hash::hash(b"other")),
            Err(ChannelError::LinkConflict(_))
        ));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let (mut state, info) = bound_state(BranchingMode::SingleDepth);
        let reader = Identity::generate(b"reader").unwrap();
        state
            .add_subscriber(reader.public_key(), reader.exchange_public_key())
            .unwrap();
        let keyload = Link::new(info.id, MsgId([5; 32]));
        state.session_keys.adopt(keyload, EncryptionKey::from_bytes([5; 32]));
        state.mark_seen(keyload, Blake3Hash::hash(b"keyload"));
        let packet = Link::new(info.id, MsgId([6; 32]));
        state.keyloads.insert(keyload, keyload);
        state.keyloads.insert(packet, keyload);

        let restored = SessionState::from_snapshot(&state.to_snapshot());
        assert_eq!(restored.keyload_for(&packet).unwrap(), keyload);
        assert_eq!(restored.channel, state.channel);
        assert_eq!(restored.sequencing, state.sequencing);
        assert_eq!(restored.subscribers, state.subscribers);
        assert_eq!(restored.seen, state.seen);
        assert_eq!(restored.session_keys.current().map(|(l, _)| l), Some(keyload));
        assert_eq!(restored.links.channel(), Some(info.id));
    }

    #[test]
    fn test_keyload_resolution() {
        let (mut state, info) = bound_state(BranchingMode::SingleDepth);
        let author = Identifier::Ed25519(info.author);
        let keyload = state.links.next_link(&author, 1).unwrap();
        let packet = state.links.next_link(&author, 2).unwrap();
        let mut header = FrameHeader {
            version: 0,
            kind: MessageKind::Keyload,
            link: keyload,
            previous: Some(info.announce),
            sender: author,
            seq: 1,
            keyload: None,
            signed: true,
            encrypted: false,
        };
        state.record_keyload(&header);
        header.kind = MessageKind::SignedPacket;
        header.link = packet;
        header.seq = 2;
        header.keyload = Some(keyload);
        state.record_keyload(&header);

        assert_eq!(state.keyload_for(&keyload).unwrap(), keyload);
        assert_eq!(state.keyload_for(&packet).unwrap(), keyload);
        assert!(matches!(
            state.keyload_for(&info.announce),
            Err(ChannelError::NoAccess(_))
        ));
    }

    #[test]
    fn test_placement_checks_derived_address() {
        let (state, info) = bound_state(BranchingMode::SingleDepth);
        let author = Identifier::Ed25519(info.author);
        let link = state.links.next_link(&author, 1).unwrap();
        let mut header = FrameHeader {
            version: 0,
            kind: MessageKind::SignedPacket,
            link,
            previous: Some(info.announce),
            sender: author,
            seq: 1,
            keyload: None,
            signed: true,
            encrypted: false,
        };
        state.verify_placement(&header).unwrap();

        header.seq = 2;
        assert!(matches!(
            state.verify_placement(&header),
            Err(ChannelError::Malformed(_))
        ));
    }
}
