//! Sequencing: where each publisher's next message lives.
//!
//! A [`Cursor`] holds the last link seen from a publisher and the sequence
//! number its next message will carry. In single-branch channels all
//! publishers share one global cursor (the chain tip); otherwise each
//! publisher has its own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::link::BranchingMode;
use crate::types::{Identifier, Link};

/// The first sequence number a publisher uses. Slot 0 is reserved for
/// subscription messages.
pub const FIRST_SEQ: u64 = 1;

/// Position of a publisher within the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// The most recent link of this chain.
    pub link: Link,
    /// The sequence number of the next message.
    pub seq: u64,
}

impl Cursor {
    pub fn new(link: Link, seq: u64) -> Self {
        Self { link, seq }
    }

    /// A fresh cursor anchored at `link`.
    pub fn start(link: Link) -> Self {
        Self {
            link,
            seq: FIRST_SEQ,
        }
    }
}

/// Result of recording a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordResult {
    /// The message was the next expected one.
    Accepted,
    /// The message skipped ahead; the cursor jumped past the gap.
    AcceptedWithGap,
    /// The message is at or behind the cursor; nothing changed.
    Duplicate,
}

/// Cursor table for every known publisher of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencingStore {
    mode: BranchingMode,
    /// Publishers in registration order.
    order: Vec<Identifier>,
    cursors: BTreeMap<Identifier, Cursor>,
    /// Global chain tip (single-branch only).
    tip: Option<Cursor>,
}

impl SequencingStore {
    pub fn new(mode: BranchingMode) -> Self {
        Self {
            mode,
            order: Vec::new(),
            cursors: BTreeMap::new(),
            tip: None,
        }
    }

    pub fn mode(&self) -> BranchingMode {
        self.mode
    }

    fn shared(&self) -> bool {
        self.mode == BranchingMode::SingleBranch
    }

    /// Register a publisher. Returns false if it was already known.
    ///
    /// In single-branch mode `start` seeds the global tip only when no tip
    /// exists yet.
    pub fn register(&mut self, identifier: Identifier, start: Cursor) -> bool {
        if self.cursors.contains_key(&identifier) {
            return false;
        }
        if self.shared() && self.tip.is_none() {
            self.tip = Some(start);
        }
        self.order.push(identifier);
        self.cursors.insert(identifier, start);
        true
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.cursors.contains_key(identifier)
    }

    /// Forget a publisher.
    pub fn remove(&mut self, identifier: &Identifier) -> Option<Cursor> {
        let removed = self.cursors.remove(identifier)?;
        self.order.retain(|id| id != identifier);
        Some(removed)
    }

    /// The cursor that governs `identifier`'s next message.
    pub fn cursor_for(&self, identifier: &Identifier) -> Option<Cursor> {
        let own = self.cursors.get(identifier)?;
        if self.shared() {
            self.tip
        } else {
            Some(*own)
        }
    }

    /// The global chain tip (single-branch only).
    pub fn tip(&self) -> Option<Cursor> {
        if self.shared() {
            self.tip
        } else {
            None
        }
    }

    fn slot_mut(&mut self, identifier: &Identifier) -> Result<&mut Cursor> {
        if !self.cursors.contains_key(identifier) {
            return Err(CoreError::UnknownPublisher(identifier.to_string()));
        }
        if self.shared() {
            self.tip
                .as_mut()
                .ok_or_else(|| CoreError::UnknownPublisher(identifier.to_string()))
        } else {
            self.cursors
                .get_mut(identifier)
                .ok_or_else(|| CoreError::UnknownPublisher(identifier.to_string()))
        }
    }

    /// Consume the next sequence number of `identifier` for a message
    /// published at `link`. Never hands out the same number twice.
    pub fn advance(&mut self, identifier: &Identifier, link: Link) -> Result<u64> {
        let slot = self.slot_mut(identifier)?;
        let seq = slot.seq;
        let next = seq
            .checked_add(1)
            .ok_or_else(|| CoreError::SequenceExhausted(identifier.to_string()))?;
        *slot = Cursor::new(link, next);
        Ok(seq)
    }

    /// Apply a message received from `identifier`. Registers unknown
    /// publishers; never moves a cursor backwards.
    pub fn record(&mut self, identifier: Identifier, link: Link, seq: u64) -> RecordResult {
        if !self.cursors.contains_key(&identifier) {
            self.register(identifier, Cursor::new(link, FIRST_SEQ));
        }
        let Ok(slot) = self.slot_mut(&identifier) else {
            return RecordResult::Duplicate;
        };
        if seq < slot.seq {
            return RecordResult::Duplicate;
        }
        let result = if seq == slot.seq {
            RecordResult::Accepted
        } else {
            RecordResult::AcceptedWithGap
        };
        *slot = Cursor::new(link, seq.saturating_add(1));
        result
    }

    /// All publishers with their governing cursor, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (Identifier, Cursor)> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.cursor_for(id).map(|cursor| (*id, cursor)))
    }

    pub fn identifiers(&self) -> &[Identifier] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Rewind every cursor to the start of the channel at `anchor`.
    pub fn reset(&mut self, anchor: Link) {
        for cursor in self.cursors.values_mut() {
            *cursor = Cursor::start(anchor);
        }
        if self.shared() {
            self.tip = Some(Cursor::start(anchor));
        }
    }

    /// Drop every publisher.
    pub fn clear(&mut self) {
        self.order.clear();
        self.cursors.clear();
        self.tip = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519PublicKey;
    use crate::types::{ChannelId, MsgId};

    fn id(n: u8) -> Identifier {
        Identifier::Ed25519(Ed25519PublicKey([n; 32]))
    }

    fn link(n: u8) -> Link {
        Link::new(ChannelId([0; 32]), MsgId([n; 32]))
    }

    #[test]
    fn test_advance_never_repeats() {
        let mut store = SequencingStore::new(BranchingMode::MultiBranch);
        store.register(id(1), Cursor::start(link(0)));

        let a = store.advance(&id(1), link(1)).unwrap();
        let b = store.advance(&id(1), link(2)).unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(store.cursor_for(&id(1)), Some(Cursor::new(link(2), 3)));
    }

    #[test]
    fn test_single_branch_shares_tip() {
        let mut store = SequencingStore::new(BranchingMode::SingleBranch);
        store.register(id(1), Cursor::start(link(0)));
        store.register(id(2), Cursor::start(link(9)));

        assert_eq!(store.advance(&id(1), link(1)).unwrap(), 1);
        assert_eq!(store.advance(&id(2), link(2)).unwrap(), 2);
        assert_eq!(store.tip(), Some(Cursor::new(link(2), 3)));
        assert_eq!(store.cursor_for(&id(1)), store.cursor_for(&id(2)));
    }

    #[test]
    fn test_record_never_decreases() {
        let mut store = SequencingStore::new(BranchingMode::SingleDepth);
        store.register(id(1), Cursor::start(link(0)));

        assert_eq!(store.record(id(1), link(1), 1), RecordResult::Accepted);
        assert_eq!(store.record(id(1), link(4), 4), RecordResult::AcceptedWithGap);
        assert_eq!(store.record(id(1), link(2), 2), RecordResult::Duplicate);
        assert_eq!(store.cursor_for(&id(1)), Some(Cursor::new(link(4), 5)));
    }

    #[test]
    fn test_record_registers_unknown_publisher() {
        let mut store = SequencingStore::new(BranchingMode::MultiBranch);
        store.record(id(3), link(3), 1);
        assert!(store.contains(&id(3)));
        assert_eq!(store.identifiers(), &[id(3)]);
    }

    #[test]
    fn test_unknown_publisher_cannot_advance() {
        let mut store = SequencingStore::new(BranchingMode::MultiBranch);
        assert!(matches!(
            store.advance(&id(1), link(1)),
            Err(CoreError::UnknownPublisher(_))
        ));
    }

    #[test]
    fn test_iteration_follows_registration_order() {
        let mut store = SequencingStore::new(BranchingMode::MultiBranch);
        for n in [5, 2, 9] {
            store.register(id(n), Cursor::start(link(0)));
        }
        assert!(!store.register(id(2), Cursor::start(link(1))));
        let order: Vec<_> = store.iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![id(5), id(2), id(9)]);

        store.remove(&id(2));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_reset_rewinds_cursors() {
        let mut store = SequencingStore::new(BranchingMode::SingleBranch);
        store.register(id(1), Cursor::start(link(0)));
        store.advance(&id(1), link(1)).unwrap();
        store.reset(link(0));
        assert_eq!(store.tip(), Some(Cursor::start(link(0))));
    }
}
