//! Session key history.
//!
//! Every keyload a user could open leaves its key here, indexed by the
//! keyload's link. Masked payloads name the keyload they were sealed under,
//! so older messages stay readable after the key rotates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use plait_core::{EncryptionKey, Link};

/// Session keys known to a user.
#[derive(Debug, Clone, Default)]
pub struct SessionKeys {
    keys: BTreeMap<Link, EncryptionKey>,
    /// The keyload whose key new messages are sealed under.
    current: Option<Link>,
}

impl SessionKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the key of the keyload at `link` and make it current.
    pub fn adopt(&mut self, link: Link, key: EncryptionKey) {
        self.keys.insert(link, key);
        self.current = Some(link);
    }

    /// Store a key without touching the current selection.
    pub fn insert(&mut self, link: Link, key: EncryptionKey) {
        self.keys.insert(link, key);
    }

    pub fn get(&self, link: &Link) -> Option<&EncryptionKey> {
        self.keys.get(link)
    }

    pub fn contains(&self, link: &Link) -> bool {
        self.keys.contains_key(link)
    }

    /// The current keyload link and its key.
    pub fn current(&self) -> Option<(Link, &EncryptionKey)> {
        let link = self.current?;
        self.keys.get(&link).map(|key| (link, key))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.current = None;
    }

    /// Flatten for persistence.
    pub fn export(&self) -> SessionKeysSnapshot {
        SessionKeysSnapshot {
            entries: self
                .keys
                .iter()
                .map(|(link, key)| SessionKeyEntry {
                    link: *link,
                    key: *key.as_bytes(),
                })
                .collect(),
            current: self.current,
        }
    }

    /// Rebuild from a snapshot. A `current` link with no matching entry is
    /// dropped.
    pub fn import(snapshot: &SessionKeysSnapshot) -> Self {
        let keys: BTreeMap<_, _> = snapshot
            .entries
            .iter()
            .map(|entry| (entry.link, EncryptionKey::from_bytes(entry.key)))
            .collect();
        let current = snapshot.current.filter(|link| keys.contains_key(link));
        Self { keys, current }
    }
}

/// Serializable form of [`SessionKeys`].
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeysSnapshot {
    pub entries: Vec<SessionKeyEntry>,
    #[zeroize(skip)]
    pub current: Option<Link>,
}

#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeyEntry {
    #[zeroize(skip)]
    pub link: Link,
    pub key: [u8; 32],
}

#[cfg(test)]
mod tests {
    use super::*;
    use plait_core::{ChannelId, MsgId};

    fn link(n: u8) -> Link {
        Link::new(ChannelId([0; 32]), MsgId([n; 32]))
    }

    #[test]
    fn test_rotation_keeps_history() {
        let mut keys = SessionKeys::new();
        let first = EncryptionKey::from_bytes([1; 32]);
        let second = EncryptionKey::from_bytes([2; 32]);
        keys.adopt(link(1), first.clone());
        keys.adopt(link(2), second.clone());

        assert_eq!(keys.current().map(|(l, _)| l), Some(link(2)));
        assert_eq!(keys.get(&link(1)), Some(&first));
        assert_eq!(keys.get(&link(2)), Some(&second));
    }

    #[test]
    fn test_insert_keeps_current() {
        let mut keys = SessionKeys::new();
        keys.adopt(link(1), EncryptionKey::from_bytes([1; 32]));
        keys.insert(link(0), EncryptionKey::from_bytes([0; 32]));
        assert_eq!(keys.current().map(|(l, _)| l), Some(link(1)));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_export_import() {
        let mut keys = SessionKeys::new();
        keys.adopt(link(1), EncryptionKey::from_bytes([1; 32]));
        keys.adopt(link(2), EncryptionKey::from_bytes([2; 32]));

        let restored = SessionKeys::import(&keys.export());
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.current().map(|(l, _)| l), Some(link(2)));
        assert_eq!(
            restored.get(&link(1)).map(|k| *k.as_bytes()),
            Some([1; 32])
        );
    }

    #[test]
    fn test_import_drops_dangling_current() {
        let snapshot = SessionKeysSnapshot {
            entries: Vec::new(),
            current: Some(link(9)),
        };
        assert!(SessionKeys::import(&snapshot).current().is_none());
    }
}
