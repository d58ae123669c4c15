//! In-memory implementation of the Transport trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use plait_core::Link;

use crate::error::{Result, TransportError};
use crate::traits::{compare, SendOutcome, Transport};

/// In-memory transport ("bucket").
///
/// All data is lost when the transport is dropped. Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    frames: RwLock<HashMap<Link, Vec<u8>>>,
}

impl MemoryTransport {
    /// Create a new empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Link, Vec<u8>>>> {
        self.frames
            .read()
            .map_err(|e| TransportError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Link, Vec<u8>>>> {
        self.frames
            .write()
            .map_err(|e| TransportError::Unavailable(format!("lock poisoned: {}", e)))
    }

    /// Number of stored frames.
    pub fn len(&self) -> usize {
        self.read().map(|frames| frames.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every occupied link, in no particular order.
    pub fn links(&self) -> Vec<Link> {
        self.read()
            .map(|frames| frames.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Replace the bytes at `link` regardless of what is stored there.
    ///
    /// Bypasses first-writer-wins; simulates a misbehaving ledger.
    pub fn overwrite(&self, link: Link, frame: Vec<u8>) -> Result<()> {
        self.write()?.insert(link, frame);
        Ok(())
    }

    /// Drop the frame at `link`. Returns the removed bytes.
    pub fn remove(&self, link: &Link) -> Result<Option<Vec<u8>>> {
        Ok(self.write()?.remove(link))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, link: &Link, frame: &[u8]) -> Result<SendOutcome> {
        let mut frames = self.write()?;

        if let Some(existing) = frames.get(link) {
            let outcome = compare(existing, frame);
            if let SendOutcome::Conflict { existing } = &outcome {
                tracing::warn!(%link, existing = %existing.to_hex(), "rejected frame at occupied link");
            }
            return Ok(outcome);
        }

        frames.insert(*link, frame.to_vec());
        Ok(SendOutcome::Stored)
    }

    async fn fetch(&self, link: &Link) -> Result<Option<Vec<u8>>> {
        Ok(self.read()?.get(link).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plait_core::{ChannelId, MsgId};

    fn link(n: u8) -> Link {
        Link::new(ChannelId([1; 32]), MsgId([n; 32]))
    }

    #[tokio::test]
    async fn test_send_and_fetch() {
        let transport = MemoryTransport::new();
        let outcome = transport.send(&link(1), b"frame").await.unwrap();
        assert_eq!(outcome, SendOutcome::Stored);

        let fetched = transport.fetch(&link(1)).await.unwrap();
        assert_eq!(fetched.as_deref(), Some(&b"frame"[..]));
        assert!(transport.fetch(&link(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_idempotent_send() {
        let transport = MemoryTransport::new();
        transport.send(&link(1), b"frame").await.unwrap();
        let outcome = transport.send(&link(1), b"frame").await.unwrap();
        assert_eq!(outcome, SendOutcome::AlreadyStored);
        assert_eq!(transport.len(), 1);
    }

    #[tokio::test]
    async fn test_first_writer_wins() {
        let transport = MemoryTransport::new();
        transport.send(&link(1), b"first").await.unwrap();
        let outcome = transport.send(&link(1), b"second").await.unwrap();

        assert!(matches!(outcome, SendOutcome::Conflict { .. }));
        assert!(!outcome.is_stored());
        let fetched = transport.fetch(&link(1)).await.unwrap();
        assert_eq!(fetched.as_deref(), Some(&b"first"[..]));
    }

    #[tokio::test]
    async fn test_overwrite_bypasses_conflict() {
        let transport = MemoryTransport::new();
        transport.send(&link(1), b"first").await.unwrap();
        transport.overwrite(link(1), b"forged".to_vec()).unwrap();

        let fetched = transport.fetch(&link(1)).await.unwrap();
        assert_eq!(fetched.as_deref(), Some(&b"forged"[..]));
        assert_eq!(transport.remove(&link(1)).unwrap().as_deref(), Some(&b"forged"[..]));
        assert!(transport.is_empty());
    }

    #[tokio::test]
    async fn test_shared_through_arc() {
        let transport = std::sync::Arc::new(MemoryTransport::new());
        let other = transport.clone();
        transport.send(&link(3), b"frame").await.unwrap();
        assert!(other.fetch(&link(3)).await.unwrap().is_some());
        assert_eq!(transport.links(), vec![link(3)]);
    }
}
