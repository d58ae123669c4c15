//! Transport trait: the abstract interface to the ledger.
//!
//! A transport is an append-only map from [`Link`] to frame bytes. Plait
//! never overwrites a link; implementations must keep the first frame
//! written to an address and report any later, different frame as a
//! conflict.

use std::sync::Arc;

use async_trait::async_trait;
use plait_core::{Blake3Hash, Link};

use crate::error::Result;

/// Result of sending a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame was stored at the link.
    Stored,
    /// The exact same frame is already stored (idempotent - not an error).
    AlreadyStored,
    /// Conflict: a different frame already occupies the link.
    Conflict {
        /// Blake3 hash of the stored frame bytes.
        existing: Blake3Hash,
    },
}

impl SendOutcome {
    /// True when the frame is now at the link, whoever wrote it first.
    pub fn is_stored(&self) -> bool {
        matches!(self, SendOutcome::Stored | SendOutcome::AlreadyStored)
    }
}

/// The Transport trait: async interface to an addressable ledger.
///
/// All methods are async to support both blocking (SQLite) and networked
/// backends. Implementations must be thread-safe so several users can
/// share one transport.
///
/// # Design Notes
///
/// - **First writer wins**: A second, different frame at an occupied link
///   returns `Conflict` and is discarded.
/// - **Idempotent sends**: Resending identical bytes returns `AlreadyStored`.
/// - **Misses are not errors**: `fetch` returns `None` for an empty link.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Store `frame` at `link`.
    async fn send(&self, link: &Link, frame: &[u8]) -> Result<SendOutcome>;

    /// Read the frame stored at `link`, if any.
    async fn fetch(&self, link: &Link) -> Result<Option<Vec<u8>>>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, link: &Link, frame: &[u8]) -> Result<SendOutcome> {
        (**self).send(link, frame).await
    }

    async fn fetch(&self, link: &Link) -> Result<Option<Vec<u8>>> {
        (**self).fetch(link).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for &T {
    async fn send(&self, link: &Link, frame: &[u8]) -> Result<SendOutcome> {
        (**self).send(link, frame).await
    }

    async fn fetch(&self, link: &Link) -> Result<Option<Vec<u8>>> {
        (**self).fetch(link).await
    }
}

/// Compare a new frame against the one already at a link.
pub(crate) fn compare(existing: &[u8], frame: &[u8]) -> SendOutcome {
    if existing == frame {
        SendOutcome::AlreadyStored
    } else {
        SendOutcome::Conflict {
            existing: Blake3Hash::hash(existing),
        }
    }
}
