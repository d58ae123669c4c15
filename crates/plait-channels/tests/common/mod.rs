#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use plait_channels::{Author, BranchingMode, Link, Subscriber, UserConfig};
use plait_transport::{MemoryTransport, SendOutcome, Transport, TransportError};

pub type Ledger = Arc<MemoryTransport>;

pub struct Channel {
    pub ledger: Ledger,
    pub author: Author<Ledger>,
    pub announce: Link,
}

pub async fn announce(mode: BranchingMode) -> Channel {
    let ledger: Ledger = Arc::new(MemoryTransport::new());
    let config = UserConfig::default().with_branching(mode);
    let mut author = Author::new(b"author seed", config, ledger.clone()).unwrap();
    let announce = author.send_announce().await.unwrap();
    Channel {
        ledger,
        author,
        announce,
    }
}

impl Channel {
    /// A subscriber the author has accepted.
    pub async fn subscriber(&mut self, seed: &[u8]) -> Subscriber<Ledger> {
        let mut subscriber = self.joined(seed).await;
        let link = subscriber.send_subscribe(&self.announce).await.unwrap();
        self.author.receive_subscribe(&link).await.unwrap();
        subscriber
    }

    /// A subscriber bound to the channel that has not subscribed.
    pub async fn joined(&self, seed: &[u8]) -> Subscriber<Ledger> {
        let mut subscriber =
            Subscriber::new(seed, UserConfig::default(), self.ledger.clone()).unwrap();
        subscriber.receive_announcement(&self.announce).await.unwrap();
        subscriber
    }
}

/// A ledger connection that fails one chosen send.
pub struct Flaky {
    inner: Ledger,
    countdown: AtomicUsize,
    store_failed: AtomicUsize,
}

impl Flaky {
    pub fn new(inner: Ledger) -> Arc<Self> {
        Arc::new(Self {
            inner,
            countdown: AtomicUsize::new(0),
            store_failed: AtomicUsize::new(0),
        })
    }

    /// Fail the `n`th send from now. With `stored` the frame reaches the
    /// ledger and only the reply is lost.
    pub fn fail_send(&self, n: usize, stored: bool) {
        self.store_failed.store(stored as usize, Ordering::SeqCst);
        self.countdown.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for Flaky {
    async fn send(&self, link: &Link, frame: &[u8]) -> plait_transport::Result<SendOutcome> {
        let left = self.countdown.load(Ordering::SeqCst);
        if left > 0 {
            self.countdown.store(left - 1, Ordering::SeqCst);
            if left == 1 {
                if self.store_failed.load(Ordering::SeqCst) == 1 {
                    self.inner.send(link, frame).await?;
                }
                return Err(TransportError::Unavailable("connection reset".into()));
            }
        }
        self.inner.send(link, frame).await
    }

    async fn fetch(&self, link: &Link) -> plait_transport::Result<Option<Vec<u8>>> {
        self.inner.fetch(link).await
    }
}

/// An author publishing through a [`Flaky`] connection, with one accepted
/// subscriber reading the same ledger.
pub async fn flaky_channel(
    mode: BranchingMode,
) -> (Arc<Flaky>, Author<Arc<Flaky>>, Subscriber<Ledger>, Link) {
    let ledger: Ledger = Arc::new(MemoryTransport::new());
    let flaky = Flaky::new(ledger.clone());
    let config = UserConfig::default().with_branching(mode);
    let mut author = Author::new(b"author seed", config, flaky.clone()).unwrap();
    let announce = author.send_announce().await.unwrap();

    let mut subscriber = Subscriber::new(b"reader", UserConfig::default(), ledger).unwrap();
    subscriber.receive_announcement(&announce).await.unwrap();
    let link = subscriber.send_subscribe(&announce).await.unwrap();
    author.receive_subscribe(&link).await.unwrap();
    (flaky, author, subscriber, announce)
}
