//! Test fixtures and helpers.
//!
//! Common channel setup for integration tests.

use std::sync::Arc;

use plait_channels::{
    Author, BranchingMode, Link, SendResponse, Subscriber, UserConfig,
};
use plait_transport::MemoryTransport;

/// Shared in-memory ledger.
pub type Ledger = Arc<MemoryTransport>;

/// An announced channel on a fresh in-memory ledger.
pub struct ChannelFixture {
    pub ledger: Ledger,
    pub author: Author<Ledger>,
    pub announce: Link,
}

impl ChannelFixture {
    /// Announce a channel with the given branching mode.
    pub async fn new(mode: BranchingMode) -> anyhow::Result<Self> {
        Self::with_seed(b"fixture author", mode).await
    }

    /// Announce a channel from a specific author seed.
    pub async fn with_seed(seed: &[u8], mode: BranchingMode) -> anyhow::Result<Self> {
        let ledger: Ledger = Arc::new(MemoryTransport::new());
        let config = UserConfig::default().with_branching(mode);
        let mut author = Author::new(seed, config, ledger.clone())?;
        let announce = author.send_announce().await?;
        Ok(Self {
            ledger,
            author,
            announce,
        })
    }

    /// A subscriber bound to the channel that has not subscribed.
    pub async fn reader(&self, seed: &[u8]) -> anyhow::Result<Subscriber<Ledger>> {
        let mut subscriber = Subscriber::new(seed, UserConfig::default(), self.ledger.clone())?;
        subscriber.receive_announcement(&self.announce).await?;
        Ok(subscriber)
    }

    /// A subscriber the author has accepted.
    pub async fn subscriber(&mut self, seed: &[u8]) -> anyhow::Result<Subscriber<Ledger>> {
        let mut subscriber = self.reader(seed).await?;
        let link = subscriber.send_subscribe(&self.announce).await?;
        self.author.receive_subscribe(&link).await?;
        Ok(subscriber)
    }

    /// Accepted subscribers from [`party_seeds`].
    pub async fn subscribers(&mut self, count: usize) -> anyhow::Result<Vec<Subscriber<Ledger>>> {
        let mut subscribers = Vec::with_capacity(count);
        for seed in party_seeds(count) {
            subscribers.push(self.subscriber(&seed).await?);
        }
        Ok(subscribers)
    }

    /// Issue a keyload for every subscriber.
    pub async fn open_session(&mut self) -> anyhow::Result<SendResponse> {
        Ok(self
            .author
            .send_keyload_for_everyone(&self.announce)
            .await?)
    }
}

/// Distinct deterministic seeds for multi-party tests.
pub fn party_seeds(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("party {}", i).into_bytes())
        .collect()
}

/// Route `tracing` output to the test harness. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_session() {
        init_tracing();
        let mut fixture = ChannelFixture::new(BranchingMode::MultiBranch).await.unwrap();
        let mut subscribers = fixture.subscribers(3).await.unwrap();
        assert_eq!(fixture.author.subscribers().len(), 3);

        let keyload = fixture.open_session().await.unwrap();
        for subscriber in &mut subscribers {
            let messages = subscriber.sync_state().await.unwrap();
            assert_eq!(messages[0].link, keyload.link);
            assert!(messages[0].is_readable());
        }
    }

    #[test]
    fn test_party_seeds_distinct() {
        let seeds = party_seeds(4);
        for (i, a) in seeds.iter().enumerate() {
            for b in &seeds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
