//! The channel author.

use std::ops::{Deref, DerefMut};

use plait_core::{Ed25519PublicKey, Identifier, Link, X25519PublicKey};
use plait_keyload::Recipients;
use plait_transport::Transport;

use crate::config::UserConfig;
use crate::error::{ChannelError, Result};
use crate::message::SendResponse;
use crate::user::User;

/// Creates a channel, admits subscribers and distributes session keys.
///
/// Derefs to [`User`] for publishing and reading.
#[derive(Debug)]
pub struct Author<T>(pub(crate) User<T>);

impl<T: Transport> Author<T> {
    /// Create an author whose keys are derived from `seed`.
    pub fn new(seed: &[u8], config: UserConfig, transport: T) -> Result<Self> {
        Ok(Self(User::new(seed, config, transport)?))
    }

    /// Publish the channel's Announce message and bind to the channel.
    pub async fn send_announce(&mut self) -> Result<Link> {
        self.0.announce().await
    }

    /// Admit the subscriber whose Subscribe message is at `link`.
    pub async fn receive_subscribe(&mut self, link: &Link) -> Result<Identifier> {
        self.0.require_authority("accept subscriptions")?;
        let frame = self.0.fetch_frame(link).await?;
        self.0.apply_subscribe(&frame)
    }

    /// Drop the subscriber whose Unsubscribe message is at `link`.
    pub async fn receive_unsubscribe(&mut self, link: &Link) -> Result<Identifier> {
        self.0.require_authority("process unsubscriptions")?;
        let frame = self.0.fetch_frame(link).await?;
        self.0.apply_unsubscribe(&frame)
    }

    /// Admit a subscriber known out of band.
    pub fn store_new_subscriber(
        &mut self,
        public_key: Ed25519PublicKey,
        exchange_key: X25519PublicKey,
    ) -> Result<()> {
        self.0.require_authority("admit subscribers")?;
        self.0.state.add_subscriber(public_key, exchange_key)?;
        tracing::info!(subscriber = %Identifier::Ed25519(public_key), "stored subscriber");
        Ok(())
    }

    /// Stop including a subscriber in keyloads. Returns whether it was one.
    pub fn remove_subscriber(&mut self, public_key: &Ed25519PublicKey) -> Result<bool> {
        self.0.require_authority("remove subscribers")?;
        let removed = self.0.state.subscribers.remove(public_key);
        if removed {
            tracing::info!(subscriber = %Identifier::Ed25519(*public_key), "removed subscriber");
        }
        Ok(removed)
    }

    /// Accepted subscribers, in key order.
    pub fn subscribers(&self) -> Vec<Ed25519PublicKey> {
        self.0.state.subscribers.iter().copied().collect()
    }

    /// Publish a keyload readable by exactly `recipients` (and the author).
    ///
    /// Public keys must belong to known participants; PSKs must be held.
    pub async fn send_keyload(
        &mut self,
        link_to: &Link,
        recipients: &[Identifier],
    ) -> Result<SendResponse> {
        self.0.require_authority("issue keyloads")?;
        let mut set = Recipients::new();
        for recipient in recipients {
            match recipient {
                Identifier::Ed25519(public_key) => {
                    let exchange_key = self
                        .0
                        .state
                        .exchange_keys
                        .get(public_key)
                        .copied()
                        .ok_or(ChannelError::UnknownRecipient(*recipient))?;
                    set.add_member(*public_key, exchange_key);
                }
                Identifier::Psk(id) => {
                    if self.0.identity().psk(id).is_none() {
                        return Err(ChannelError::UnknownRecipient(*recipient));
                    }
                    set.add_psk(*id);
                }
            }
        }
        self.0.send_keyload_to(link_to, set).await
    }

    /// Publish a keyload for every subscriber and every held PSK.
    pub async fn send_keyload_for_everyone(&mut self, link_to: &Link) -> Result<SendResponse> {
        let mut recipients: Vec<Identifier> = self
            .0
            .state
            .subscribers
            .iter()
            .map(|pk| Identifier::Ed25519(*pk))
            .collect();
        recipients.extend(self.0.psk_ids().into_iter().map(Identifier::Psk));
        self.send_keyload(link_to, &recipients).await
    }
}

impl<T> Deref for Author<T> {
    type Target = User<T>;

    fn deref(&self) -> &User<T> {
        &self.0
    }
}

impl<T> DerefMut for Author<T> {
    fn deref_mut(&mut self) -> &mut User<T> {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plait_core::Identity;
    use plait_transport::MemoryTransport;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_subscriber_management_needs_authority() {
        let ledger = Arc::new(MemoryTransport::new());
        let reader = Identity::generate(b"reader").unwrap();

        let mut unbound = Author::new(b"unbound", UserConfig::default(), ledger.clone()).unwrap();
        assert!(matches!(
            unbound.remove_subscriber(&reader.public_key()),
            Err(ChannelError::UnboundChannel)
        ));

        let mut owner = Author::new(b"owner", UserConfig::default(), ledger.clone()).unwrap();
        let announce = owner.send_announce().await.unwrap();
        owner
            .store_new_subscriber(reader.public_key(), reader.exchange_public_key())
            .unwrap();

        // An author bound to someone else's channel has no say over it.
        let mut outsider = Author::new(b"outsider", UserConfig::default(), ledger).unwrap();
        outsider.receive_msg(&announce).await.unwrap();
        outsider.0.state.subscribers.insert(reader.public_key());
        assert!(matches!(
            outsider.remove_subscriber(&reader.public_key()),
            Err(ChannelError::NotAuthorized(_))
        ));
        assert_eq!(outsider.subscribers(), vec![reader.public_key()]);

        assert!(owner.remove_subscriber(&reader.public_key()).unwrap());
        assert!(!owner.remove_subscriber(&reader.public_key()).unwrap());
        assert!(owner.subscribers().is_empty());
    }
}
