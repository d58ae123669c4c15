//! Rebuilding a participant from its seed and the channel's messages.
//!
//! Recovery replays the channel through the transport, so everything it
//! restores has to be derivable from published frames:
//!
//! - the author relearns subscribers from the member lists of its own
//!   keyloads, then drops those whose Unsubscribe message is present;
//! - a subscriber finds its Subscribe message at its fixed first link and
//!   regains session keys by reading the keyloads addressed to it.
//!
//! Subscribers that were admitted but never named in a keyload cannot be
//! rediscovered; the author has to receive their Subscribe messages again.

use plait_core::{Identifier, Link, MessageKind};
use plait_transport::Transport;

use crate::author::Author;
use crate::config::UserConfig;
use crate::error::{ChannelError, Result};
use crate::subscriber::Subscriber;
use crate::user::User;

impl<T: Transport> Author<T> {
    /// Rebuild the author of the channel announced at `announce_link`.
    pub async fn recover(
        seed: &[u8],
        announce_link: &Link,
        config: UserConfig,
        transport: T,
    ) -> Result<Self> {
        let mut user = User::new(seed, config, transport)?;
        let frame = user.fetch_frame(announce_link).await?;
        if frame.sender() != user.identifier() {
            return Err(ChannelError::NotAuthorized(
                "channel was announced by another author".into(),
            ));
        }
        user.apply_announcement(&frame)?;
        user.sync_state().await?;

        let mut author = Self(user);
        author.prune_unsubscribed().await?;
        tracing::info!(
            channel = %announce_link.channel,
            subscribers = author.subscribers().len(),
            "recovered author"
        );
        Ok(author)
    }

    async fn prune_unsubscribed(&mut self) -> Result<()> {
        for public_key in self.subscribers() {
            let subscriber = Identifier::Ed25519(public_key);
            let registration = self.0.state.links.next_link(&subscriber, 0)?;
            let link = self.0.state.links.branch_link(&registration, &subscriber, 0)?;
            if let Some(frame) = self.0.try_fetch_frame(&link).await? {
                self.0.apply_unsubscribe(&frame)?;
            }
        }
        Ok(())
    }
}

impl<T: Transport> Subscriber<T> {
    /// Rebuild a subscriber of the channel announced at `announce_link`.
    ///
    /// A subscriber that has since unsubscribed comes back unbound.
    pub async fn recover(
        seed: &[u8],
        announce_link: &Link,
        config: UserConfig,
        transport: T,
    ) -> Result<Self> {
        let mut user = User::new(seed, config, transport)?;
        let frame = user.fetch_frame(announce_link).await?;
        user.apply_announcement(&frame)?;
        if user.is_channel_author() {
            return Err(ChannelError::NotAuthorized(
                "seed belongs to the channel author".into(),
            ));
        }

        let me = user.identifier();
        let registration = user.state.links.next_link(&me, 0)?;
        if let Some(frame) = user.try_fetch_frame(&registration).await? {
            if frame.kind() == MessageKind::Subscribe && frame.sender() == me {
                let unsubscribe = user.state.links.branch_link(&registration, &me, 0)?;
                if user.try_fetch_frame(&unsubscribe).await?.is_some() {
                    user.purge();
                    tracing::info!(channel = %announce_link.channel, "recovered unsubscribed user");
                    return Ok(Self(user));
                }
                user.state.registration = Some(registration);
                user.state.track(me)?;
                user.state.mark_seen(registration, frame.digest());
            }
        }

        user.sync_state().await?;
        tracing::info!(channel = %announce_link.channel, status = ?user.status(), "recovered subscriber");
        Ok(Self(user))
    }
}
