//! A channel subscriber.

use std::ops::{Deref, DerefMut};

use plait_core::{FrameBuilder, Link, MessageKind};
use plait_transport::Transport;

use crate::config::UserConfig;
use crate::error::{ChannelError, Result};
use crate::message::Message;
use crate::payload::{self, SubscribePayload};
use crate::user::User;

/// Joins an existing channel.
///
/// Derefs to [`User`] for publishing and reading.
#[derive(Debug)]
pub struct Subscriber<T>(pub(crate) User<T>);

impl<T: Transport> Subscriber<T> {
    /// Create a subscriber whose keys are derived from `seed`.
    pub fn new(seed: &[u8], config: UserConfig, transport: T) -> Result<Self> {
        Ok(Self(User::new(seed, config, transport)?))
    }

    /// Bind to the channel announced at `link`.
    ///
    /// Receiving the same announcement again is a no-op.
    pub async fn receive_announcement(&mut self, link: &Link) -> Result<Message> {
        let frame = self.0.fetch_frame(link).await?;
        self.0.apply_announcement(&frame)
    }

    /// The link of this subscriber's Subscribe message, if it sent one.
    pub fn registration(&self) -> Option<Link> {
        self.0.state.registration
    }

    pub fn is_registered(&self) -> bool {
        self.0.state.registration.is_some()
    }

    /// Ask the author of the bound channel for access.
    pub async fn send_subscribe(&mut self, announce_link: &Link) -> Result<Link> {
        let info = self.0.state.require_channel()?;
        if info.announce != *announce_link {
            return Err(ChannelError::InvalidState(format!(
                "{} is not the announcement of the bound channel",
                announce_link
            )));
        }
        if self.0.state.registration.is_some() {
            return Err(ChannelError::InvalidState("already subscribed".into()));
        }

        let me = self.0.identifier();
        let mut draft = self.0.state.clone();
        let link = draft.links.next_link(&me, 0)?;
        let payload = SubscribePayload {
            exchange_key: self.0.exchange_public_key(),
        };
        let frame = FrameBuilder::new(MessageKind::Subscribe, link)
            .previous(info.announce)
            .public(payload::encode(&payload)?)
            .build(self.0.identity())?;

        draft.registration = Some(link);
        draft.track(me)?;
        draft.mark_seen(link, frame.digest);

        self.0.transmit(&frame).await?;
        self.0.state = draft;
        tracing::info!(%link, channel = %info.id, "subscribed");
        Ok(link)
    }

    /// Publish an Unsubscribe message and forget the channel.
    pub async fn send_unsubscribe(&mut self) -> Result<Link> {
        let info = self.0.state.require_channel()?;
        let registration = self
            .0
            .state
            .registration
            .ok_or_else(|| ChannelError::InvalidState("not subscribed".into()))?;

        let me = self.0.identifier();
        let link = self.0.state.links.branch_link(&registration, &me, 0)?;
        let frame = FrameBuilder::new(MessageKind::Unsubscribe, link)
            .previous(registration)
            .build(self.0.identity())?;

        self.0.transmit(&frame).await?;
        self.0.purge();
        tracing::info!(%link, channel = %info.id, "unsubscribed");
        Ok(link)
    }

    /// Forget the channel without telling the author.
    pub fn unregister(&mut self) {
        self.0.purge();
    }

    /// Rewind every cursor to the announcement so the channel is read
    /// again from the start. Session keys and processed frames are kept.
    pub fn reset_state(&mut self) -> Result<()> {
        let info = self.0.state.require_channel()?;
        self.0.state.sequencing.reset(info.announce);
        Ok(())
    }
}

impl<T> Deref for Subscriber<T> {
    type Target = User<T>;

    fn deref(&self) -> &User<T> {
        &self.0
    }
}

impl<T> DerefMut for Subscriber<T> {
    fn deref_mut(&mut self) -> &mut User<T> {
        &mut self.0
    }
}
