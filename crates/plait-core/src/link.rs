//! Deterministic link derivation.
//!
//! Every address in a channel is a Blake3 derive-key hash of public inputs,
//! so any participant who knows the channel, a publisher and a sequence
//! number computes the same [`Link`] without asking anyone.

use serde::{Deserialize, Serialize};

use crate::crypto::{derive_key, Ed25519PublicKey};
use crate::error::{CoreError, Result};
use crate::types::{ChannelId, Identifier, Link, MsgId};

/// How publishers' messages are arranged within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BranchingMode {
    /// One global hash chain shared by all publishers.
    #[default]
    SingleBranch,
    /// One chain per publisher; content is located through Sequence messages.
    MultiBranch,
    /// Every message hangs directly off the announcement, addressed by
    /// publisher and sequence number.
    SingleDepth,
}

impl BranchingMode {
    pub fn to_u8(self) -> u8 {
        match self {
            BranchingMode::SingleBranch => 0,
            BranchingMode::MultiBranch => 1,
            BranchingMode::SingleDepth => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(BranchingMode::SingleBranch),
            1 => Some(BranchingMode::MultiBranch),
            2 => Some(BranchingMode::SingleDepth),
            _ => None,
        }
    }

    /// Whether content messages are preceded by Sequence messages.
    pub fn uses_sequence_messages(self) -> bool {
        matches!(self, BranchingMode::MultiBranch)
    }
}

impl ChannelId {
    /// Derive a channel id from the author's key and a channel index.
    pub fn derive(author: &Ed25519PublicKey, index: u64) -> Self {
        Self(derive_key(
            "plait-link-v0 channel",
            &[author.as_bytes(), &index.to_be_bytes()],
        ))
    }
}

/// Produces links for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkGenerator {
    channel: Option<ChannelId>,
}

impl LinkGenerator {
    /// A generator not yet bound to any channel.
    pub fn new() -> Self {
        Self { channel: None }
    }

    /// A generator bound to `channel`.
    pub fn bound(channel: ChannelId) -> Self {
        Self {
            channel: Some(channel),
        }
    }

    /// Derive the channel's announcement link and bind to the channel.
    pub fn channel_root(&mut self, author: &Ed25519PublicKey, index: u64) -> Link {
        let channel = ChannelId::derive(author, index);
        self.channel = Some(channel);
        announce_link(channel)
    }

    /// Bind to a channel learned from an announcement.
    pub fn bind(&mut self, channel: ChannelId) {
        self.channel = Some(channel);
    }

    pub fn unbind(&mut self) {
        self.channel = None;
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    fn require_channel(&self) -> Result<ChannelId> {
        self.channel.ok_or(CoreError::UnboundChannel)
    }

    /// The announcement link of the bound channel.
    pub fn announce_link(&self) -> Result<Link> {
        Ok(announce_link(self.require_channel()?))
    }

    /// The `seq`-th slot of `identifier`.
    pub fn next_link(&self, identifier: &Identifier, seq: u64) -> Result<Link> {
        let channel = self.require_channel()?;
        let msg = derive_key(
            "plait-link-v0 slot",
            &[channel.as_bytes(), &identifier.to_bytes(), &seq.to_be_bytes()],
        );
        Ok(Link::new(channel, MsgId(msg)))
    }

    /// The single-branch successor of `previous` at global sequence `seq`.
    ///
    /// Independent of the publisher: two publishers extending the same tip
    /// collide on the same address.
    pub fn chain_link(&self, previous: &Link, seq: u64) -> Result<Link> {
        let channel = self.require_channel()?;
        let msg = derive_key(
            "plait-link-v0 chain",
            &[channel.as_bytes(), previous.msg.as_bytes(), &seq.to_be_bytes()],
        );
        Ok(Link::new(channel, MsgId(msg)))
    }

    /// A publisher-specific successor of `previous`.
    pub fn branch_link(&self, previous: &Link, identifier: &Identifier, seq: u64) -> Result<Link> {
        let channel = self.require_channel()?;
        let msg = derive_key(
            "plait-link-v0 branch",
            &[
                channel.as_bytes(),
                previous.msg.as_bytes(),
                &identifier.to_bytes(),
                &seq.to_be_bytes(),
            ],
        );
        Ok(Link::new(channel, MsgId(msg)))
    }
}

fn announce_link(channel: ChannelId) -> Link {
    Link::new(
        channel,
        MsgId(derive_key("plait-link-v0 announce", &[channel.as_bytes()])),
    )
}
