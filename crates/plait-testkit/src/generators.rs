//! Proptest generators for property-based testing.

use proptest::prelude::*;

use plait_core::{
    BranchingMode, ChannelId, FrameBuilder, Identifier, Identity, Link, MessageKind, MsgId,
    WrappedFrame,
};

/// Generate an identity from a random seed.
pub fn identity() -> impl Strategy<Value = Identity> {
    any::<[u8; 32]>().prop_filter_map("valid seed", |seed| Identity::generate(&seed).ok())
}

pub fn channel_id() -> impl Strategy<Value = ChannelId> {
    any::<[u8; 32]>().prop_map(ChannelId)
}

/// Generate a link on a random channel.
pub fn link() -> impl Strategy<Value = Link> {
    (channel_id(), any::<[u8; 32]>()).prop_map(|(channel, msg)| Link::new(channel, MsgId(msg)))
}

/// Generate a link on `channel`.
pub fn link_in(channel: ChannelId) -> impl Strategy<Value = Link> {
    any::<[u8; 32]>().prop_map(move |msg| Link::new(channel, MsgId(msg)))
}

pub fn identifier() -> impl Strategy<Value = Identifier> {
    identity().prop_map(|identity| identity.identifier())
}

pub fn branching_mode() -> impl Strategy<Value = BranchingMode> {
    prop_oneof![
        Just(BranchingMode::SingleBranch),
        Just(BranchingMode::MultiBranch),
        Just(BranchingMode::SingleDepth),
    ]
}

/// Generate a sequence number for content messages.
pub fn seq() -> impl Strategy<Value = u64> {
    1u64..=u64::MAX / 2
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Kinds that are signed and carry only a public payload.
pub fn public_kind() -> impl Strategy<Value = MessageKind> {
    prop_oneof![
        Just(MessageKind::SignedPacket),
        Just(MessageKind::Keyload),
        Just(MessageKind::Sequence),
    ]
}

/// Parameters for a signed, unencrypted frame.
#[derive(Debug, Clone)]
pub struct FrameParams {
    pub seed: [u8; 32],
    pub kind: MessageKind,
    pub link: Link,
    pub previous: Link,
    pub seq: u64,
    pub public: Vec<u8>,
}

impl Arbitrary for FrameParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<[u8; 32]>(),
            public_kind(),
            channel_id(),
            any::<[u8; 32]>(),
            any::<[u8; 32]>(),
            seq(),
            payload(512),
        )
            .prop_map(|(seed, kind, channel, msg, previous, seq, public)| FrameParams {
                seed,
                kind,
                link: Link::new(channel, MsgId(msg)),
                previous: Link::new(channel, MsgId(previous)),
                seq,
                public,
            })
            .boxed()
    }
}

/// Build the frame described by `params`.
pub fn frame_from_params(params: &FrameParams) -> plait_core::Result<WrappedFrame> {
    let identity = Identity::generate(&params.seed)?;
    FrameBuilder::new(params.kind, params.link)
        .previous(params.previous)
        .seq(params.seq)
        .public(params.public.clone())
        .build(&identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plait_core::Frame;

    proptest! {
        #[test]
        fn test_frame_is_deterministic(params: FrameParams) {
            let a = frame_from_params(&params).unwrap();
            let b = frame_from_params(&params).unwrap();
            prop_assert_eq!(a.bytes, b.bytes);
        }

        #[test]
        fn test_frame_decodes_at_its_link(params: FrameParams) {
            let wrapped = frame_from_params(&params).unwrap();
            let frame = Frame::decode(&wrapped.bytes, &params.link).unwrap();
            prop_assert_eq!(frame.header, wrapped.header);
            prop_assert_eq!(&frame.public[..], &params.public[..]);
        }
    }
}
