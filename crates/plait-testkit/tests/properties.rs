//! Property tests across the channel stack.

use proptest::prelude::*;

use plait_core::{Frame, SequencingStore};
use plait_testkit::generators::{branching_mode, identifier, link, payload};
use plait_testkit::{frame_from_params, ChannelFixture, FrameParams};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn test_any_flipped_bit_is_rejected(params: FrameParams, index: prop::sample::Index, bit in 0u8..8) {
        let wrapped = frame_from_params(&params).unwrap();
        let mut bytes = wrapped.bytes.clone();
        let i = index.index(bytes.len());
        bytes[i] ^= 1 << bit;
        prop_assert!(Frame::decode(&bytes, &params.link).is_err());
    }

    #[test]
    fn test_frame_rejected_at_other_link(params: FrameParams, other in link()) {
        prop_assume!(other != params.link);
        let wrapped = frame_from_params(&params).unwrap();
        prop_assert!(Frame::decode(&wrapped.bytes, &other).is_err());
    }

    #[test]
    fn test_record_never_moves_backwards(
        mode in branching_mode(),
        publisher in identifier(),
        anchor in link(),
        steps in prop::collection::vec((link(), 1u64..64), 1..16),
    ) {
        let mut store = SequencingStore::new(mode);
        store.register(publisher, plait_core::Cursor::start(anchor));
        let mut highest = 0;
        for (link, seq) in steps {
            store.record(publisher, link, seq);
            highest = highest.max(seq);
            let cursor = store.cursor_for(&publisher).unwrap();
            prop_assert_eq!(cursor.seq, highest + 1);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn test_subscriber_reads_everything_in_order(
        mode in branching_mode(),
        payloads in prop::collection::vec(payload(64), 1..6),
    ) {
        let received = runtime().block_on(async {
            let mut fixture = ChannelFixture::new(mode).await?;
            let mut subscriber = fixture.subscriber(b"reader").await?;
            let keyload = fixture.open_session().await?;
            for masked in &payloads {
                fixture
                    .author
                    .send_signed_packet(&keyload.link, "", masked.clone())
                    .await?;
            }
            let messages = subscriber.sync_state().await?;
            anyhow::Ok(
                messages
                    .into_iter()
                    .skip(1)
                    .map(|m| m.masked_payload.map(|b| b.to_vec()))
                    .collect::<Vec<_>>(),
            )
        }).unwrap();

        let expected: Vec<_> = payloads.into_iter().map(Some).collect();
        prop_assert_eq!(received, expected);
    }
}
