//! # Plait Testkit
//!
//! Testing utilities for Plait channels.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Link vectors**: Fixed inputs for cross-implementation link derivation
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Announced channels with accepted subscribers on a shared
//!   in-memory ledger
//!
//! ## Link Vectors
//!
//! ```rust
//! use plait_testkit::vectors::{all_vectors, derive_links};
//!
//! for vector in all_vectors() {
//!     let links = derive_links(&vector).unwrap();
//!     println!("{}: {}", vector.name, links.announce);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use plait_testkit::generators::{frame_from_params, FrameParams};
//!
//! proptest! {
//!     #[test]
//!     fn frames_are_deterministic(params: FrameParams) {
//!         let a = frame_from_params(&params).unwrap();
//!         let b = frame_from_params(&params).unwrap();
//!         prop_assert_eq!(a.bytes, b.bytes);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use plait_channels::BranchingMode;
//! use plait_testkit::ChannelFixture;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let mut fixture = ChannelFixture::new(BranchingMode::MultiBranch).await?;
//!     let mut subscriber = fixture.subscriber(b"reader").await?;
//!     fixture.open_session().await?;
//!     subscriber.sync_state().await?;
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{init_tracing, party_seeds, ChannelFixture, Ledger};
pub use generators::{frame_from_params, FrameParams};
pub use vectors::{all_vectors, derive_links, verify_all_vectors, DerivedLinks, LinkVector};
