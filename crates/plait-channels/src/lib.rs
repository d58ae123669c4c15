//! # Plait Channels
//!
//! Authors and subscribers of Plait channels: authenticated, append-only
//! publish/subscribe channels over an addressable ledger.
//!
//! ## Overview
//!
//! An [`Author`] announces a channel, admits subscribers and distributes
//! session keys through keyloads. A [`Subscriber`] binds to an
//! announcement, asks for access and reads what it was granted. Both
//! publish signed or tagged packets and read each other's messages with
//! [`User::sync_state`].
//!
//! ## Key Concepts
//!
//! - **Link**: every message lives at a deterministic address, so readers
//!   find the next message without an index.
//! - **Branching mode**: single-branch channels form one chain,
//!   multi-branch channels give each publisher its own branch located by
//!   Sequence messages, single-depth channels address messages by
//!   `(publisher, seq)` directly.
//! - **Transactional operations**: an operation that fails leaves the
//!   participant's state unchanged.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use plait_channels::{Author, Subscriber, UserConfig};
//! use plait_transport::MemoryTransport;
//!
//! async fn example() -> plait_channels::Result<()> {
//!     let ledger = Arc::new(MemoryTransport::new());
//!     let mut author = Author::new(b"author seed", UserConfig::default(), ledger.clone())?;
//!     let announce = author.send_announce().await?;
//!
//!     let mut subscriber = Subscriber::new(b"subscriber seed", UserConfig::default(), ledger)?;
//!     subscriber.receive_announcement(&announce).await?;
//!     let subscription = subscriber.send_subscribe(&announce).await?;
//!
//!     author.receive_subscribe(&subscription).await?;
//!     let keyload = author.send_keyload_for_everyone(&announce).await?;
//!     author.send_signed_packet(&keyload.link, "public", "masked").await?;
//!
//!     for message in subscriber.sync_state().await? {
//!         println!("{} {:?}", message.link, message.masked_payload);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **First writer wins**: when two publishers race for a link, the loser
//!   gets `LinkConflict`, syncs and sends again. A frame of our own left at
//!   the link by an interrupted send is completed instead.
//! - **Keys follow links**: a packet is sealed under the keyload that
//!   governs the message it links to.
//! - **Replays are harmless**: reading a frame twice changes nothing; a
//!   different frame at a processed link is a `LinkConflict`.

pub mod author;
pub mod config;
pub mod error;
pub mod message;
pub mod payload;
pub mod persist;
pub mod recovery;
pub mod state;
pub mod subscriber;
pub mod user;
pub mod walker;

pub use author::Author;
pub use config::{UserConfig, DEFAULT_MAX_PAYLOAD_LEN};
pub use error::{ChannelError, Result};
pub use message::{Message, SendResponse, Status};
pub use persist::EXPORT_VERSION;
pub use state::ChannelInfo;
pub use subscriber::Subscriber;
pub use user::User;
pub use walker::MessageWalker;

pub use plait_core::{BranchingMode, Identifier, Link, MessageKind, PskId};
