//! # Plait Transport
//!
//! Transport abstraction for Plait channels. Provides a trait-based
//! interface to an addressable, append-only ledger with SQLite and
//! in-memory implementations.
//!
//! ## Overview
//!
//! Channels never talk to a network directly. Every frame is sent to, and
//! fetched from, a [`Link`](plait_core::Link) through the [`Transport`]
//! trait, so the channel engine is ledger-agnostic.
//!
//! ## Key Types
//!
//! - [`Transport`] - The async trait for sending and fetching frames
//! - [`SqliteTransport`] - SQLite-based durable bucket
//! - [`MemoryTransport`] - In-memory bucket for tests
//! - [`SendOutcome`] - Result of sending a frame
//!
//! ## Usage
//!
//! ```rust,no_run
//! use plait_transport::{SqliteTransport, Transport, SendOutcome};
//!
//! async fn example(link: plait_core::Link) -> plait_transport::Result<()> {
//!     // Open a SQLite database
//!     let transport = SqliteTransport::open("frames.db")?;
//!
//!     assert_eq!(transport.send(&link, b"frame").await?, SendOutcome::Stored);
//!     assert!(transport.fetch(&link).await?.is_some());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent sends**: Sending the same frame twice returns `AlreadyStored`
//! - **First writer wins**: A different frame at an occupied link returns `Conflict`

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use sqlite::SqliteTransport;
pub use traits::{SendOutcome, Transport};
