//! SQLite implementation of the Transport trait.
//!
//! A durable bucket: frames survive process restarts. Uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use plait_core::{Blake3Hash, Link};

use crate::error::{Result, TransportError};
use crate::migration::{self, now_millis};
use crate::traits::{compare, SendOutcome, Transport};

/// SQLite-based transport.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Debug, Clone)]
pub struct SqliteTransport {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTransport {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            f(&conn)
        })
        .await
        .map_err(|e| TransportError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }

    /// Number of stored frames.
    pub async fn frame_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM frames", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| TransportError::Unavailable(format!("mutex poisoned: {}", e)))
}

fn select_frame(conn: &Connection, link: &Link) -> Result<Option<Vec<u8>>> {
    let frame = conn
        .query_row(
            "SELECT frame FROM frames WHERE channel_id = ?1 AND msg_id = ?2",
            params![link.channel.as_bytes().as_slice(), link.msg.as_bytes().as_slice()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(frame)
}

#[async_trait]
impl Transport for SqliteTransport {
    async fn send(&self, link: &Link, frame: &[u8]) -> Result<SendOutcome> {
        let link = *link;
        let frame = frame.to_vec();

        let outcome = self
            .with_conn(move |conn| {
                if let Some(existing) = select_frame(conn, &link)? {
                    return Ok(compare(&existing, &frame));
                }

                conn.execute(
                    "INSERT INTO frames (channel_id, msg_id, frame, frame_hash, stored_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        link.channel.as_bytes().as_slice(),
                        link.msg.as_bytes().as_slice(),
                        frame.as_slice(),
                        Blake3Hash::hash(&frame).as_bytes().as_slice(),
                        now_millis(),
                    ],
                )?;
                Ok(SendOutcome::Stored)
            })
            .await?;

        if let SendOutcome::Conflict { existing } = &outcome {
            tracing::warn!(link = %link, existing = %existing.to_hex(), "rejected frame at occupied link");
        }
        Ok(outcome)
    }

    async fn fetch(&self, link: &Link) -> Result<Option<Vec<u8>>> {
        let link = *link;
        self.with_conn(move |conn| select_frame(conn, &link)).await
    }
}
