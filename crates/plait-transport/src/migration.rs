//! SQLite schema versions for the frame store.
//!
//! `STEPS[i]` upgrades a database from version `i` to `i + 1`. The highest
//! applied version lives in `schema_migrations`; opening a file written by a
//! newer build is refused.

use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection};

use crate::error::{Result, TransportError};

const STEPS: &[&str] = &[
    // v1: one row per link. The digest lets a resend be told apart from a
    // conflicting frame without comparing blobs.
    "CREATE TABLE frames (
        channel_id BLOB NOT NULL,
        msg_id     BLOB NOT NULL,
        frame      BLOB NOT NULL,
        frame_hash BLOB NOT NULL,
        stored_at  INTEGER NOT NULL,
        PRIMARY KEY (channel_id, msg_id)
    );
    CREATE INDEX frames_by_channel ON frames(channel_id, stored_at);",
];

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = STEPS.len() as u32;

/// Bring `conn` up to [`CURRENT_VERSION`]. Runs on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )?;

    let found: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    if found > CURRENT_VERSION {
        return Err(TransportError::Migration(format!(
            "frame store is at schema v{}, this build knows v{}",
            found, CURRENT_VERSION
        )));
    }
    if found == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (index, step) in STEPS.iter().enumerate().skip(found as usize) {
        let version = index as u32 + 1;
        tx.execute_batch(step)
            .map_err(|e| TransportError::Migration(format!("v{}: {}", version, e)))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, now_millis()],
        )?;
    }
    tx.commit()?;

    tracing::debug!(from = found, to = CURRENT_VERSION, "migrated frame store");
    Ok(())
}

/// Wall clock in Unix milliseconds, 0 if the clock reads before the epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}
