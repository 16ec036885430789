use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};

use crate::error::CoreError;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub(super) fn load(conn: &Connection, stream_id: &str) -> Result<Option<u64>, CoreError> {
    let last = conn
        .query_row(
            "SELECT last_block FROM sync_state WHERE stream_id = ?1",
            params![stream_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(last)
}

pub(super) fn save(conn: &Connection, stream_id: &str, last_block: u64) -> Result<(), CoreError> {
    conn.execute(
        "INSERT INTO sync_state (stream_id, last_block, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (stream_id) DO UPDATE
         SET last_block = excluded.last_block, updated_at = excluded.updated_at",
        params![stream_id, last_block, unix_now()],
    )?;
    Ok(())
}

/// Put the checkpoint just before `batch_start`.
///
/// A checkpoint already below `batch_start` is left alone: regression never
/// claims blocks that were not committed. At `batch_start == 0` the row is
/// removed since no block precedes it.
pub(super) fn regress(conn: &Connection, stream_id: &str, batch_start: u64) -> Result<(), CoreError> {
    let Some(current) = load(conn, stream_id)? else {
        return Ok(());
    };
    if current < batch_start {
        return Ok(());
    }

    match batch_start.checked_sub(1) {
        Some(previous) => {
            save(conn, stream_id, previous)?;
            warn!(
                category = "failure",
                stream_id,
                from = current,
                to = previous,
                "checkpoint regressed"
            );
        }
        None => {
            conn.execute(
                "DELETE FROM sync_state WHERE stream_id = ?1",
                params![stream_id],
            )?;
            info!(category = "failure", stream_id, from = current, "checkpoint cleared");
        }
    }
    Ok(())
}
