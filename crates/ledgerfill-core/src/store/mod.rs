//! Embedded SQLite ledger.
//!
//! One `Ledger` owns one connection. All writes for a batch, including its
//! checkpoint advance, go through [`Ledger::commit_batch`] inside a single
//! SQLite transaction.

mod checkpoint;
mod writer;

use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use crate::error::CoreError;

pub use writer::WriteStats;

const SCHEMA: &str = include_str!("../../sql/schema.sql");

pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, CoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CoreError> {
        // In-memory databases answer "memory"; that is fine.
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        debug!(journal_mode = %mode, "ledger schema ready");
        Ok(Self { conn })
    }

    /// Last fully committed block for `stream_id`.
    pub fn checkpoint(&self, stream_id: &str) -> Result<Option<u64>, CoreError> {
        checkpoint::load(&self.conn, stream_id)
    }

    pub fn set_checkpoint(&self, stream_id: &str, last_block: u64) -> Result<(), CoreError> {
        checkpoint::save(&self.conn, stream_id, last_block)
    }

    /// Move the checkpoint back so that a resume starts at `batch_start`.
    pub fn regress_checkpoint(&self, stream_id: &str, batch_start: u64) -> Result<(), CoreError> {
        checkpoint::regress(&self.conn, stream_id, batch_start)
    }
}

// ==============================================================================
// Test Inspection
// ==============================================================================
