//! Local persistence for the planning board.
//!
//! Everything lives in one `SQLite` file (default `~/.loadboard/board.sqlite`):
//!
//! ```text
//! loads            order_id → load_name
//! load_priorities  load_name → rank (dense from 1)
//! line_assignments (order_id, standard_id) → physical line names
//! outfeeds         outfeed catalog with RUNNING/PAUSED status
//! outfeed_queue    (outfeed_id, tag) → line + sequence
//! reconcile_runs   history of reconciliation runs
//! ```
//!
//! Multi-step changes go through [`Storage::atomically`].

mod lines;
mod loads;
mod outfeeds;
mod priorities;
mod queues;
mod runs;

use std::{fs, io, path::Path, path::PathBuf, time::Duration};

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::model::{BoardState, OutfeedId};

pub use runs::RunRecord;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("outfeed not found: {0}")]
    OutfeedNotFound(OutfeedId),

    #[error("outfeed already exists: {0}")]
    OutfeedAlreadyExists(OutfeedId),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// How long a writer waits for another writer's transaction to finish.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS loads (
    order_id INTEGER PRIMARY KEY,
    load_name TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_loads_name ON loads(load_name);

CREATE TABLE IF NOT EXISTS load_priorities (
    load_name TEXT PRIMARY KEY,
    rank INTEGER NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS line_assignments (
    order_id INTEGER NOT NULL,
    standard_id TEXT NOT NULL,
    line_name TEXT NOT NULL,
    PRIMARY KEY (order_id, standard_id, line_name)
);

CREATE TABLE IF NOT EXISTS outfeeds (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    status TEXT
);

CREATE TABLE IF NOT EXISTS outfeed_queue (
    outfeed_id INTEGER NOT NULL REFERENCES outfeeds(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    order_id INTEGER NOT NULL,
    standard_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    PRIMARY KEY (outfeed_id, tag),
    UNIQUE (outfeed_id, order_id, standard_id),
    UNIQUE (outfeed_id, sequence)
);

CREATE INDEX IF NOT EXISTS idx_queue_line ON outfeed_queue(order_id, standard_id);

CREATE TABLE IF NOT EXISTS reconcile_runs (
    id TEXT PRIMARY KEY,
    reconciled_at TEXT NOT NULL,
    feed_digest TEXT NOT NULL,
    order_count INTEGER NOT NULL,
    summary_json TEXT NOT NULL,
    snapshot BLOB NOT NULL
);
";

/// `SQLite`-backed store for loads, priorities, line assignments, and queues.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Opens (or creates) the database at `path` and applies the schema.
    ///
    /// The parent directory is created if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init(conn)
    }

    /// Opens a private in-memory database.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Returns the default database path: `~/.loadboard/board.sqlite`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".loadboard").join("board.sqlite"))
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    /// Applies the schema. Safe to run against an existing database.
    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Closes the connection, surfacing any error the implicit drop would hide.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e.into())
    }

    /// Runs `f` inside one write transaction.
    ///
    /// The write lock is taken up front, so concurrent writers queue instead
    /// of interleaving. Commits when `f` returns `Ok`; any error (or panic)
    /// rolls back every statement `f` executed. Not reentrant.
    pub fn atomically<T, E>(
        &self,
        f: impl FnOnce(&Self) -> core::result::Result<T, E>,
    ) -> core::result::Result<T, E>
    where
        E: From<StorageError>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;
        let value = f(self)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(value)
    }

    /// Reads the whole board.
    ///
    /// Every catalogued outfeed has a queue entry, empty if nothing is planned.
    pub fn load_board(&self) -> Result<BoardState> {
        let outfeeds = self.list_outfeeds()?;
        let mut queues = self.list_queues()?;
        for outfeed in &outfeeds {
            queues.entry(outfeed.id).or_default();
        }
        Ok(BoardState {
            loads: self.list_loads()?,
            priorities: self.list_priorities()?,
            line_assignments: self.list_line_assignments()?,
            queues,
            outfeeds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("board.sqlite");

        let storage = Storage::open(&path).unwrap();
        storage.close().unwrap();

        assert!(path.exists());
    }

    #[test]
    fn reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.sqlite");

        let storage = Storage::open(&path).unwrap();
        storage.assign_load(7, "A").unwrap();
        storage.close().unwrap();

        let storage = Storage::open(&path).unwrap();
        assert_eq!(
            storage.list_loads().unwrap().get(&7).map(String::as_str),
            Some("A")
        );
    }

    #[test]
    fn migrate_is_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        storage.assign_load(1, "A").unwrap();
        storage.migrate().unwrap();
        assert_eq!(storage.list_loads().unwrap().len(), 1);
    }

    #[test]
    fn empty_board() {
        let storage = Storage::open_in_memory().unwrap();
        let board = storage.load_board().unwrap();
        assert_eq!(board, BoardState::default());
    }

    #[test]
    fn load_board_lists_empty_queues_for_known_outfeeds() {
        let storage = Storage::open_in_memory().unwrap();
        storage.register_outfeed(3, "Dock 3").unwrap();

        let board = storage.load_board().unwrap();
        assert_eq!(board.queues.get(&3), Some(&Vec::new()));
    }

    #[test]
    fn atomically_commits_on_success() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .atomically(|s| -> Result<()> {
                s.assign_load(1, "A")?;
                s.assign_load(2, "A")?;
                Ok(())
            })
            .unwrap();

        assert_eq!(storage.list_loads().unwrap().len(), 2);
    }

    #[test]
    fn atomically_rolls_back_on_error() {
        let storage = Storage::open_in_memory().unwrap();
        storage.assign_load(1, "A").unwrap();

        let err = storage
            .atomically(|s| -> Result<()> {
                s.assign_load(2, "B")?;
                s.delete_loads([1])?;
                Err(StorageError::Corrupt("boom".into()))
            })
            .unwrap_err();

        assert!(matches!(err, StorageError::Corrupt(_)));
        let loads = storage.list_loads().unwrap();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads.get(&1).map(String::as_str), Some("A"));
    }

    #[test]
    fn atomically_can_run_again_after_rollback() {
        let storage = Storage::open_in_memory().unwrap();
        let _ = storage.atomically(|_| -> Result<()> { Err(StorageError::Corrupt("x".into())) });

        storage
            .atomically(|s| -> Result<()> { s.assign_load(1, "A") })
            .unwrap();
        assert_eq!(storage.list_loads().unwrap().len(), 1);
    }
}
