//! Outfeed queue storage.
//!
//! Queues are edited in memory by the sequencer and written back one
//! outfeed at a time, so a stored queue is always a whole, renumbered list.

use rusqlite::params;

use crate::model::{LineKey, OutfeedId, QueueEntry, Queues};

use super::{Result, Storage, StorageError};

impl Storage {
    /// All queue entries, grouped by outfeed and sorted by sequence.
    pub fn list_queues(&self) -> Result<Queues> {
        let mut stmt = self.conn.prepare(
            "SELECT outfeed_id, tag, order_id, standard_id, sequence FROM outfeed_queue
             ORDER BY outfeed_id, sequence",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, OutfeedId>(0)?,
                QueueEntry {
                    tag: row.get(1)?,
                    line: LineKey::new(row.get::<_, u64>(2)?, row.get::<_, String>(3)?),
                    sequence: row.get(4)?,
                },
            ))
        })?;
        let mut queues = Queues::new();
        for row in rows {
            let (outfeed, entry) = row?;
            queues.entry(outfeed).or_default().push(entry);
        }
        Ok(queues)
    }

    /// Replaces one outfeed's queue with `entries`.
    ///
    /// Fails with [`StorageError::OutfeedNotFound`] for an uncatalogued outfeed.
    pub fn replace_queue(&self, outfeed: OutfeedId, entries: &[QueueEntry]) -> Result<()> {
        self.conn.execute(
            "DELETE FROM outfeed_queue WHERE outfeed_id = ?1",
            params![outfeed],
        )?;
        if entries.is_empty() {
            return Ok(());
        }
        let known: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM outfeeds WHERE id = ?1)",
            params![outfeed],
            |row| row.get(0),
        )?;
        if !known {
            return Err(StorageError::OutfeedNotFound(outfeed));
        }
        let mut stmt = self.conn.prepare(
            "INSERT INTO outfeed_queue (outfeed_id, tag, order_id, standard_id, sequence)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for entry in entries {
            stmt.execute(params![
                outfeed,
                entry.tag,
                entry.line.order_id,
                entry.line.standard_id,
                entry.sequence,
            ])?;
        }
        Ok(())
    }
}
