//! Outfeed catalog storage.

use rusqlite::{ErrorCode, params};

use crate::model::{Outfeed, OutfeedId, OutfeedStatus};

use super::{Result, Storage, StorageError};

impl Storage {
    /// All catalogued outfeeds, by id.
    pub fn list_outfeeds(&self) -> Result<Vec<Outfeed>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, status FROM outfeeds ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, OutfeedId>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        let mut outfeeds = Vec::new();
        for row in rows {
            let (id, name, status) = row?;
            let status = match status {
                None => OutfeedStatus::default(),
                Some(s) => s.parse().map_err(|_| {
                    StorageError::Corrupt(format!("outfeed {id} has unknown status {s:?}"))
                })?,
            };
            outfeeds.push(Outfeed { id, name, status });
        }
        Ok(outfeeds)
    }

    /// Adds an outfeed to the catalog. New outfeeds have no status (`PAUSED`).
    pub fn register_outfeed(&self, id: OutfeedId, name: &str) -> Result<()> {
        match self.conn.execute(
            "INSERT INTO outfeeds (id, name, status) VALUES (?1, ?2, NULL)",
            params![id, name],
        ) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::OutfeedAlreadyExists(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sets an outfeed's status.
    pub fn set_outfeed_status(&self, id: OutfeedId, status: OutfeedStatus) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE outfeeds SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        if rows == 0 {
            return Err(StorageError::OutfeedNotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_outfeed_defaults_to_paused() {
        let storage = Storage::open_in_memory().unwrap();
        storage.register_outfeed(1, "Dock 1").unwrap();

        let outfeeds = storage.list_outfeeds().unwrap();
        assert_eq!(
            outfeeds,
            vec![Outfeed {
                id: 1,
                name: "Dock 1".into(),
                status: OutfeedStatus::Paused,
            }]
        );
    }

    #[test]
    fn register_duplicate_fails() {
        let storage = Storage::open_in_memory().unwrap();
        storage.register_outfeed(1, "Dock 1").unwrap();
        let err = storage.register_outfeed(1, "Dock 1 again").unwrap_err();

        assert!(matches!(err, StorageError::OutfeedAlreadyExists(1)));
    }

    #[test]
    fn set_status_round_trips() {
        let storage = Storage::open_in_memory().unwrap();
        storage.register_outfeed(1, "Dock 1").unwrap();
        storage
            .set_outfeed_status(1, OutfeedStatus::Running)
            .unwrap();

        assert_eq!(
            storage.list_outfeeds().unwrap()[0].status,
            OutfeedStatus::Running
        );
    }

    #[test]
    fn set_status_unknown_outfeed_fails() {
        let storage = Storage::open_in_memory().unwrap();
        let err = storage
            .set_outfeed_status(9, OutfeedStatus::Running)
            .unwrap_err();

        assert!(matches!(err, StorageError::OutfeedNotFound(9)));
    }

    #[test]
    fn unknown_stored_status_is_corrupt() {
        let storage = Storage::open_in_memory().unwrap();
        storage.register_outfeed(1, "Dock 1").unwrap();
        storage
            .conn
            .execute("UPDATE outfeeds SET status = 'BROKEN'", [])
            .unwrap();

        let err = storage.list_outfeeds().unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }
}
