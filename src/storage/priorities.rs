//! Load priority storage: a dense ranking over load names.

use std::collections::BTreeMap;

use rusqlite::params;

use super::{Result, Storage};

impl Storage {
    /// All priorities, `load name → rank`.
    pub fn list_priorities(&self) -> Result<BTreeMap<String, u32>> {
        let mut stmt = self
            .conn
            .prepare("SELECT load_name, rank FROM load_priorities ORDER BY rank")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        let mut priorities = BTreeMap::new();
        for row in rows {
            let (load, rank) = row?;
            priorities.insert(load, rank);
        }
        Ok(priorities)
    }

    /// Replaces the whole ranking.
    pub fn replace_priorities(&self, priorities: &BTreeMap<String, u32>) -> Result<()> {
        self.conn.execute("DELETE FROM load_priorities", [])?;
        let mut stmt = self
            .conn
            .prepare("INSERT INTO load_priorities (load_name, rank) VALUES (?1, ?2)")?;
        for (load, rank) in priorities {
            stmt.execute(params![load, rank])?;
        }
        Ok(())
    }
}
