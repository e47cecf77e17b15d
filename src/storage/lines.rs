//! Line assignment storage: which physical lines serve an order line.

use std::collections::BTreeMap;

use rusqlite::params;

use crate::model::{LineAssignment, LineKey};

use super::{Result, Storage};

impl Storage {
    /// All line assignments, ordered by line key then line name.
    pub fn list_line_assignments(&self) -> Result<Vec<LineAssignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT order_id, standard_id, line_name FROM line_assignments
             ORDER BY order_id, standard_id, line_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, u64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut grouped: BTreeMap<LineKey, Vec<String>> = BTreeMap::new();
        for row in rows {
            let (order_id, standard_id, line_name) = row?;
            grouped
                .entry(LineKey::new(order_id, standard_id))
                .or_default()
                .push(line_name);
        }
        Ok(grouped
            .into_iter()
            .map(|(line, lines)| LineAssignment { line, lines })
            .collect())
    }

    /// Replaces the physical lines serving `line`. An empty list clears it.
    pub fn replace_line_assignment(&self, line: &LineKey, lines: &[String]) -> Result<()> {
        self.conn.execute(
            "DELETE FROM line_assignments WHERE order_id = ?1 AND standard_id = ?2",
            params![line.order_id, line.standard_id],
        )?;
        let mut stmt = self.conn.prepare(
            "INSERT OR IGNORE INTO line_assignments (order_id, standard_id, line_name)
             VALUES (?1, ?2, ?3)",
        )?;
        for name in lines {
            stmt.execute(params![line.order_id, line.standard_id, name])?;
        }
        Ok(())
    }

    /// Deletes every assignment of the listed lines.
    ///
    /// Returns how many rows were removed.
    pub fn delete_line_assignments<'a>(
        &self,
        lines: impl IntoIterator<Item = &'a LineKey>,
    ) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare("DELETE FROM line_assignments WHERE order_id = ?1 AND standard_id = ?2")?;
        let mut removed = 0;
        for line in lines {
            removed += stmt.execute(params![line.order_id, line.standard_id])?;
        }
        Ok(removed)
    }
}
