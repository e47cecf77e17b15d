//! Load storage: which load each order belongs to.

use std::collections::BTreeMap;

use rusqlite::params;

use super::{Result, Storage};

impl Storage {
    /// All load assignments, `order_id → load name`.
    pub fn list_loads(&self) -> Result<BTreeMap<u64, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT order_id, load_name FROM loads ORDER BY order_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, u64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut loads = BTreeMap::new();
        for row in rows {
            let (order_id, load) = row?;
            loads.insert(order_id, load);
        }
        Ok(loads)
    }

    /// Assigns an order to a load, replacing any previous assignment.
    pub fn assign_load(&self, order_id: u64, load: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO loads (order_id, load_name) VALUES (?1, ?2)
             ON CONFLICT(order_id) DO UPDATE SET load_name = excluded.load_name",
            params![order_id, load],
        )?;
        Ok(())
    }

    /// Deletes the load assignment of every listed order.
    ///
    /// Returns how many assignments existed and were removed.
    pub fn delete_loads(&self, order_ids: impl IntoIterator<Item = u64>) -> Result<usize> {
        let mut stmt = self.conn.prepare("DELETE FROM loads WHERE order_id = ?1")?;
        let mut removed = 0;
        for order_id in order_ids {
            removed += stmt.execute(params![order_id])?;
        }
        Ok(removed)
    }
}
