//! Reconciliation history: one row per successful run, in run order.
//!
//! Each row keeps the run's summary and the exact feed snapshot it saw,
//! zstd-compressed, so a surprising release can be traced back to the data
//! that caused it.

use jiff::Timestamp;
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Order;
use crate::reconcile::RunSummary;

use super::{Result, Storage, StorageError};

const SNAPSHOT_LEVEL: i32 = 3;

/// Metadata for one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: Uuid,
    pub reconciled_at: Timestamp,
    /// Hex SHA-256 of the snapshot's canonical JSON.
    pub feed_digest: String,
    pub order_count: usize,
    pub summary: RunSummary,
}

impl Storage {
    /// Records a run together with the snapshot it reconciled against.
    pub fn append_run(&self, run: &RunRecord, orders: &[Order]) -> Result<()> {
        let snapshot = zstd::encode_all(serde_json::to_vec(orders)?.as_slice(), SNAPSHOT_LEVEL)?;
        self.conn.execute(
            "INSERT INTO reconcile_runs
                (id, reconciled_at, feed_digest, order_count, summary_json, snapshot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.id.to_string(),
                run.reconciled_at.to_string(),
                run.feed_digest,
                run.order_count,
                serde_json::to_string(&run.summary)?,
                snapshot,
            ],
        )?;
        Ok(())
    }

    /// The most recent runs, newest first.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, reconciled_at, feed_digest, order_count, summary_json
             FROM reconcile_runs ORDER BY rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, usize>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut runs = Vec::new();
        for row in rows {
            let (id, reconciled_at, feed_digest, order_count, summary) = row?;
            runs.push(RunRecord {
                id: id
                    .parse()
                    .map_err(|e| StorageError::Corrupt(format!("invalid run id: {e}")))?,
                reconciled_at: reconciled_at
                    .parse()
                    .map_err(|e| StorageError::Corrupt(format!("invalid reconciled_at: {e}")))?,
                feed_digest,
                order_count,
                summary: serde_json::from_str(&summary)?,
            });
        }
        Ok(runs)
    }

    /// The feed digest of the newest run, if any run was recorded.
    pub fn latest_feed_digest(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT feed_digest FROM reconcile_runs
                 ORDER BY rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Ids of the runs whose id starts with `prefix`, newest first.
    pub fn find_runs_by_prefix(&self, prefix: &str) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM reconcile_runs
             WHERE substr(id, 1, length(?1)) = ?1
             ORDER BY rowid DESC",
        )?;
        let rows = stmt.query_map(params![prefix], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(
                row?.parse()
                    .map_err(|e| StorageError::Corrupt(format!("invalid run id: {e}")))?,
            );
        }
        Ok(ids)
    }

    /// The snapshot a run reconciled against.
    pub fn load_run_snapshot(&self, id: Uuid) -> Result<Option<Vec<Order>>> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT snapshot FROM reconcile_runs WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(blob) = blob else {
            return Ok(None);
        };
        let json = zstd::decode_all(blob.as_slice())?;
        Ok(Some(serde_json::from_slice(&json)?))
    }

    /// Keeps only the newest `keep` runs. Returns how many were deleted.
    pub fn prune_runs(&self, keep: usize) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM reconcile_runs WHERE id NOT IN (
                 SELECT id FROM reconcile_runs
                 ORDER BY rowid DESC LIMIT ?1
             )",
            params![keep],
        )?)
    }
}
