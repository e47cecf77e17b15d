//! The planning board: the operations callers perform against the store.
//!
//! Every operation reads what it needs, computes the new state in memory,
//! and writes it back inside one [`Storage::atomically`] call. A failure at
//! any step leaves the store exactly as it was. Each mutating operation
//! returns the board as it stands after the commit.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use jiff::Timestamp;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::classify::DonePolicy;
use crate::feed::{FeedError, OrderFeed};
use crate::model::{
    BoardState, LineKey, Order, OutfeedId, OutfeedStatus, PackingStatus, Queues, UnknownStatus,
};
use crate::reconcile::{self, RunSummary};
use crate::sequencer::{self, SequenceError};
use crate::storage::{RunRecord, Storage, StorageError};

/// Default number of reconciliation runs kept in the history.
pub const DEFAULT_KEEP_RUNS: usize = 50;

/// Errors surfaced by board operations.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("order feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("unexpected order feed format: {0}")]
    FeedFormat(String),

    #[error("order {0} has no load assigned")]
    NoLoadAssigned(u64),

    #[error("invalid outfeed status {0:?}: expected RUNNING or PAUSED")]
    InvalidStatus(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StorageError),
}

impl From<FeedError> for BoardError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::Unavailable(msg) => Self::FeedUnavailable(msg),
            FeedError::Format(msg) => Self::FeedFormat(msg),
        }
    }
}

impl From<SequenceError> for BoardError {
    fn from(e: SequenceError) -> Self {
        Self::Validation(e.to_string())
    }
}

pub type Result<T> = core::result::Result<T, BoardError>;

/// Packing status of one line, as computed by a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineStatus {
    pub line: LineKey,
    pub status: PackingStatus,
}

/// Outcome of [`Board::reconcile`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub run: RunRecord,
    pub statuses: Vec<LineStatus>,
    pub state: BoardState,
}

/// Outcome of [`Board::plan_order`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutcome {
    pub tag: String,
    pub state: BoardState,
}

/// The planning board service.
///
/// Owns the store handle for its whole lifetime; call [`Board::close`] at
/// shutdown.
pub struct Board<F> {
    storage: Storage,
    feed: F,
    policy: DonePolicy,
    keep_runs: usize,
}

impl<F: OrderFeed> Board<F> {
    pub fn new(storage: Storage, feed: F, policy: DonePolicy) -> Self {
        Self {
            storage,
            feed,
            policy,
            keep_runs: DEFAULT_KEEP_RUNS,
        }
    }

    /// Sets how many reconciliation runs the history retains.
    #[must_use]
    pub fn with_keep_runs(mut self, keep_runs: usize) -> Self {
        self.keep_runs = keep_runs;
        self
    }

    /// Closes the underlying store.
    pub fn close(self) -> Result<()> {
        Ok(self.storage.close()?)
    }

    /// The whole board.
    pub fn state(&self) -> Result<BoardState> {
        Ok(self.storage.load_board()?)
    }

    /// Recent reconciliation runs, newest first.
    pub fn runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        Ok(self.storage.list_runs(limit)?)
    }

    /// The feed snapshot a past run reconciled against.
    ///
    /// `reference` is a full run id or an unambiguous prefix of one.
    pub fn run_snapshot(&self, reference: &str) -> Result<(Uuid, Vec<Order>)> {
        let reference = require_text("run id", reference)?;
        let id = match reference.parse::<Uuid>() {
            Ok(id) => id,
            Err(_) => {
                let matches = self.storage.find_runs_by_prefix(reference)?;
                match matches.as_slice() {
                    [] => {
                        return Err(BoardError::Validation(format!(
                            "no run matching '{reference}'"
                        )));
                    }
                    [id] => *id,
                    _ => {
                        return Err(BoardError::Validation(format!(
                            "'{reference}' is ambiguous: matches {} runs",
                            matches.len()
                        )));
                    }
                }
            }
        };
        let orders = self
            .storage
            .load_run_snapshot(id)?
            .ok_or_else(|| BoardError::Validation(format!("no run {id}")))?;
        Ok((id, orders))
    }

    // ── Reconciliation ──

    /// Reconciles the board against a fresh feed snapshot.
    ///
    /// The feed is fetched before the transaction opens; a feed failure
    /// never touches the store.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let orders = self.feed.fetch()?;
        let digest = feed_digest(&orders)?;
        tracing::info!(orders = orders.len(), digest = %short(&digest), "reconciling");

        self.storage.atomically(|s| {
            if s.latest_feed_digest()?.as_deref() == Some(digest.as_str()) {
                tracing::debug!("feed unchanged since the previous run");
            }

            let before = s.load_board()?;
            let rec = reconcile::plan_reconciliation(&before, &orders, self.policy);

            s.delete_loads(rec.removed_loads.iter().copied())?;
            s.delete_line_assignments(&rec.removed_lines)?;
            s.replace_priorities(&rec.priorities)?;
            write_queues(s, &rec.queues, &rec.touched_outfeeds)?;

            let run = RunRecord {
                id: Uuid::new_v4(),
                reconciled_at: Timestamp::now(),
                feed_digest: digest.clone(),
                order_count: orders.len(),
                summary: rec.summary,
            };
            s.append_run(&run, &orders)?;
            let pruned = s.prune_runs(self.keep_runs)?;

            log_summary(&run.summary, pruned);
            tracing::info!(run = %run.id, "reconciliation committed");

            Ok(ReconcileReport {
                run,
                statuses: rec
                    .statuses
                    .into_iter()
                    .map(|(line, status)| LineStatus { line, status })
                    .collect(),
                state: s.load_board()?,
            })
        })
    }

    // ── Queues ──

    /// Plans an order line onto one or more outfeeds.
    ///
    /// The line keeps the tag it already carries anywhere on the board, or
    /// gets the next free tag of its load. Outfeeds already holding the tag
    /// are left alone, so planning twice is harmless.
    pub fn plan_order(
        &self,
        order_id: u64,
        standard_id: &str,
        outfeeds: &[OutfeedId],
        high_priority: bool,
    ) -> Result<PlanOutcome> {
        let standard_id = require_text("standard id", standard_id)?;
        if outfeeds.is_empty() {
            return Err(BoardError::Validation("at least one outfeed is required".into()));
        }

        self.storage.atomically(|s| {
            let board = s.load_board()?;
            let load = board
                .loads
                .get(&order_id)
                .ok_or(BoardError::NoLoadAssigned(order_id))?;
            for outfeed in outfeeds {
                require_outfeed(&board, *outfeed)?;
            }

            let line = LineKey::new(order_id, standard_id);
            let mut queues = board.queues.clone();
            let tag = sequencer::tag_for_line(&queues, &line)
                .map_or_else(|| sequencer::next_tag(&queues, load), str::to_string);

            let mut touched = BTreeSet::new();
            for outfeed in outfeeds {
                if sequencer::contains(&queues, *outfeed, &tag) {
                    continue;
                }
                if high_priority {
                    sequencer::prepend(&mut queues, *outfeed, &tag, &line);
                } else {
                    sequencer::append(&mut queues, *outfeed, &tag, &line);
                }
                touched.insert(*outfeed);
            }
            write_queues(s, &queues, &touched)?;

            tracing::info!(%tag, %line, ?touched, high_priority, "order planned");
            Ok(PlanOutcome {
                tag,
                state: s.load_board()?,
            })
        })
    }

    /// Removes a tag from one outfeed, or from every outfeed carrying it.
    pub fn unplan_order(&self, tag: &str, outfeed: Option<OutfeedId>) -> Result<BoardState> {
        let tag = require_text("tag", tag)?;

        self.storage.atomically(|s| {
            let board = s.load_board()?;
            if let Some(outfeed) = outfeed {
                require_outfeed(&board, outfeed)?;
            }
            let mut queues = board.queues;
            let touched = sequencer::remove(&mut queues, tag, outfeed);
            write_queues(s, &queues, &touched)?;

            tracing::info!(%tag, ?touched, "order unplanned");
            Ok(s.load_board()?)
        })
    }

    /// Rewrites the destination queue in the given order, moving `moved`
    /// out of `from` first when it changed outfeeds.
    pub fn update_queue_order(
        &self,
        from: Option<OutfeedId>,
        to: OutfeedId,
        moved: &str,
        ordered: &[String],
    ) -> Result<BoardState> {
        let moved = require_text("moved tag", moved)?;

        self.storage.atomically(|s| {
            let board = s.load_board()?;
            require_outfeed(&board, to)?;
            if let Some(from) = from {
                require_outfeed(&board, from)?;
            }
            let mut queues = board.queues;
            let touched = sequencer::reorder_and_move(&mut queues, from, to, moved, ordered)?;
            write_queues(s, &queues, &touched)?;

            tracing::info!(%moved, ?from, to, "queue reordered");
            Ok(s.load_board()?)
        })
    }

    // ── Catalog and assignments ──

    /// Sets an outfeed's status. Only `RUNNING` and `PAUSED` are accepted.
    pub fn set_outfeed_status(&self, outfeed: OutfeedId, status: &str) -> Result<BoardState> {
        let status: OutfeedStatus = status
            .parse()
            .map_err(|UnknownStatus(raw)| BoardError::InvalidStatus(raw))?;

        self.storage.atomically(|s| {
            require_outfeed(&s.load_board()?, outfeed)?;
            s.set_outfeed_status(outfeed, status)?;
            tracing::info!(outfeed, %status, "outfeed status changed");
            Ok(s.load_board()?)
        })
    }

    /// Adds an outfeed to the catalog.
    pub fn register_outfeed(&self, id: OutfeedId, name: &str) -> Result<BoardState> {
        let name = require_text("outfeed name", name)?;
        self.storage.atomically(|s| {
            s.register_outfeed(id, name)?;
            Ok(s.load_board()?)
        })
    }

    /// Assigns orders to a load.
    ///
    /// Loads left without orders drop out of the priority order.
    pub fn assign_load(&self, load: &str, order_ids: &[u64]) -> Result<BoardState> {
        let load = require_text("load name", load)?;
        if !load.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(BoardError::Validation(format!(
                "load name {load:?} must be ASCII letters and digits"
            )));
        }
        if order_ids.is_empty() {
            return Err(BoardError::Validation("at least one order id is required".into()));
        }

        self.storage.atomically(|s| {
            for order_id in order_ids {
                s.assign_load(*order_id, load)?;
            }
            let loads = s.list_loads()?;
            let in_use: HashSet<&str> = loads.values().map(String::as_str).collect();
            let priorities = s.list_priorities()?;
            s.replace_priorities(&reconcile::repack_priorities(&priorities, |name| {
                in_use.contains(name)
            }))?;

            tracing::info!(%load, orders = order_ids.len(), "load assigned");
            Ok(s.load_board()?)
        })
    }

    /// Replaces the priority order: the first load gets rank 1.
    pub fn set_priorities(&self, ordered: &[String]) -> Result<BoardState> {
        let mut seen = HashSet::new();
        for load in ordered {
            if !seen.insert(load.as_str()) {
                return Err(BoardError::Validation(format!(
                    "load {load} is listed more than once"
                )));
            }
        }

        self.storage.atomically(|s| {
            let loads = s.list_loads()?;
            let in_use: HashSet<&str> = loads.values().map(String::as_str).collect();
            if let Some(unknown) = ordered.iter().find(|l| !in_use.contains(l.as_str())) {
                return Err(BoardError::Validation(format!(
                    "load {unknown} has no orders assigned"
                )));
            }
            let priorities: BTreeMap<String, u32> = ordered
                .iter()
                .enumerate()
                .map(|(i, load)| (load.clone(), i as u32 + 1))
                .collect();
            s.replace_priorities(&priorities)?;

            tracing::info!(loads = ordered.len(), "priorities replaced");
            Ok(s.load_board()?)
        })
    }

    /// Replaces the physical lines serving an order line. An empty list
    /// clears the assignment.
    pub fn assign_lines(
        &self,
        order_id: u64,
        standard_id: &str,
        lines: &[String],
    ) -> Result<BoardState> {
        let standard_id = require_text("standard id", standard_id)?;
        if lines.iter().any(|l| l.trim().is_empty()) {
            return Err(BoardError::Validation("line names must not be empty".into()));
        }

        let line = LineKey::new(order_id, standard_id);
        self.storage.atomically(|s| {
            s.replace_line_assignment(&line, lines)?;
            tracing::info!(%line, lines = lines.len(), "lines assigned");
            Ok(s.load_board()?)
        })
    }
}

fn require_text<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BoardError::Validation(format!("{what} is required")));
    }
    Ok(value)
}

fn require_outfeed(board: &BoardState, id: OutfeedId) -> Result<()> {
    if board.outfeed(id).is_none() {
        return Err(BoardError::Validation(format!("unknown outfeed {id}")));
    }
    Ok(())
}

/// Writes back the queues of `touched` outfeeds.
fn write_queues(s: &Storage, queues: &Queues, touched: &BTreeSet<OutfeedId>) -> Result<()> {
    for outfeed in touched {
        let entries = queues.get(outfeed).map_or(&[][..], Vec::as_slice);
        debug_assert!(sequencer::is_contiguous(entries), "gap in outfeed {outfeed}");
        s.replace_queue(*outfeed, entries)?;
    }
    Ok(())
}

/// Hex SHA-256 over the snapshot, independent of the feed's row order.
fn feed_digest(orders: &[Order]) -> Result<String> {
    let mut sorted: Vec<&Order> = orders.iter().collect();
    sorted.sort_by(|a, b| (a.order_id, &a.standard_id).cmp(&(b.order_id, &b.standard_id)));
    let json = serde_json::to_vec(&sorted).map_err(StorageError::from)?;
    Ok(hex::encode(Sha256::digest(&json)))
}

fn short(digest: &str) -> &str {
    &digest[..digest.len().min(12)]
}

fn log_summary(summary: &RunSummary, pruned: usize) {
    if summary.is_empty() {
        tracing::debug!(pruned, "nothing to release");
        return;
    }
    tracing::info!(
        retired = ?summary.retired_tags,
        released_loads = ?summary.released_loads,
        released_priorities = ?summary.released_priorities,
        completed_lines = summary.completed_lines.len(),
        orphaned_lines = summary.orphaned_lines.len(),
        orphaned_orders = summary.orphaned_orders.len(),
        orphaned_tags = summary.orphaned_tags.len(),
        pruned,
        "reconciliation changes"
    );
}
