//! Planning board types: outfeeds, queue entries, line assignments, and the
//! aggregated board state returned to callers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{LineKey, OutfeedStatus};

/// Outfeed identifier, as stored in the outfeed catalog.
pub type OutfeedId = i64;

/// Per-outfeed queues, each sorted by sequence.
pub type Queues = BTreeMap<OutfeedId, Vec<QueueEntry>>;

/// A physical packing output channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outfeed {
    pub id: OutfeedId,
    pub name: String,
    pub status: OutfeedStatus,
}

/// One unit of planned work in an outfeed's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Load name plus a zero-padded counter, e.g. `A007`.
    pub tag: String,
    pub line: LineKey,
    /// 1-based position, contiguous within the outfeed.
    pub sequence: u32,
}

/// The physical lines serving one logical order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineAssignment {
    pub line: LineKey,
    pub lines: Vec<String>,
}

/// Everything the planning board tracks, as one consistent snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
    /// `order_id → load name`.
    pub loads: BTreeMap<u64, String>,
    /// `load name → rank`, ranks dense from 1.
    pub priorities: BTreeMap<String, u32>,
    pub line_assignments: Vec<LineAssignment>,
    pub queues: Queues,
    pub outfeeds: Vec<Outfeed>,
}

impl BoardState {
    /// Load names ordered by priority rank.
    pub fn ranked_loads(&self) -> Vec<&str> {
        let mut ranked: Vec<(&str, u32)> = self
            .priorities
            .iter()
            .map(|(name, rank)| (name.as_str(), *rank))
            .collect();
        ranked.sort_by_key(|(_, rank)| *rank);
        ranked.into_iter().map(|(name, _)| name).collect()
    }

    pub fn outfeed(&self, id: OutfeedId) -> Option<&Outfeed> {
        self.outfeeds.iter().find(|o| o.id == id)
    }
}
