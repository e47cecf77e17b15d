//! Completion classifier: derives a line's packing status from its
//! quantities and from whether it is currently being packed.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{LineKey, Order, Outfeed, OutfeedStatus, PackingStatus, Queues};

/// How a line is judged `done` when it has not shipped yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DonePolicy {
    /// Assigned pallets cover requested pallets.
    #[default]
    Ratio,

    /// Shipped equals requested (to two decimals), or assigned covers requested.
    StrictShipped,
}

/// Classifies one order line. First matching rule wins.
pub fn classify(order: &Order, being_packed: bool, policy: DonePolicy) -> PackingStatus {
    if order.shipped > 0.0 {
        return PackingStatus::Shipped;
    }
    if is_done(order, policy) {
        return PackingStatus::Done;
    }
    if being_packed {
        return PackingStatus::BeingPacked;
    }
    if order.assigned > 0.0 {
        return PackingStatus::Partially;
    }
    PackingStatus::Pending
}

#[allow(clippy::float_cmp)]
fn is_done(order: &Order, policy: DonePolicy) -> bool {
    match policy {
        DonePolicy::Ratio => {
            let per_pallet = if order.boxes_per_pallet > 0.0 {
                order.boxes_per_pallet
            } else {
                1.0
            };
            order.requested > 0.0
                && order.assigned / per_pallet >= order.requested / per_pallet
        }
        DonePolicy::StrictShipped => {
            round2(order.shipped) == round2(order.requested) || order.assigned >= order.requested
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Lines sitting at the head of a `RUNNING` outfeed.
pub fn being_packed_lines(queues: &Queues, outfeeds: &[Outfeed]) -> HashSet<LineKey> {
    outfeeds
        .iter()
        .filter(|o| o.status == OutfeedStatus::Running)
        .filter_map(|o| queues.get(&o.id))
        .filter_map(|entries| entries.iter().find(|e| e.sequence == 1))
        .map(|e| e.line.clone())
        .collect()
}

/// Classifies every line of a feed snapshot.
pub fn classify_all(
    orders: &[Order],
    being_packed: &HashSet<LineKey>,
    policy: DonePolicy,
) -> BTreeMap<LineKey, PackingStatus> {
    orders
        .iter()
        .map(|order| {
            let line = order.line();
            let status = classify(order, being_packed.contains(&line), policy);
            (line, status)
        })
        .collect()
}
