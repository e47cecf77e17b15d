//! Reconciliation: re-derives the board from a fresh order snapshot.
//!
//! This module only computes. [`plan_reconciliation`] takes the persisted
//! board and the feed snapshot and returns the board it should become; the
//! caller applies the result in one transaction.
//!
//! Phases, in order:
//!
//! 1. Queue advancement: queue entries for lines the feed no longer reports
//!    are dropped, then a complete line at the head of an outfeed retires
//!    its tag from every outfeed. Repeats until no head is complete.
//! 2. Load release: a load with a shipped or all-closed order loses its
//!    letter; a load whose lines are all complete loses only its rank.
//! 3. Priority repack: surviving ranks become dense `1..=N`, order kept.
//! 4. Orphan cleanup: loads and line assignments for orders the feed no
//!    longer reports are dropped.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::classify::{self, DonePolicy};
use crate::model::{BoardState, LineKey, Order, OutfeedId, PackingStatus, Queues};
use crate::sequencer;

/// What a reconciliation changed, kept in the run history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Tags retired because their line finished at the head of a queue.
    pub retired_tags: Vec<String>,
    /// Loads deleted outright (shipped or closed).
    pub released_loads: Vec<String>,
    /// Loads that kept their letter but dropped out of the priority order.
    pub released_priorities: Vec<String>,
    /// Line assignments removed because the line is done or shipped.
    pub completed_lines: Vec<LineKey>,
    /// Line assignments removed because the feed no longer reports the line.
    pub orphaned_lines: Vec<LineKey>,
    /// Orders whose load assignment was removed because the feed dropped them.
    pub orphaned_orders: Vec<u64>,
    /// Queue tags removed because the feed no longer reports their line.
    pub orphaned_tags: Vec<String>,
}

impl RunSummary {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The computed outcome of one reconciliation.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Order ids whose load assignment must be deleted.
    pub removed_loads: BTreeSet<u64>,
    /// Line assignments to delete.
    pub removed_lines: BTreeSet<LineKey>,
    /// The complete new priority mapping.
    pub priorities: BTreeMap<String, u32>,
    /// All queues after advancement and cleanup.
    pub queues: Queues,
    /// Outfeeds whose queue changed and must be rewritten.
    pub touched_outfeeds: BTreeSet<OutfeedId>,
    /// Status of every line in the snapshot, after queue advancement.
    pub statuses: BTreeMap<LineKey, PackingStatus>,
    pub summary: RunSummary,
}

/// Computes the board that `state` should become given `orders`.
pub fn plan_reconciliation(
    state: &BoardState,
    orders: &[Order],
    policy: DonePolicy,
) -> Reconciliation {
    let mut summary = RunSummary::default();
    let mut queues = state.queues.clone();
    let mut touched_outfeeds = BTreeSet::new();
    let present_lines: HashSet<LineKey> = orders.iter().map(Order::line).collect();

    // Entries for lines the feed dropped leave the queues before advancement.
    let orphaned_tags: HashSet<String> = queues
        .values()
        .flatten()
        .filter(|e| !present_lines.contains(&e.line))
        .map(|e| e.tag.clone())
        .collect();
    if !orphaned_tags.is_empty() {
        touched_outfeeds.extend(sequencer::remove_all(&mut queues, &orphaned_tags));
        summary.orphaned_tags = orphaned_tags.into_iter().collect();
        summary.orphaned_tags.sort();
    }

    // Completeness never depends on queue position, so one pass is enough
    // to know which lines are finished.
    let being_packed = classify::being_packed_lines(&queues, &state.outfeeds);
    let initial = classify::classify_all(orders, &being_packed, policy);
    let complete: HashSet<&LineKey> = initial
        .iter()
        .filter(|(_, status)| status.is_complete())
        .map(|(line, _)| line)
        .collect();

    loop {
        let finished_heads: HashSet<String> = queues
            .values()
            .filter_map(|entries| entries.iter().find(|e| e.sequence == 1))
            .filter(|head| complete.contains(&head.line))
            .map(|head| head.tag.clone())
            .collect();
        if finished_heads.is_empty() {
            break;
        }
        touched_outfeeds.extend(sequencer::remove_all(&mut queues, &finished_heads));
        let mut retired: Vec<String> = finished_heads.into_iter().collect();
        retired.sort();
        summary.retired_tags.extend(retired);
    }

    let released = release_loads(state, orders, &initial);
    summary.released_loads = released.letters.iter().cloned().collect();
    summary.released_priorities = released
        .priorities
        .iter()
        .filter(|load| state.priorities.contains_key(*load))
        .cloned()
        .collect();

    let present_orders: HashSet<u64> = orders.iter().map(|o| o.order_id).collect();

    let mut removed_loads = BTreeSet::new();
    for (order_id, load) in &state.loads {
        if released.letters.contains(load) {
            removed_loads.insert(*order_id);
        } else if !present_orders.contains(order_id) {
            removed_loads.insert(*order_id);
            summary.orphaned_orders.push(*order_id);
        }
    }

    let mut removed_lines = BTreeSet::new();
    for assignment in &state.line_assignments {
        if !present_lines.contains(&assignment.line) {
            summary.orphaned_lines.push(assignment.line.clone());
            removed_lines.insert(assignment.line.clone());
        } else if complete.contains(&assignment.line) {
            summary.completed_lines.push(assignment.line.clone());
            removed_lines.insert(assignment.line.clone());
        }
    }

    let loads_in_use: HashSet<&str> = state
        .loads
        .iter()
        .filter(|(order_id, _)| !removed_loads.contains(*order_id))
        .map(|(_, load)| load.as_str())
        .collect();
    let priorities = repack_priorities(&state.priorities, |load| {
        loads_in_use.contains(load)
            && !released.letters.contains(load)
            && !released.priorities.contains(load)
    });

    let being_packed = classify::being_packed_lines(&queues, &state.outfeeds);
    let statuses = classify::classify_all(orders, &being_packed, policy);

    Reconciliation {
        removed_loads,
        removed_lines,
        priorities,
        queues,
        touched_outfeeds,
        statuses,
        summary,
    }
}

struct ReleasedLoads {
    letters: BTreeSet<String>,
    priorities: BTreeSet<String>,
}

fn release_loads(
    state: &BoardState,
    orders: &[Order],
    statuses: &BTreeMap<LineKey, PackingStatus>,
) -> ReleasedLoads {
    let mut members: BTreeMap<&str, Vec<&Order>> = BTreeMap::new();
    for order in orders {
        if let Some(load) = state.loads.get(&order.order_id) {
            members.entry(load.as_str()).or_default().push(order);
        }
    }

    let mut released = ReleasedLoads {
        letters: BTreeSet::new(),
        priorities: BTreeSet::new(),
    };
    for (load, orders) in members {
        let any_shipped = orders.iter().any(|o| o.shipped > 0.0);
        let all_closed = orders.iter().all(|o| o.is_closed());
        let all_complete = orders
            .iter()
            .all(|o| statuses.get(&o.line()).is_some_and(|s| s.is_complete()));

        if any_shipped || all_closed {
            released.letters.insert(load.to_string());
        } else if all_complete {
            released.priorities.insert(load.to_string());
        }
    }
    released
}

/// Keeps the entries `keep` accepts and renumbers them `1..=N` in order of
/// their previous rank.
pub fn repack_priorities(
    priorities: &BTreeMap<String, u32>,
    keep: impl Fn(&str) -> bool,
) -> BTreeMap<String, u32> {
    let mut surviving: Vec<(&String, u32)> = priorities
        .iter()
        .filter(|(load, _)| keep(load))
        .map(|(load, rank)| (load, *rank))
        .collect();
    surviving.sort_by_key(|(_, rank)| *rank);
    surviving
        .into_iter()
        .enumerate()
        .map(|(i, (load, _))| (load.clone(), i as u32 + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{LineAssignment, OrderState, Outfeed, OutfeedStatus, QueueEntry};

    fn order(order_id: u64, requested: f64, assigned: f64, shipped: f64) -> Order {
        Order {
            order_id,
            standard_id: "S1".into(),
            requested,
            assigned,
            shipped,
            boxes_per_pallet: 1.0,
            state: OrderState::Open,
            order_number: None,
        }
    }

    fn entry(tag: &str, order_id: u64, sequence: u32) -> QueueEntry {
        QueueEntry {
            tag: tag.into(),
            line: LineKey::new(order_id, "S1"),
            sequence,
        }
    }

    fn outfeed(id: OutfeedId, status: OutfeedStatus) -> Outfeed {
        Outfeed {
            id,
            name: format!("outfeed-{id}"),
            status,
        }
    }

    #[test]
    fn done_load_keeps_letter_and_loses_rank() {
        let mut state = BoardState::default();
        state.loads.insert(1, "A".into());
        state.loads.insert(2, "B".into());
        state.priorities.insert("A".into(), 1);
        state.priorities.insert("B".into(), 2);

        // A: fully assigned, not shipped. B: shipped.
        let orders = vec![order(1, 10.0, 10.0, 0.0), order(2, 10.0, 0.0, 10.0)];
        let rec = plan_reconciliation(&state, &orders, DonePolicy::Ratio);

        assert_eq!(rec.summary.released_priorities, vec!["A".to_string()]);
        assert_eq!(rec.summary.released_loads, vec!["B".to_string()]);
        assert_eq!(rec.removed_loads, BTreeSet::from([2]));
        assert!(rec.priorities.is_empty());
    }

    #[test]
    fn closed_load_is_released_entirely() {
        let mut state = BoardState::default();
        state.loads.insert(1, "A".into());
        state.loads.insert(2, "A".into());
        state.priorities.insert("A".into(), 1);

        let mut first = order(1, 10.0, 0.0, 0.0);
        first.state = OrderState::Closed;
        let mut second = order(2, 10.0, 3.0, 0.0);
        second.state = OrderState::Closed;

        let rec = plan_reconciliation(&state, &[first, second], DonePolicy::Ratio);
        assert_eq!(rec.removed_loads, BTreeSet::from([1, 2]));
        assert!(rec.priorities.is_empty());
    }

    #[test]
    fn partially_closed_load_is_kept() {
        let mut state = BoardState::default();
        state.loads.insert(1, "A".into());
        state.loads.insert(2, "A".into());
        state.priorities.insert("A".into(), 1);

        let mut first = order(1, 10.0, 0.0, 0.0);
        first.state = OrderState::Closed;
        let second = order(2, 10.0, 3.0, 0.0);

        let rec = plan_reconciliation(&state, &[first, second], DonePolicy::Ratio);
        assert!(rec.removed_loads.is_empty());
        assert_eq!(rec.priorities.get("A"), Some(&1));
    }

    #[test]
    fn surviving_priorities_are_repacked_in_order() {
        let mut state = BoardState::default();
        for (id, load, rank) in [(1, "A", 1), (2, "B", 2), (3, "C", 3), (4, "D", 4)] {
            state.loads.insert(id, load.into());
            state.priorities.insert(load.into(), rank);
        }
        let orders = vec![
            order(1, 10.0, 0.0, 0.0),
            order(2, 10.0, 0.0, 5.0),
            order(3, 10.0, 2.0, 0.0),
            order(4, 10.0, 10.0, 0.0),
        ];

        let rec = plan_reconciliation(&state, &orders, DonePolicy::Ratio);
        assert_eq!(
            rec.priorities,
            BTreeMap::from([("A".to_string(), 1), ("C".to_string(), 2)])
        );
    }

    #[test]
    fn finished_head_is_retired_and_queue_advances() {
        let mut state = BoardState::default();
        state.outfeeds.push(outfeed(1, OutfeedStatus::Running));
        state
            .queues
            .insert(1, vec![entry("X001", 1, 1), entry("X002", 2, 2)]);

        let orders = vec![order(1, 10.0, 10.0, 0.0), order(2, 10.0, 0.0, 0.0)];
        let rec = plan_reconciliation(&state, &orders, DonePolicy::Ratio);

        assert_eq!(rec.summary.retired_tags, vec!["X001".to_string()]);
        assert_eq!(rec.queues[&1], vec![entry("X002", 2, 1)]);
        assert_eq!(rec.touched_outfeeds, BTreeSet::from([1]));
        assert_eq!(
            rec.statuses[&LineKey::new(2, "S1")],
            PackingStatus::BeingPacked
        );
    }

    #[test]
    fn retirement_removes_tag_from_every_outfeed() {
        let mut state = BoardState::default();
        state.outfeeds.push(outfeed(1, OutfeedStatus::Running));
        state.outfeeds.push(outfeed(2, OutfeedStatus::Paused));
        state
            .queues
            .insert(1, vec![entry("X001", 1, 1), entry("X002", 2, 2)]);
        state
            .queues
            .insert(2, vec![entry("Y001", 3, 1), entry("X001", 1, 2)]);

        let orders = vec![
            order(1, 10.0, 10.0, 0.0),
            order(2, 10.0, 0.0, 0.0),
            order(3, 10.0, 0.0, 0.0),
        ];
        let rec = plan_reconciliation(&state, &orders, DonePolicy::Ratio);

        assert_eq!(rec.queues[&1], vec![entry("X002", 2, 1)]);
        assert_eq!(rec.queues[&2], vec![entry("Y001", 3, 1)]);
        assert_eq!(rec.touched_outfeeds, BTreeSet::from([1, 2]));
    }

    #[test]
    fn advancement_continues_past_consecutive_finished_heads() {
        let mut state = BoardState::default();
        state.outfeeds.push(outfeed(1, OutfeedStatus::Running));
        state.queues.insert(
            1,
            vec![entry("X001", 1, 1), entry("X002", 2, 2), entry("X003", 3, 3)],
        );
        let orders = vec![
            order(1, 10.0, 10.0, 0.0),
            order(2, 10.0, 0.0, 4.0),
            order(3, 10.0, 0.0, 0.0),
        ];

        let rec = plan_reconciliation(&state, &orders, DonePolicy::Ratio);
        assert_eq!(
            rec.summary.retired_tags,
            vec!["X001".to_string(), "X002".to_string()]
        );
        assert_eq!(rec.queues[&1], vec![entry("X003", 3, 1)]);
    }

    #[test]
    fn finished_line_behind_the_head_stays_queued() {
        let mut state = BoardState::default();
        state.outfeeds.push(outfeed(1, OutfeedStatus::Running));
        state
            .queues
            .insert(1, vec![entry("X001", 1, 1), entry("X002", 2, 2)]);
        let orders = vec![order(1, 10.0, 2.0, 0.0), order(2, 10.0, 10.0, 0.0)];

        let rec = plan_reconciliation(&state, &orders, DonePolicy::Ratio);
        assert!(rec.summary.retired_tags.is_empty());
        assert_eq!(rec.queues[&1].len(), 2);
        assert!(rec.touched_outfeeds.is_empty());
    }

    #[test]
    fn orphans_are_cleaned_up() {
        let mut state = BoardState::default();
        state.loads.insert(1, "A".into());
        state.loads.insert(9, "A".into());
        state.priorities.insert("A".into(), 1);
        state.line_assignments.push(LineAssignment {
            line: LineKey::new(9, "S1"),
            lines: vec!["L1".into()],
        });
        state.outfeeds.push(outfeed(1, OutfeedStatus::Paused));
        state
            .queues
            .insert(1, vec![entry("A001", 9, 1), entry("A002", 1, 2)]);

        let orders = vec![order(1, 10.0, 0.0, 0.0)];
        let rec = plan_reconciliation(&state, &orders, DonePolicy::Ratio);

        assert_eq!(rec.removed_loads, BTreeSet::from([9]));
        assert_eq!(rec.summary.orphaned_orders, vec![9]);
        assert_eq!(rec.removed_lines, BTreeSet::from([LineKey::new(9, "S1")]));
        assert_eq!(rec.summary.orphaned_tags, vec!["A001".to_string()]);
        assert_eq!(rec.queues[&1], vec![entry("A002", 1, 1)]);
        assert_eq!(rec.priorities.get("A"), Some(&1));
    }

    #[test]
    fn orphan_at_the_head_does_not_block_advancement() {
        let mut state = BoardState::default();
        for order_id in [1, 2, 9] {
            state.loads.insert(order_id, "X".into());
        }
        state.outfeeds.push(outfeed(1, OutfeedStatus::Running));
        state.queues.insert(
            1,
            vec![entry("X001", 9, 1), entry("X002", 1, 2), entry("X003", 2, 3)],
        );
        let orders = vec![order(1, 10.0, 10.0, 0.0), order(2, 10.0, 0.0, 0.0)];

        let first = plan_reconciliation(&state, &orders, DonePolicy::Ratio);
        assert_eq!(first.summary.orphaned_tags, vec!["X001".to_string()]);
        assert_eq!(first.summary.retired_tags, vec!["X002".to_string()]);
        assert_eq!(first.queues[&1], vec![entry("X003", 2, 1)]);

        let mut next = state.clone();
        next.loads.retain(|id, _| !first.removed_loads.contains(id));
        next.priorities = first.priorities.clone();
        next.queues = first.queues.clone();

        let second = plan_reconciliation(&next, &orders, DonePolicy::Ratio);
        assert!(second.summary.is_empty(), "{:?}", second.summary);
        assert!(second.touched_outfeeds.is_empty());
        assert_eq!(second.queues, next.queues);
    }

    #[test]
    fn load_whose_orders_all_vanished_loses_its_rank() {
        let mut state = BoardState::default();
        state.loads.insert(1, "A".into());
        state.loads.insert(2, "B".into());
        state.priorities.insert("A".into(), 1);
        state.priorities.insert("B".into(), 2);

        let rec = plan_reconciliation(&state, &[order(2, 10.0, 0.0, 0.0)], DonePolicy::Ratio);
        assert_eq!(rec.priorities, BTreeMap::from([("B".to_string(), 1)]));
    }

    #[test]
    fn completed_line_assignments_are_removed() {
        let mut state = BoardState::default();
        state.loads.insert(1, "A".into());
        state.loads.insert(2, "A".into());
        state.line_assignments.push(LineAssignment {
            line: LineKey::new(1, "S1"),
            lines: vec!["L1".into(), "L2".into()],
        });
        state.line_assignments.push(LineAssignment {
            line: LineKey::new(2, "S1"),
            lines: vec!["L1".into()],
        });

        let orders = vec![order(1, 10.0, 10.0, 0.0), order(2, 10.0, 1.0, 0.0)];
        let rec = plan_reconciliation(&state, &orders, DonePolicy::Ratio);

        assert_eq!(rec.removed_lines, BTreeSet::from([LineKey::new(1, "S1")]));
        assert_eq!(rec.summary.completed_lines, vec![LineKey::new(1, "S1")]);
    }

    #[test]
    fn second_pass_over_the_same_feed_changes_nothing() {
        let mut state = BoardState::default();
        state.loads.insert(1, "A".into());
        state.loads.insert(2, "B".into());
        state.loads.insert(3, "C".into());
        state.priorities.insert("A".into(), 1);
        state.priorities.insert("B".into(), 2);
        state.priorities.insert("C".into(), 3);
        state.outfeeds.push(outfeed(1, OutfeedStatus::Running));
        state
            .queues
            .insert(1, vec![entry("A001", 1, 1), entry("C001", 3, 2)]);
        let orders = vec![
            order(1, 10.0, 10.0, 0.0),
            order(2, 10.0, 0.0, 1.0),
            order(3, 10.0, 0.0, 0.0),
        ];

        let first = plan_reconciliation(&state, &orders, DonePolicy::Ratio);
        let mut next = state.clone();
        next.loads.retain(|id, _| !first.removed_loads.contains(id));
        next
            .line_assignments
            .retain(|a| !first.removed_lines.contains(&a.line));
        next.priorities = first.priorities.clone();
        next.queues = first.queues.clone();

        let second = plan_reconciliation(&next, &orders, DonePolicy::Ratio);
        assert!(second.removed_loads.is_empty());
        assert!(second.removed_lines.is_empty());
        assert!(second.touched_outfeeds.is_empty());
        assert_eq!(second.priorities, next.priorities);
        assert_eq!(second.queues, next.queues);
        assert!(second.summary.is_empty(), "{:?}", second.summary);
    }

    #[test]
    fn repack_preserves_relative_order() {
        let priorities = BTreeMap::from([
            ("A".to_string(), 4),
            ("B".to_string(), 1),
            ("C".to_string(), 7),
            ("D".to_string(), 2),
        ]);
        let repacked = repack_priorities(&priorities, |load| load != "D");
        assert_eq!(
            repacked,
            BTreeMap::from([
                ("B".to_string(), 1),
                ("A".to_string(), 2),
                ("C".to_string(), 3),
            ])
        );
    }
}
