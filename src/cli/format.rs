//! Output formatting for CLI display.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::model::{BoardState, LineKey};
use crate::reconcile::RunSummary;
use crate::storage::RunRecord;

/// Render the whole board for a terminal.
pub(super) fn format_board(board: &BoardState) -> String {
    let mut out = String::new();

    out.push_str("Outfeeds\n");
    if board.outfeeds.is_empty() {
        out.push_str("  (none registered)\n");
    }
    for outfeed in &board.outfeeds {
        let _ = writeln!(out, "  {}  {}  [{}]", outfeed.id, outfeed.name, outfeed.status);
        match board.queues.get(&outfeed.id).filter(|q| !q.is_empty()) {
            None => out.push_str("     (empty)\n"),
            Some(queue) => {
                for entry in queue {
                    let _ = writeln!(out, "     {}. {}  {}", entry.sequence, entry.tag, entry.line);
                }
            }
        }
    }

    let ranked = board.ranked_loads();
    if !ranked.is_empty() {
        out.push_str("Priorities\n");
        for (i, load) in ranked.iter().enumerate() {
            let _ = writeln!(out, "  {}. {load}", i + 1);
        }
    }

    if !board.loads.is_empty() {
        out.push_str("Loads\n");
        let mut by_load: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (order_id, load) in &board.loads {
            by_load.entry(load).or_default().push(order_id.to_string());
        }
        for (load, orders) in by_load {
            let _ = writeln!(out, "  {load}: {}", orders.join(", "));
        }
    }

    if !board.line_assignments.is_empty() {
        out.push_str("Lines\n");
        for assignment in &board.line_assignments {
            let _ = writeln!(out, "  {}: {}", assignment.line, assignment.lines.join(", "));
        }
    }

    out
}

/// One-line description of what a reconciliation changed.
pub(super) fn format_summary(summary: &RunSummary) -> String {
    if summary.is_empty() {
        return "no changes".to_string();
    }

    let mut parts = Vec::new();
    if !summary.retired_tags.is_empty() {
        parts.push(format!("retired {}", summary.retired_tags.join(", ")));
    }
    if !summary.released_loads.is_empty() {
        parts.push(format!("released loads {}", summary.released_loads.join(", ")));
    }
    if !summary.released_priorities.is_empty() {
        parts.push(format!(
            "dropped priority of {}",
            summary.released_priorities.join(", ")
        ));
    }
    if !summary.completed_lines.is_empty() {
        parts.push(format!("completed {}", join_lines(&summary.completed_lines)));
    }
    let orphans = summary.orphaned_lines.len()
        + summary.orphaned_orders.len()
        + summary.orphaned_tags.len();
    if orphans > 0 {
        parts.push(format!("cleaned {orphans} orphaned record(s)"));
    }
    parts.join("; ")
}

/// One line per run: short id, time, feed size, and changes.
pub(super) fn format_run(run: &RunRecord) -> String {
    let short_id = &run.id.to_string()[..8];
    format!(
        "{short_id}  {}  {} order(s)  {}",
        run.reconciled_at,
        run.order_count,
        format_summary(&run.summary)
    )
}

fn join_lines(lines: &[LineKey]) -> String {
    lines
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
