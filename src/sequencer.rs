//! Queue sequencer: ordered per-outfeed tag queues.
//!
//! Every operation leaves each touched outfeed with sequences exactly
//! `1..=N`. Operations work on an in-memory copy of the queues; callers
//! persist the result inside the same transaction they read it in.

use std::collections::{BTreeSet, HashSet};

use crate::model::{LineKey, OutfeedId, QueueEntry, Queues};

/// Minimum digits in a generated tag's counter.
const TAG_DIGITS: usize = 3;

/// Errors from queue edits that would break the queue's shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("tag {0} appears more than once in the requested order")]
    DuplicateTag(String),

    #[error("unknown tag: {0}")]
    UnknownTag(String),

    #[error("moved tag {0} is missing from the requested order")]
    MovedTagNotListed(String),
}

/// The tag already carried by `line` in any outfeed, if one exists.
pub fn tag_for_line<'q>(queues: &'q Queues, line: &LineKey) -> Option<&'q str> {
    queues
        .values()
        .flatten()
        .find(|e| &e.line == line)
        .map(|e| e.tag.as_str())
}

/// The next free tag for a load: the load name plus one more than the
/// highest numeric suffix already used under that name anywhere.
pub fn next_tag(queues: &Queues, load: &str) -> String {
    let highest = queues
        .values()
        .flatten()
        .filter_map(|e| tag_counter(&e.tag, load))
        .max()
        .unwrap_or(0);
    format!("{load}{:0width$}", highest + 1, width = TAG_DIGITS)
}

fn tag_counter(tag: &str, load: &str) -> Option<u64> {
    let suffix = tag.strip_prefix(load)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Whether the outfeed already holds `tag`.
pub fn contains(queues: &Queues, outfeed: OutfeedId, tag: &str) -> bool {
    queues
        .get(&outfeed)
        .is_some_and(|entries| entries.iter().any(|e| e.tag == tag))
}

/// Adds `tag` at the end of the outfeed's queue.
pub fn append(queues: &mut Queues, outfeed: OutfeedId, tag: &str, line: &LineKey) {
    let entries = queues.entry(outfeed).or_default();
    let next = entries.iter().map(|e| e.sequence).max().unwrap_or(0) + 1;
    entries.push(QueueEntry {
        tag: tag.to_string(),
        line: line.clone(),
        sequence: next,
    });
}

/// Adds `tag` at the front of the outfeed's queue, shifting everything back.
pub fn prepend(queues: &mut Queues, outfeed: OutfeedId, tag: &str, line: &LineKey) {
    let entries = queues.entry(outfeed).or_default();
    for entry in entries.iter_mut() {
        entry.sequence += 1;
    }
    entries.insert(
        0,
        QueueEntry {
            tag: tag.to_string(),
            line: line.clone(),
            sequence: 1,
        },
    );
}

/// Removes `tag` from one outfeed, or from every outfeed when `outfeed` is
/// `None`, and renumbers what remains.
///
/// Returns the outfeeds that lost an entry.
pub fn remove(queues: &mut Queues, tag: &str, outfeed: Option<OutfeedId>) -> BTreeSet<OutfeedId> {
    let mut affected = BTreeSet::new();
    for (id, entries) in queues.iter_mut() {
        if outfeed.is_some_and(|only| only != *id) {
            continue;
        }
        let before = entries.len();
        entries.retain(|e| e.tag != tag);
        if entries.len() != before {
            renumber(entries);
            affected.insert(*id);
        }
    }
    affected
}

/// Removes every entry whose tag is in `tags`, across all outfeeds.
///
/// Returns the outfeeds that lost an entry.
pub fn remove_all(queues: &mut Queues, tags: &HashSet<String>) -> BTreeSet<OutfeedId> {
    let mut affected = BTreeSet::new();
    for (id, entries) in queues.iter_mut() {
        let before = entries.len();
        entries.retain(|e| !tags.contains(&e.tag));
        if entries.len() != before {
            renumber(entries);
            affected.insert(*id);
        }
    }
    affected
}

/// Moves `moved` from `from` (if it changed outfeeds) and rewrites the
/// destination queue to follow `ordered`.
///
/// Tags in `ordered` that the destination doesn't hold yet are inserted;
/// destination entries missing from `ordered` keep their relative order
/// after the listed ones. Returns the outfeeds whose queue changed.
pub fn reorder_and_move(
    queues: &mut Queues,
    from: Option<OutfeedId>,
    to: OutfeedId,
    moved: &str,
    ordered: &[String],
) -> Result<BTreeSet<OutfeedId>, SequenceError> {
    let mut seen = HashSet::new();
    for tag in ordered {
        if !seen.insert(tag.as_str()) {
            return Err(SequenceError::DuplicateTag(tag.clone()));
        }
    }
    if !seen.contains(moved) {
        return Err(SequenceError::MovedTagNotListed(moved.to_string()));
    }

    // Resolve every listed tag's line before anything is removed.
    let mut lines = Vec::with_capacity(ordered.len());
    for tag in ordered {
        let line = queues
            .values()
            .flatten()
            .find(|e| &e.tag == tag)
            .map(|e| e.line.clone())
            .ok_or_else(|| SequenceError::UnknownTag(tag.clone()))?;
        lines.push(line);
    }

    let mut affected = BTreeSet::new();
    if let Some(source) = from.filter(|source| *source != to) {
        affected.extend(remove(queues, moved, Some(source)));
    }

    let destination = queues.entry(to).or_default();
    let mut rest: Vec<QueueEntry> = destination
        .iter()
        .filter(|e| !seen.contains(e.tag.as_str()))
        .cloned()
        .collect();
    rest.sort_by_key(|e| e.sequence);

    let mut rebuilt: Vec<QueueEntry> = ordered
        .iter()
        .zip(lines)
        .map(|(tag, line)| QueueEntry {
            tag: tag.clone(),
            line,
            sequence: 0,
        })
        .collect();
    rebuilt.extend(rest);
    for (position, entry) in rebuilt.iter_mut().enumerate() {
        entry.sequence = position as u32 + 1;
    }
    *destination = rebuilt;
    affected.insert(to);

    Ok(affected)
}

/// Reassigns `1..=N` in order of prior sequence. Ties keep their current
/// relative order.
pub fn renumber(entries: &mut [QueueEntry]) {
    entries.sort_by_key(|e| e.sequence);
    for (position, entry) in entries.iter_mut().enumerate() {
        entry.sequence = position as u32 + 1;
    }
}

/// Whether the outfeed's sequences are exactly `1..=N`.
pub fn is_contiguous(entries: &[QueueEntry]) -> bool {
    let mut sequences: Vec<u32> = entries.iter().map(|e| e.sequence).collect();
    sequences.sort_unstable();
    sequences
        .iter()
        .enumerate()
        .all(|(i, seq)| *seq == i as u32 + 1)
}
