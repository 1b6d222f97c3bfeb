//! Snapshot differencing.
//!
//! Two identities are in play. A node's exact identity is its
//! [`ValueKey`](crate::model::ValueKey) (address, size, bytes); its slot is its
//! [`SlotKey`] (address, size). Nodes identical in both graphs drop out first;
//! among the rest, a slot present on both sides is *changed*, a slot only in
//! the older graph is *removed*, and a slot only in the newer one is *added*.
//!
//! A freed slot reused by an unrelated allocation of the same size is
//! reported as changed; slot identity cannot tell the two apart.

pub mod keys;
pub mod segments;
pub mod subgraph;

use std::collections::{BTreeSet, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::graph::MemoryGraph;
use crate::model::{Segment, SlotKey};

pub use keys::{keyed_difference, keyed_intersection, keyed_union};
pub use segments::diff_segments;
pub use subgraph::{extract_diff_subgraph, DiffSubgraph};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("no snapshots to diff")]
    EmptySnapshotSequence,
}

/// Classification of one consecutive pair of snapshots.
#[derive(Debug, Clone, Default)]
pub struct PairDiff<'a> {
    /// Changed slots, as the older graph holds them.
    pub changed_in_older: Vec<&'a Segment>,
    /// Changed slots, as the newer graph holds them.
    pub changed_in_newer: Vec<&'a Segment>,
    pub removed: Vec<&'a Segment>,
    pub added: Vec<&'a Segment>,
}

/// Diff `older` against `newer`.
pub fn diff_pair<'a>(older: &'a MemoryGraph, newer: &'a MemoryGraph) -> PairDiff<'a> {
    let old_nodes: Vec<&Segment> = older.nodes().collect();
    let new_nodes: Vec<&Segment> = newer.nodes().collect();

    let only_old = keyed_difference(&old_nodes, &new_nodes, Segment::value_key);
    let only_new = keyed_difference(&new_nodes, &old_nodes, Segment::value_key);

    let changed_in_older = keyed_intersection(&only_old, &only_new, Segment::slot_key);
    let changed_in_newer = keyed_intersection(&only_new, &only_old, Segment::slot_key);
    let removed = keyed_difference(&only_old, &changed_in_older, Segment::slot_key);
    let added = keyed_difference(&only_new, &changed_in_newer, Segment::slot_key);

    PairDiff { changed_in_older, changed_in_newer, removed, added }
}

/// Aggregate classification over a snapshot sequence.
///
/// Each set is sorted by address and holds a slot at most once. `changed`
/// and `added` carry the final snapshot's version of a node when it has one.
#[derive(Debug, Clone, Default)]
pub struct SequenceDiff {
    pub changed: Vec<Segment>,
    pub removed: Vec<Segment>,
    pub added: Vec<Segment>,
}

impl SequenceDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty() && self.added.is_empty()
    }

    pub fn changed_slots(&self) -> BTreeSet<SlotKey> {
        self.changed.iter().map(Segment::slot_key).collect()
    }

    pub fn removed_slots(&self) -> BTreeSet<SlotKey> {
        self.removed.iter().map(Segment::slot_key).collect()
    }

    pub fn added_slots(&self) -> BTreeSet<SlotKey> {
        self.added.iter().map(Segment::slot_key).collect()
    }

    pub fn summary(&self) -> DiffSummary {
        let ids = |nodes: &[Segment]| -> Vec<String> { nodes.iter().map(Segment::identity).collect() };
        DiffSummary {
            changed: ids(&self.changed),
            removed: ids(&self.removed),
            added: ids(&self.added),
        }
    }

    fn from_refs(changed: Vec<&Segment>, removed: Vec<&Segment>, added: Vec<&Segment>) -> Self {
        let owned = |nodes: Vec<&Segment>| {
            let mut nodes: Vec<Segment> = nodes.into_iter().cloned().collect();
            nodes.sort_by_key(Segment::slot_key);
            nodes
        };
        Self { changed: owned(changed), removed: owned(removed), added: owned(added) }
    }
}

/// Node identity strings of a [`SequenceDiff`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub changed: Vec<String>,
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

/// Diff an ordered snapshot sequence.
///
/// - changed: slots changed at every consecutive step
/// - removed: slots removed at any step
/// - added: slots added at any step, never removed later, and still present
///   in the last snapshot
///
/// A single snapshot has nothing to compare against and yields empty sets.
pub fn diff_sequence(graphs: &[MemoryGraph]) -> Result<SequenceDiff, DiffError> {
    let last = graphs.last().ok_or(DiffError::EmptySnapshotSequence)?;
    if graphs.len() == 1 {
        return Ok(SequenceDiff::default());
    }

    let pairs: Vec<PairDiff<'_>> = graphs
        .par_windows(2)
        .filter_map(|pair| match pair {
            [older, newer] => Some(diff_pair(older, newer)),
            _ => None,
        })
        .collect();

    let mut steps = pairs.iter();
    let mut changed = steps.next().map(|p| p.changed_in_older.clone()).unwrap_or_default();
    for pair in steps {
        changed = keyed_intersection(&changed, &pair.changed_in_older, Segment::slot_key);
    }
    let removed = pairs
        .iter()
        .fold(Vec::new(), |acc, p| keyed_union(&acc, &p.removed, Segment::slot_key));
    let added_any =
        pairs.iter().fold(Vec::new(), |acc, p| keyed_union(&acc, &p.added, Segment::slot_key));
    let persistent = keyed_difference(&added_any, &removed, Segment::slot_key);

    let last_nodes: Vec<&Segment> = last.nodes().collect();
    let added = keyed_intersection(&last_nodes, &persistent, Segment::slot_key);
    let by_slot: HashMap<SlotKey, &Segment> =
        last_nodes.iter().map(|n| (n.slot_key(), *n)).collect();
    let changed = changed
        .into_iter()
        .map(|node| by_slot.get(&node.slot_key()).copied().unwrap_or(node))
        .collect();

    let diff = SequenceDiff::from_refs(changed, removed, added);
    debug!(
        "{} snapshots: {} changed, {} removed, {} added",
        graphs.len(),
        diff.changed.len(),
        diff.removed.len(),
        diff.added.len()
    );
    Ok(diff)
}

/// Last snapshot compared with a known-clean run.
#[derive(Debug, Clone, Default)]
pub struct ControlSignal {
    pub diff: SequenceDiff,
    /// Primary changed or added slots that also differ against the clean run.
    pub noisy: Vec<SlotKey>,
}

/// Primary diff plus an optional advisory control signal.
#[derive(Debug, Clone, Default)]
pub struct DiffReport {
    pub primary: SequenceDiff,
    pub control: Option<ControlSignal>,
}

/// Diff a snapshot sequence, and compare its last snapshot with `negative`
/// when given. The control signal never alters the primary result.
pub fn diff_snapshots(
    graphs: &[MemoryGraph],
    negative: Option<&MemoryGraph>,
) -> Result<DiffReport, DiffError> {
    let primary = diff_sequence(graphs)?;
    let control = match (negative, graphs.last()) {
        (Some(negative), Some(last)) => Some(control_signal(&primary, last, negative)),
        _ => None,
    };
    Ok(DiffReport { primary, control })
}

fn control_signal(primary: &SequenceDiff, last: &MemoryGraph, negative: &MemoryGraph) -> ControlSignal {
    let pair = diff_pair(last, negative);
    let diff = SequenceDiff::from_refs(pair.changed_in_older, pair.removed, pair.added);
    let differing: BTreeSet<SlotKey> =
        diff.changed_slots().into_iter().chain(diff.removed_slots()).collect();
    let noisy = primary
        .changed_slots()
        .into_iter()
        .chain(primary.added_slots())
        .filter(|slot| differing.contains(slot))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    ControlSignal { diff, noisy }
}
