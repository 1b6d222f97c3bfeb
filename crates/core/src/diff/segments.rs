//! Byte-level diff of one region across snapshots.

use std::collections::BTreeSet;

use crate::model::Segment;

use super::DiffError;

/// Byte offsets that differ at every consecutive step of `versions`.
///
/// Each step contributes the offsets whose bytes differ plus every offset in
/// the tail the shorter version lacks. Offsets follow the walk direction of
/// the region, so stacks report distances from the top.
pub fn diff_segments(versions: &[&Segment]) -> Result<Vec<u64>, DiffError> {
    if versions.len() < 2 {
        return Err(DiffError::EmptySnapshotSequence);
    }
    let mut steps = versions.windows(2).filter_map(|pair| match pair {
        [older, newer] => Some(diff_pair(older, newer)),
        _ => None,
    });
    let first = steps.next().unwrap_or_default();
    let common = steps.fold(first, |acc, step| acc.intersection(&step).copied().collect());
    Ok(common.into_iter().collect())
}

fn diff_pair(older: &Segment, newer: &Segment) -> BTreeSet<u64> {
    let mut offsets: BTreeSet<u64> = older
        .walk_by_byte()
        .zip(newer.walk_by_byte())
        .filter(|((a, _), (b, _))| a != b)
        .map(|((_, offset), _)| offset)
        .collect();
    let (shorter, longer) = if older.size <= newer.size { (older, newer) } else { (newer, older) };
    let overlap = usize::try_from(shorter.size).unwrap_or(usize::MAX);
    offsets.extend(longer.walk_by_byte().skip(overlap).map(|(_, offset)| offset));
    offsets
}
