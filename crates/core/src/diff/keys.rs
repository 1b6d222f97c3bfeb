//! Set operations over borrowed nodes with an explicit identity key.
//!
//! Callers choose the key per call (`Segment::value_key` for exact identity,
//! `Segment::slot_key` for the same slot regardless of content). Results keep
//! the order of the left operand and hold each key at most once.

use std::collections::HashSet;
use std::hash::Hash;

/// Items of `left` whose key does not appear in `right`.
pub fn keyed_difference<'a, T, K>(
    left: &[&'a T],
    right: &[&'a T],
    key: impl Fn(&'a T) -> K,
) -> Vec<&'a T>
where
    T: ?Sized,
    K: Eq + Hash,
{
    let excluded: HashSet<K> = right.iter().map(|item| key(*item)).collect();
    let mut seen = HashSet::new();
    left.iter()
        .copied()
        .filter(|item| {
            let k = key(*item);
            !excluded.contains(&k) && seen.insert(k)
        })
        .collect()
}

/// Items of `left` whose key also appears in `right`.
pub fn keyed_intersection<'a, T, K>(
    left: &[&'a T],
    right: &[&'a T],
    key: impl Fn(&'a T) -> K,
) -> Vec<&'a T>
where
    T: ?Sized,
    K: Eq + Hash,
{
    let present: HashSet<K> = right.iter().map(|item| key(*item)).collect();
    let mut seen = HashSet::new();
    left.iter()
        .copied()
        .filter(|item| {
            let k = key(*item);
            present.contains(&k) && seen.insert(k)
        })
        .collect()
}

/// Items of `left`, then items of `right` with a key not seen yet.
pub fn keyed_union<'a, T, K>(
    left: &[&'a T],
    right: &[&'a T],
    key: impl Fn(&'a T) -> K,
) -> Vec<&'a T>
where
    T: ?Sized,
    K: Eq + Hash,
{
    let mut seen = HashSet::new();
    left.iter().chain(right.iter()).copied().filter(|item| seen.insert(key(*item))).collect()
}
