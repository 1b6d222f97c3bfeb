//! Pointer discovery: scan words, keep plausible pointers, resolve them to
//! the allocation they point into.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PointerBand;
use crate::model::{Segment, WORD_SIZE};

/// Edge label: where in the source the word sits and where in the target it
/// points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pointer {
    pub offset_src: u64,
    pub offset_dest: u64,
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{:#x}", self.offset_src, self.offset_dest)
    }
}

/// A pointer from a scanned region into the structure at `dest` in a
/// [`StructureIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPointer {
    pub dest: usize,
    pub pointer: Pointer,
}

/// Data structures sorted by address, searchable by contained address.
#[derive(Debug, Clone, Default)]
pub struct StructureIndex {
    structures: Vec<Segment>,
}

impl StructureIndex {
    pub fn new(mut structures: Vec<Segment>) -> Self {
        structures.sort_by_key(|ds| ds.address);
        Self { structures }
    }

    /// Index of the structure whose range contains `value`.
    ///
    /// Probes the structure just before the insertion point first (value
    /// inside a structure starting below it), then the one at the insertion
    /// point (value equal to a start address).
    pub fn find(&self, value: u64) -> Option<usize> {
        let insertion = self.structures.partition_point(|ds| ds.address < value);
        let before = insertion.checked_sub(1);
        [before, Some(insertion)]
            .into_iter()
            .flatten()
            .find(|&idx| self.structures.get(idx).is_some_and(|ds| ds.contains(value)))
    }

    pub fn get(&self, idx: usize) -> Option<&Segment> {
        self.structures.get(idx)
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.structures.iter()
    }
}

/// Resolves candidate words against a [`StructureIndex`].
#[derive(Debug, Clone, Copy)]
pub struct PointerResolver<'a> {
    index: &'a StructureIndex,
    band: PointerBand,
}

impl<'a> PointerResolver<'a> {
    pub fn new(index: &'a StructureIndex, band: PointerBand) -> Self {
        Self { index, band }
    }

    /// In the user-space band and word aligned.
    pub fn is_candidate(&self, value: u64) -> bool {
        self.band.contains(value) && value % WORD_SIZE == 0
    }

    /// Structure index and offset inside it for a candidate value.
    pub fn resolve(&self, value: u64) -> Option<(usize, u64)> {
        if !self.is_candidate(value) {
            return None;
        }
        let idx = self.index.find(value)?;
        let ds = self.index.get(idx)?;
        Some((idx, value - ds.address))
    }

    /// Every pointer held by `region`. `own` is the region's own position in
    /// the index when it is itself a data structure; self-edges are dropped.
    pub fn scan(&self, region: &Segment, own: Option<usize>) -> Vec<ResolvedPointer> {
        region
            .walk_by_word()
            .filter_map(|(word, offset_src)| {
                let (dest, offset_dest) = self.resolve(u64::from(word))?;
                (Some(dest) != own)
                    .then_some(ResolvedPointer { dest, pointer: Pointer { offset_src, offset_dest } })
            })
            .collect()
    }
}
