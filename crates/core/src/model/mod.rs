//! Core data model for memory regions recovered from a dump.
//!
//! Every region in a dump is a [`Segment`] tagged with a [`SegmentKind`]:
//! - raw mapping segments (the address/offset translation unit)
//! - module images, thread stacks, heaps and private data regions
//! - data structures (individual heap allocations)
//!
//! The kind only changes how a region is walked and labelled. Identity for
//! diffing is never implied by `==`; callers pick [`Segment::slot_key`] or
//! [`Segment::value_key`] explicitly.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Width of a pointer-sized word in the analysed (32-bit) process.
pub const WORD_SIZE: u64 = 4;

/// What a segment represents inside its dump.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SegmentKind {
    /// Raw mapping unit backing the address space.
    Segment,
    /// Loaded module image (globals live here).
    Module { name: String },
    /// Allocator-owned heap region.
    Heap,
    /// Thread stack, walked from the top down.
    Stack,
    /// Opaque private region.
    PrivateData,
    /// One live allocation recovered from a heap.
    DataStructure,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Segment => "segment",
            SegmentKind::Module { .. } => "module",
            SegmentKind::Heap => "heap",
            SegmentKind::Stack => "stack",
            SegmentKind::PrivateData => "private_data",
            SegmentKind::DataStructure => "data_structure",
        }
    }
}

/// Immutable, cheaply clonable view into a shared byte blob.
///
/// Regions sliced out of one dump all share the dump's allocation; cloning a
/// segment never copies its bytes.
#[derive(Clone)]
pub struct SegmentData {
    blob: Arc<[u8]>,
    range: Range<usize>,
}

impl SegmentData {
    /// Wrap an owned buffer.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        let blob: Arc<[u8]> = bytes.into();
        let range = 0..blob.len();
        Self { blob, range }
    }

    /// View `len` bytes of `blob` starting at `start`, or `None` if the range
    /// does not fit.
    pub fn slice_of(blob: &Arc<[u8]>, start: usize, len: usize) -> Option<Self> {
        let end = start.checked_add(len)?;
        if end > blob.len() {
            return None;
        }
        Some(Self { blob: Arc::clone(blob), range: start..end })
    }

    pub fn as_slice(&self) -> &[u8] {
        self.blob.get(self.range.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

impl fmt::Debug for SegmentData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentData({} bytes)", self.len())
    }
}

/// Coarse identity: the same heap slot across snapshots, regardless of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub address: u64,
    pub size: u64,
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}({})", self.address, self.size)
    }
}

/// Exact identity: slot plus content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueKey<'a> {
    pub address: u64,
    pub size: u64,
    pub data: &'a [u8],
}

/// A contiguous `[address, address + size)` range with its backing bytes.
#[derive(Debug, Clone)]
pub struct Segment {
    pub kind: SegmentKind,
    pub address: u64,
    pub size: u64,
    /// File offset inside the dump blob, once resolved.
    pub offset: Option<u64>,
    data: SegmentData,
}

impl Segment {
    /// Build a segment whose size is the length of `data`.
    pub fn new(kind: SegmentKind, address: u64, data: SegmentData) -> Self {
        let size = data.len() as u64;
        Self { kind, address, size, offset: None, data }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn module(name: impl Into<String>, address: u64, data: SegmentData) -> Self {
        Self::new(SegmentKind::Module { name: name.into() }, address, data)
    }

    pub fn stack(address: u64, data: SegmentData) -> Self {
        Self::new(SegmentKind::Stack, address, data)
    }

    pub fn data_structure(address: u64, data: SegmentData) -> Self {
        Self::new(SegmentKind::DataStructure, address, data)
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn data(&self) -> &SegmentData {
        &self.data
    }

    /// One past the last mapped address.
    pub fn end(&self) -> u64 {
        self.address.saturating_add(self.size)
    }

    pub fn contains(&self, address: u64) -> bool {
        self.address <= address && address < self.end()
    }

    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            SegmentKind::Module { name } => Some(name),
            _ => None,
        }
    }

    /// Modules and stacks are always alive; everything else must be reached.
    pub fn is_root(&self) -> bool {
        matches!(self.kind, SegmentKind::Module { .. } | SegmentKind::Stack)
    }

    pub fn slot_key(&self) -> SlotKey {
        SlotKey { address: self.address, size: self.size }
    }

    pub fn value_key(&self) -> ValueKey<'_> {
        ValueKey { address: self.address, size: self.size, data: self.bytes() }
    }

    /// Stable human-readable identity, usable as a map key and display label.
    pub fn identity(&self) -> String {
        match &self.kind {
            SegmentKind::Module { name } => format!("{name}({})", self.size),
            _ => self.slot_key().to_string(),
        }
    }

    /// Little-endian words at a 4-byte stride as `(value, offset)` pairs.
    ///
    /// Forward regions report the offset from the start. Stacks are walked
    /// from the top and report the distance from the top instead.
    pub fn walk_by_word(&self) -> WordWalk<'_> {
        let reverse = matches!(self.kind, SegmentKind::Stack);
        let cursor = if reverse {
            self.size.checked_sub(WORD_SIZE).filter(|i| *i > self.size % WORD_SIZE)
        } else {
            Some(0).filter(|_| self.size >= WORD_SIZE)
        };
        WordWalk { bytes: self.bytes(), size: self.size, cursor, reverse }
    }

    /// Single bytes as `(value, offset)` pairs, in the same direction and
    /// offset convention as [`Segment::walk_by_word`].
    pub fn walk_by_byte(&self) -> ByteWalk<'_> {
        let reverse = matches!(self.kind, SegmentKind::Stack);
        let cursor = if reverse { self.size.checked_sub(1) } else { Some(0).filter(|_| self.size > 0) };
        ByteWalk { bytes: self.bytes(), size: self.size, cursor, reverse }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

/// Lazy word iterator returned by [`Segment::walk_by_word`].
#[derive(Debug, Clone)]
pub struct WordWalk<'a> {
    bytes: &'a [u8],
    size: u64,
    cursor: Option<u64>,
    reverse: bool,
}

impl Iterator for WordWalk<'_> {
    type Item = (u32, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.cursor?;
        self.cursor = if self.reverse {
            i.checked_sub(WORD_SIZE).filter(|n| *n > self.size % WORD_SIZE)
        } else {
            i.checked_add(WORD_SIZE).filter(|n| n.saturating_add(WORD_SIZE) <= self.size)
        };
        let start = usize::try_from(i).ok()?;
        let word = self.bytes.get(start..start + WORD_SIZE as usize)?;
        let offset = if self.reverse { self.size - i } else { i };
        Some((LittleEndian::read_u32(word), offset))
    }
}

/// Lazy byte iterator returned by [`Segment::walk_by_byte`].
#[derive(Debug, Clone)]
pub struct ByteWalk<'a> {
    bytes: &'a [u8],
    size: u64,
    cursor: Option<u64>,
    reverse: bool,
}

impl Iterator for ByteWalk<'_> {
    type Item = (u8, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.cursor?;
        self.cursor = if self.reverse {
            i.checked_sub(1)
        } else {
            i.checked_add(1).filter(|n| *n < self.size)
        };
        let byte = *self.bytes.get(usize::try_from(i).ok()?)?;
        let offset = if self.reverse { self.size - i } else { i };
        Some((byte, offset))
    }
}
