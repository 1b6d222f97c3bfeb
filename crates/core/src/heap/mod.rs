//! Recovery of live allocations from a heap's own metadata.
//!
//! A heap starts with a table of segment-list slots, each holding the virtual
//! address of a heap segment (a zero slot ends the table). Each heap segment
//! points at its first block header; headers are chained by their size and
//! the chain ends at the block flagged `end`. Every block flagged `used`
//! before that point is a live allocation and becomes a data structure.
//!
//! Dump bytes are untrusted: every chain walk is bounded by the mapping
//! segment it starts in, and a chain that escapes it or never terminates is a
//! [`HeapError::CorruptHeap`] for that heap only.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::HeapLayout;
use crate::dump::MemoryDump;
use crate::model::{Segment, WORD_SIZE};

/// Why a heap chain was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorruptReason {
    #[error("segment list table is truncated")]
    TruncatedSegmentList,
    #[error("segment list entry {address:#010x} is not mapped")]
    UnmappedSegmentList { address: u64 },
    #[error("first block address {address:#010x} is not mapped")]
    UnmappedFirstBlock { address: u64 },
    #[error("block header is zero-sized")]
    ZeroSizedBlock,
    #[error("unused byte count {unused} exceeds block size {block}")]
    OversizedUnusedCount { unused: u64, block: u64 },
    #[error("block chain leaves segment {segment}")]
    ChainOverrun { segment: String },
    #[error("no end marker after {limit} blocks")]
    Unterminated { limit: u64 },
}

/// Heap parsing failures; fatal for one heap, never for the dump.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("corrupt heap {heap} at offset {offset:#x}: {reason}")]
    CorruptHeap { heap: String, offset: u64, reason: CorruptReason },
}

impl HeapError {
    pub fn reason(&self) -> &CorruptReason {
        match self {
            HeapError::CorruptHeap { reason, .. } => reason,
        }
    }
}

/// Every allocation recovered from a dump, plus the heaps that were skipped.
#[derive(Debug, Clone, Default)]
pub struct HeapExtraction {
    /// Sorted by address.
    pub structures: Vec<Segment>,
    pub failures: Vec<HeapError>,
}

/// Walks one dump's heaps using a fixed metadata layout.
pub struct HeapParser<'a> {
    dump: &'a MemoryDump,
    layout: &'a HeapLayout,
}

/// One decoded block header.
#[derive(Debug, Clone, Copy)]
struct BlockHeader {
    units: u64,
    flags: u8,
    unused: u64,
}

impl<'a> HeapParser<'a> {
    pub fn new(dump: &'a MemoryDump, layout: &'a HeapLayout) -> Self {
        Self { dump, layout }
    }

    /// Parse every heap; a corrupt heap is logged, recorded and skipped.
    pub fn parse_all(&self) -> HeapExtraction {
        let mut extraction = HeapExtraction::default();
        for heap in &self.dump.heaps {
            match self.parse_heap(heap) {
                Ok(found) => {
                    debug!("heap {heap}: {} data structures", found.len());
                    extraction.structures.extend(found);
                }
                Err(err) => {
                    warn!("{}: skipping heap: {err}", self.dump.name);
                    extraction.failures.push(err);
                }
            }
        }
        extraction.structures.sort_by_key(|ds| ds.address);
        extraction
    }

    /// Live allocations of a single heap, in chain order.
    pub fn parse_heap(&self, heap: &Segment) -> Result<Vec<Segment>, HeapError> {
        let mut structures = Vec::new();
        for entry in self.segment_list(heap)? {
            structures.extend(self.parse_segment_entry(heap, entry)?);
        }
        Ok(structures)
    }

    /// Non-zero slots of the segment-list table, up to the first zero slot.
    fn segment_list(&self, heap: &Segment) -> Result<Vec<u64>, HeapError> {
        let mut entries = Vec::new();
        for slot in 0..self.layout.segment_list_slots {
            let truncated = || {
                corrupt(heap, heap.offset.unwrap_or_default(), CorruptReason::TruncatedSegmentList)
            };
            let at = slot
                .checked_mul(WORD_SIZE)
                .and_then(|rel| self.layout.segment_list_offset.checked_add(rel))
                .ok_or_else(truncated)?;
            let word = usize::try_from(at)
                .ok()
                .and_then(|start| heap.bytes().get(start..start.checked_add(WORD_SIZE as usize)?))
                .ok_or_else(truncated)?;
            let address = u64::from(LittleEndian::read_u32(word));
            if address == 0 {
                break;
            }
            entries.push(address);
        }
        Ok(entries)
    }

    fn parse_segment_entry(&self, heap: &Segment, entry: u64) -> Result<Vec<Segment>, HeapError> {
        let entry_offset = self.dump.offset_from_address(entry).map_err(|_| {
            corrupt(heap, heap.offset.unwrap_or_default(), CorruptReason::UnmappedSegmentList { address: entry })
        })?;
        let unmapped_entry =
            |offset: u64| corrupt(heap, offset, CorruptReason::UnmappedFirstBlock { address: entry });
        let field_offset = entry_offset
            .checked_add(self.layout.first_entry_field)
            .ok_or_else(|| unmapped_entry(entry_offset))?;
        let first = self
            .dump
            .read_u32(field_offset)
            .map(u64::from)
            .ok_or_else(|| unmapped_entry(field_offset))?;
        let chain_segment = self.dump.containing_segment(first).ok_or_else(|| {
            corrupt(heap, field_offset, CorruptReason::UnmappedFirstBlock { address: first })
        })?;
        let segment_offset = chain_segment.offset.unwrap_or_default();
        let chain_end = segment_offset + chain_segment.size;
        let limit = chain_segment.size / self.layout.unit_size.max(1);
        let overrun = || CorruptReason::ChainOverrun { segment: chain_segment.identity() };

        let mut cursor = segment_offset + (first - chain_segment.address);
        let mut structures = Vec::new();
        for _ in 0..limit {
            let offset = cursor
                .checked_add(self.layout.header_size)
                .filter(|end| *end <= chain_end)
                .ok_or_else(|| corrupt(heap, cursor, overrun()))?;
            let header = self.read_header(cursor).ok_or_else(|| corrupt(heap, cursor, overrun()))?;
            if header.units == 0 {
                return Err(corrupt(heap, cursor, CorruptReason::ZeroSizedBlock));
            }
            let block = header
                .units
                .checked_mul(self.layout.unit_size)
                .ok_or_else(|| corrupt(heap, cursor, overrun()))?;
            let is_end = header.flags & self.layout.end_flag != 0;
            if header.flags & self.layout.used_flag != 0 && !is_end {
                let size = block.checked_sub(header.unused).ok_or_else(|| {
                    corrupt(heap, cursor, CorruptReason::OversizedUnusedCount { unused: header.unused, block })
                })?;
                if offset.checked_add(size).map_or(true, |end| end > chain_end) {
                    return Err(corrupt(heap, cursor, overrun()));
                }
                let data = self.dump.slice(offset, size).ok_or_else(|| corrupt(heap, cursor, overrun()))?;
                let address = chain_segment.address + (offset - segment_offset);
                structures.push(Segment::data_structure(address, data).with_offset(offset));
            }
            if is_end {
                return Ok(structures);
            }
            cursor = cursor.checked_add(block).ok_or_else(|| corrupt(heap, cursor, overrun()))?;
        }
        Err(corrupt(heap, cursor, CorruptReason::Unterminated { limit }))
    }

    fn read_header(&self, offset: u64) -> Option<BlockHeader> {
        let start = usize::try_from(offset).ok()?;
        let len = usize::try_from(self.layout.header_size).ok()?;
        let raw = self.dump.data().get(start..start.checked_add(len)?)?;
        let field = |at: u64| usize::try_from(at).ok();
        let size_at = field(self.layout.size_field)?;
        let units = LittleEndian::read_u16(raw.get(size_at..size_at.checked_add(2)?)?);
        let flags = *raw.get(field(self.layout.flags_offset)?)?;
        let unused = *raw.get(field(self.layout.unused_bytes_offset)?)?;
        Some(BlockHeader { units: u64::from(units), flags, unused: u64::from(unused) })
    }
}

/// Recover and address-sort every allocation in `dump`.
pub fn parse_all_data_structures(dump: &MemoryDump, layout: &HeapLayout) -> HeapExtraction {
    HeapParser::new(dump, layout).parse_all()
}

fn corrupt(heap: &Segment, offset: u64, reason: CorruptReason) -> HeapError {
    HeapError::CorruptHeap { heap: heap.identity(), offset, reason }
}
