//! Memory dumps: the raw blob plus the regions described by its metadata.
//!
//! A dump arrives as plain records (segments, modules, heaps, stacks,
//! private data) and one memory blob. [`MemoryDump::from_records`] validates
//! the records against each other and slices every region out of the shared
//! blob without copying.

pub mod address_space;
pub mod loader;

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::{Segment, SegmentData, SegmentKind};

pub use address_space::AddressError;
pub use loader::load_memory_dump;

/// Errors raised while assembling a dump from its records.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{file}:{line}: {reason}")]
    Malformed { file: String, line: usize, reason: String },
    #[error("segments {first} and {second} overlap")]
    Overlap { first: String, second: String },
    #[error("{kind} region {region} is not contained in a single segment")]
    Uncontained { kind: &'static str, region: String },
    #[error("segment {segment} at offset {offset:#x} runs past the end of the {blob_len}-byte blob")]
    Truncated { segment: String, offset: u64, blob_len: usize },
}

/// An `(address, size)` metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub address: u64,
    pub size: u64,
}

/// A loaded module record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub address: u64,
    pub size: u64,
    pub name: String,
}

/// Structured metadata produced by the container-format reader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpRecords {
    pub segments: Vec<RegionRecord>,
    pub modules: Vec<ModuleRecord>,
    pub heaps: Vec<RegionRecord>,
    pub stacks: Vec<RegionRecord>,
    pub private_data: Vec<RegionRecord>,
}

/// One process memory snapshot.
#[derive(Debug, Clone)]
pub struct MemoryDump {
    pub name: String,
    /// Sorted by address; the authoritative address/offset mapping.
    pub segments: Vec<Segment>,
    pub modules: Vec<Segment>,
    pub heaps: Vec<Segment>,
    pub stacks: Vec<Segment>,
    pub private_data: Vec<Segment>,
    blob: Arc<[u8]>,
}

/// Counts and sizes for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpSummary {
    pub name: String,
    pub size: u64,
    pub segments: usize,
    pub modules: Vec<String>,
    pub heaps: usize,
    pub stacks: usize,
    pub private_data: usize,
}

impl MemoryDump {
    /// Validate `records` against `blob` and build the dump.
    pub fn from_records(
        name: impl Into<String>,
        records: &DumpRecords,
        blob: impl Into<Arc<[u8]>>,
    ) -> Result<Self, LoadError> {
        let blob: Arc<[u8]> = blob.into();
        let mut ordered = records.segments.clone();
        ordered.sort_by_key(|r| r.address);

        let mut segments: Vec<Segment> = Vec::with_capacity(ordered.len());
        let mut offset = 0u64;
        for record in &ordered {
            if let Some(prev) = segments.last() {
                if prev.end() > record.address {
                    return Err(LoadError::Overlap {
                        first: prev.identity(),
                        second: label(record.address, record.size),
                    });
                }
            }
            let data = slice_blob(&blob, offset, record.size).ok_or_else(|| {
                LoadError::Truncated {
                    segment: label(record.address, record.size),
                    offset,
                    blob_len: blob.len(),
                }
            })?;
            segments
                .push(Segment::new(SegmentKind::Segment, record.address, data).with_offset(offset));
            offset += record.size;
        }

        let region = |kind: SegmentKind, address: u64, size: u64| {
            carve_region(&segments, &blob, kind, address, size)
        };
        let modules = records
            .modules
            .iter()
            .map(|m| region(SegmentKind::Module { name: m.name.clone() }, m.address, m.size))
            .collect::<Result<Vec<_>, _>>()?;
        let heaps = records
            .heaps
            .iter()
            .map(|r| region(SegmentKind::Heap, r.address, r.size))
            .collect::<Result<Vec<_>, _>>()?;
        let stacks = records
            .stacks
            .iter()
            .map(|r| region(SegmentKind::Stack, r.address, r.size))
            .collect::<Result<Vec<_>, _>>()?;
        let private_data = records
            .private_data
            .iter()
            .map(|r| region(SegmentKind::PrivateData, r.address, r.size))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { name: name.into(), segments, modules, heaps, stacks, private_data, blob })
    }

    /// Raw memory blob.
    pub fn data(&self) -> &[u8] {
        &self.blob
    }

    pub fn size(&self) -> u64 {
        self.blob.len() as u64
    }

    /// Zero-copy view of `len` bytes at `offset`.
    pub fn slice(&self, offset: u64, len: u64) -> Option<SegmentData> {
        slice_blob(&self.blob, offset, len)
    }

    pub fn read_u32(&self, offset: u64) -> Option<u32> {
        let start = usize::try_from(offset).ok()?;
        self.blob.get(start..start.checked_add(4)?).map(LittleEndian::read_u32)
    }

    pub fn offset_from_address(&self, address: u64) -> Result<u64, AddressError> {
        address_space::offset_from_address(&self.segments, address)
    }

    pub fn address_from_offset(&self, offset: u64) -> Result<u64, AddressError> {
        address_space::address_from_offset(&self.segments, offset)
    }

    /// Segment containing `address`, if any.
    pub fn containing_segment(&self, address: u64) -> Option<&Segment> {
        address_space::containing_segment(&self.segments, address)
            .and_then(|idx| self.segments.get(idx))
    }

    /// Segment starting exactly at `address`.
    pub fn extract_segment(&self, address: u64) -> Option<&Segment> {
        self.segments.iter().find(|s| s.address == address)
    }

    /// Hex SHA-256 of the memory blob, used to fingerprint snapshots.
    pub fn sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.blob);
        format!("{:x}", hasher.finalize())
    }

    pub fn summary(&self) -> DumpSummary {
        DumpSummary {
            name: self.name.clone(),
            size: self.size(),
            segments: self.segments.len(),
            modules: self.modules.iter().map(Segment::identity).collect(),
            heaps: self.heaps.len(),
            stacks: self.stacks.len(),
            private_data: self.private_data.len(),
        }
    }
}

fn label(address: u64, size: u64) -> String {
    format!("{address:#010x}({size})")
}

fn slice_blob(blob: &Arc<[u8]>, offset: u64, len: u64) -> Option<SegmentData> {
    SegmentData::slice_of(blob, usize::try_from(offset).ok()?, usize::try_from(len).ok()?)
}

fn carve_region(
    segments: &[Segment],
    blob: &Arc<[u8]>,
    kind: SegmentKind,
    address: u64,
    size: u64,
) -> Result<Segment, LoadError> {
    let uncontained = || LoadError::Uncontained { kind: kind.as_str(), region: label(address, size) };
    let idx = address_space::containing_segment(segments, address).ok_or_else(uncontained)?;
    let segment = segments.get(idx).ok_or_else(uncontained)?;
    if address.saturating_add(size) > segment.end() {
        return Err(uncontained());
    }
    let offset = segment.offset.unwrap_or_default() + (address - segment.address);
    let data = slice_blob(blob, offset, size).ok_or_else(uncontained)?;
    Ok(Segment::new(kind, address, data).with_offset(offset))
}
