//! Translation between virtual addresses and offsets into the dump blob.
//!
//! The blob is the concatenation of every segment's bytes in address order,
//! so an offset is the cumulative size of the preceding segments plus the
//! distance into the containing one. All functions expect `segments` sorted
//! by address and non-overlapping.

use thiserror::Error;

use crate::model::Segment;

/// Address-space translation failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    #[error("address {address:#010x} is not mapped by any segment")]
    AddressNotMapped { address: u64 },
    #[error("offset {offset:#x} is outside the {mapped:#x} mapped bytes")]
    OffsetNotMapped { offset: u64, mapped: u64 },
}

/// Dump offset of `address`.
///
/// A gap between two segments is a hard error: the scan stops as soon as a
/// segment starts past the query.
pub fn offset_from_address(segments: &[Segment], address: u64) -> Result<u64, AddressError> {
    let mut cumulative = 0u64;
    for segment in segments {
        if segment.address > address {
            break;
        }
        if segment.contains(address) {
            return Ok(cumulative + (address - segment.address));
        }
        cumulative += segment.size;
    }
    Err(AddressError::AddressNotMapped { address })
}

/// Virtual address stored at dump `offset`.
pub fn address_from_offset(segments: &[Segment], offset: u64) -> Result<u64, AddressError> {
    let mut cumulative = 0u64;
    for segment in segments {
        if offset < cumulative + segment.size {
            return Ok(segment.address + (offset - cumulative));
        }
        cumulative += segment.size;
    }
    Err(AddressError::OffsetNotMapped { offset, mapped: cumulative })
}

/// Index of the segment containing `address`.
pub fn containing_segment(segments: &[Segment], address: u64) -> Option<usize> {
    let idx = segments.partition_point(|s| s.address <= address).checked_sub(1)?;
    segments.get(idx).filter(|s| s.contains(address)).map(|_| idx)
}

/// Total number of bytes mapped by `segments`.
pub fn mapped_size(segments: &[Segment]) -> u64 {
    segments.iter().map(|s| s.size).sum()
}
