//! Analysis configuration.
//!
//! Every constant the pipeline depends on (pointer band, heap block layout)
//! lives here so a run can be re-targeted without recompiling. Files are
//! YAML or JSON, picked by extension; every field falls back to the defaults
//! for a 32-bit Windows process heap.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pointer band is empty: min {min:#x} >= max {max:#x}")]
    EmptyPointerBand { min: u64, max: u64 },
    #[error("heap allocation unit size must be non-zero")]
    ZeroUnitSize,
    #[error("heap block header field `{field}` at {offset} does not fit in a {header_size}-byte header")]
    HeaderFieldOutOfRange { field: &'static str, offset: u64, header_size: u64 },
}

/// Range of word values treated as candidate user-space pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerBand {
    /// Lowest user-space address (inclusive).
    pub min: u64,
    /// Start of kernel space (exclusive).
    pub max: u64,
}

impl Default for PointerBand {
    fn default() -> Self {
        Self { min: 0x10000, max: 0x8000_0000 }
    }
}

impl PointerBand {
    pub fn contains(&self, value: u64) -> bool {
        self.min <= value && value < self.max
    }
}

/// Byte layout of the heap metadata walked by the heap parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapLayout {
    /// Offset from the heap start of the segment-list slot table.
    pub segment_list_offset: u64,
    /// Number of 4-byte slots in the table.
    pub segment_list_slots: u64,
    /// Offset inside a segment-list entry of the first block's address.
    pub first_entry_field: u64,
    /// Allocation granularity; block sizes are counted in these units.
    pub unit_size: u64,
    pub header_size: u64,
    /// Offset of the 16-bit block size (in units) inside a header.
    pub size_field: u64,
    pub flags_offset: u64,
    pub unused_bytes_offset: u64,
    pub used_flag: u8,
    pub end_flag: u8,
}

impl Default for HeapLayout {
    fn default() -> Self {
        Self {
            segment_list_offset: 0x58,
            segment_list_slots: 64,
            first_entry_field: 0x20,
            unit_size: 8,
            header_size: 8,
            size_field: 0,
            flags_offset: 5,
            unused_bytes_offset: 6,
            used_flag: 0x01,
            end_flag: 0x10,
        }
    }
}

/// Top-level configuration for building and diffing memory graphs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub pointer_band: PointerBand,
    pub heap: HeapLayout,
    /// Scan private data regions for pointers and treat them as roots.
    pub scan_private_data: bool,
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let band = self.pointer_band;
        if band.min >= band.max {
            return Err(ConfigError::EmptyPointerBand { min: band.min, max: band.max });
        }
        let heap = &self.heap;
        if heap.unit_size == 0 {
            return Err(ConfigError::ZeroUnitSize);
        }
        let fields = [
            ("size_field", heap.size_field, 2),
            ("flags_offset", heap.flags_offset, 1),
            ("unused_bytes_offset", heap.unused_bytes_offset, 1),
        ];
        for (field, offset, width) in fields {
            if offset.checked_add(width).map_or(true, |end| end > heap.header_size) {
                return Err(ConfigError::HeaderFieldOutOfRange {
                    field,
                    offset,
                    header_size: heap.header_size,
                });
            }
        }
        Ok(())
    }
}

/// Load and validate a config file (YAML unless the extension is `.json`).
pub fn load_config(path: impl AsRef<Path>) -> Result<AnalysisConfig> {
    let path = path.as_ref();
    let body = std::fs::read(path)
        .with_context(|| format!("Failed to read analysis config at {}", path.display()))?;
    let config: AnalysisConfig = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_slice(&body).context("Failed to parse analysis config JSON")?
    } else {
        serde_yaml::from_slice(&body).context("Failed to parse analysis config YAML")?
    };
    config.validate().with_context(|| format!("Invalid analysis config at {}", path.display()))?;
    Ok(config)
}
