//! Reading a dump from its on-disk file family.
//!
//! A dump named `base` is stored as:
//! - `base.core`: the raw memory blob
//! - `base.segments`: `addr_hex:size_hex` per line
//! - `base.modules`: `addr_hex:size_hex:name` per line
//! - `base.heaps`: whitespace columns, address in column 0, KiB in column 5
//! - `base.stacks` / `base.pdata`: whitespace columns, address in column 0,
//!   KiB in column 4
//!
//! `.core` and `.segments` are required; a missing region file means the dump
//! has no regions of that kind.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::{DumpRecords, LoadError, MemoryDump, ModuleRecord, RegionRecord};

/// File extension for each part of a dump.
pub const CORE_EXT: &str = "core";
pub const SEGMENTS_EXT: &str = "segments";
pub const MODULES_EXT: &str = "modules";
pub const HEAPS_EXT: &str = "heaps";
pub const STACKS_EXT: &str = "stacks";
pub const PDATA_EXT: &str = "pdata";

/// Path of one member of the file family rooted at `base`.
pub fn dump_file(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Load the dump whose files share the base path `base`.
pub fn load_memory_dump(base: impl AsRef<Path>) -> Result<MemoryDump> {
    let base = base.as_ref();
    let core_path = dump_file(base, CORE_EXT);
    let blob = fs::read(&core_path)
        .with_context(|| format!("Failed to read memory blob at {}", core_path.display()))?;
    debug!("{} loaded {} bytes", core_path.display(), blob.len());

    let segments_path = dump_file(base, SEGMENTS_EXT);
    let body = fs::read_to_string(&segments_path)
        .with_context(|| format!("Failed to read segments at {}", segments_path.display()))?;
    let segments = parse_segment_records(&body, &segments_path.display().to_string())?;

    let records = DumpRecords {
        segments,
        modules: read_optional(base, MODULES_EXT, parse_module_records)?,
        heaps: read_optional(base, HEAPS_EXT, parse_heap_records)?,
        stacks: read_optional(base, STACKS_EXT, parse_stack_records)?,
        private_data: read_optional(base, PDATA_EXT, parse_stack_records)?,
    };

    let name = base.display().to_string();
    let dump = MemoryDump::from_records(name, &records, blob)
        .with_context(|| format!("Inconsistent dump metadata for {}", base.display()))?;
    debug!(
        "{}: {} segments, {} modules, {} heaps, {} stacks, {} private regions",
        dump.name,
        dump.segments.len(),
        dump.modules.len(),
        dump.heaps.len(),
        dump.stacks.len(),
        dump.private_data.len()
    );
    Ok(dump)
}

fn read_optional<T>(
    base: &Path,
    ext: &str,
    parse: fn(&str, &str) -> Result<Vec<T>, LoadError>,
) -> Result<Vec<T>> {
    let path = dump_file(base, ext);
    if !path.exists() {
        debug!("{} not present, assuming no regions", path.display());
        return Ok(Vec::new());
    }
    let body = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(parse(&body, &path.display().to_string())?)
}

/// Parse `addr_hex:size_hex` lines.
pub fn parse_segment_records(body: &str, file: &str) -> Result<Vec<RegionRecord>, LoadError> {
    records(body, file, |line| {
        let mut parts = line.splitn(2, ':');
        let address = parse_hex(parts.next().unwrap_or_default())?;
        let size = parse_hex(parts.next().ok_or("missing size column")?)?;
        Ok(RegionRecord { address, size })
    })
}

/// Parse `addr_hex:size_hex:name` lines.
pub fn parse_module_records(body: &str, file: &str) -> Result<Vec<ModuleRecord>, LoadError> {
    records(body, file, |line| {
        let mut parts = line.splitn(3, ':');
        let address = parse_hex(parts.next().unwrap_or_default())?;
        let size = parse_hex(parts.next().ok_or("missing size column")?)?;
        let name = parts.next().ok_or("missing module name")?.trim_end().to_string();
        Ok(ModuleRecord { address, size, name })
    })
}

/// Parse heap listing lines (size in KiB in column 5).
pub fn parse_heap_records(body: &str, file: &str) -> Result<Vec<RegionRecord>, LoadError> {
    records(body, file, |line| kib_columns(line, 5))
}

/// Parse stack or private-data listing lines (size in KiB in column 4).
pub fn parse_stack_records(body: &str, file: &str) -> Result<Vec<RegionRecord>, LoadError> {
    records(body, file, |line| kib_columns(line, 4))
}

fn records<T>(
    body: &str,
    file: &str,
    parse_line: impl Fn(&str) -> Result<T, String>,
) -> Result<Vec<T>, LoadError> {
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            parse_line(line.trim()).map_err(|reason| LoadError::Malformed {
                file: file.to_string(),
                line: idx + 1,
                reason,
            })
        })
        .collect()
}

fn kib_columns(line: &str, size_column: usize) -> Result<RegionRecord, String> {
    let columns: Vec<&str> = line.split_whitespace().collect();
    let address = parse_hex(columns.first().copied().unwrap_or_default())?;
    let kib = columns
        .get(size_column)
        .ok_or_else(|| format!("missing size column {size_column}"))?
        .replace(',', "");
    let kib: u64 = kib.parse().map_err(|_| format!("invalid KiB size '{kib}'"))?;
    let size = kib.checked_mul(1024).ok_or_else(|| format!("KiB size {kib} overflows"))?;
    Ok(RegionRecord { address, size })
}

fn parse_hex(token: &str) -> Result<u64, String> {
    let token = token.trim();
    let digits = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")).unwrap_or(token);
    u64::from_str_radix(digits, 16).map_err(|_| format!("invalid hex number '{token}'"))
}
