use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use memdiff_core::dump::load_memory_dump;

use crate::commands::print_json;

/// Print counts and sizes of a loaded dump.
pub fn info_command(dump: &Path, json: bool) -> Result<()> {
    let dump = load_memory_dump(dump)?;
    let summary = dump.summary();
    if json {
        return print_json(&summary);
    }

    println!("Dump: {}", summary.name);
    println!("- size: {} bytes", summary.size);
    println!("- sha256: {}", dump.sha256());
    println!("- segments: {}", summary.segments);
    println!("- heaps: {}", summary.heaps);
    println!("- stacks: {}", summary.stacks);
    println!("- private data regions: {}", summary.private_data);
    println!("- modules: {}", summary.modules.len());
    for module in &summary.modules {
        println!("  - {module}");
    }
    Ok(())
}

/// Translate a virtual address to a dump offset or back.
pub fn convert_command(dump: &Path, address: Option<u64>, offset: Option<u64>) -> Result<()> {
    let dump = load_memory_dump(dump)?;
    match (address, offset) {
        (Some(address), None) => {
            let offset = dump.offset_from_address(address)?;
            println!("address {address:#010x} -> offset {offset:#x}");
        }
        (None, Some(offset)) => {
            let address = dump.address_from_offset(offset)?;
            println!("offset {offset:#x} -> address {address:#010x}");
        }
        _ => return Err(anyhow!("Pass exactly one of --address or --offset")),
    }
    Ok(())
}

/// Write the bytes of the segment starting at `address` to
/// `<out_dir>/<dump name>-<address>.core` and return that path.
pub fn extract_command(dump_base: &Path, address: u64, out_dir: Option<&Path>) -> Result<PathBuf> {
    let dump = load_memory_dump(dump_base)?;
    let segment = dump
        .extract_segment(address)
        .ok_or_else(|| anyhow!("No segment starts at {address:#010x} in {}", dump.name))?;

    let stem = dump_base.file_name().and_then(|n| n.to_str()).unwrap_or("dump");
    let out_dir = out_dir.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create output dir {}", out_dir.display()))?;
    let path = out_dir.join(format!("{stem}-{address:#010x}.core"));
    fs::write(&path, segment.bytes())
        .with_context(|| format!("Failed to write segment to {}", path.display()))?;

    println!("Wrote {} bytes of {} to {}", segment.size, segment, path.display());
    Ok(path)
}
