use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use memdiff_core::diff::diff_segments;
use memdiff_core::dump::load_memory_dump;
use memdiff_core::model::Segment;
use memdiff_core::services::SnapshotPipeline;

use crate::commands::{load_config_or_default, print_json, write_json};

/// Diff an ordered list of dumps, optionally against a negative dump.
pub fn diff_command(
    dumps: &[PathBuf],
    negative: Option<&Path>,
    out: Option<&Path>,
    config: Option<&Path>,
    json: bool,
) -> Result<()> {
    let pipeline = SnapshotPipeline::new(load_config_or_default(config)?)?;
    let loaded = pipeline.load_dumps(dumps)?;
    let negative = negative.map(|path| load_memory_dump(path)).transpose()?;
    let output = pipeline.run(&loaded, negative.as_ref())?;
    let report = &output.report;

    if let Some(path) = out {
        write_json(path, report)?;
    }
    if json {
        return print_json(report);
    }

    println!("Snapshots: {}", report.snapshots.len());
    println!("- changed: {}", report.diff.changed.len());
    println!("- removed: {}", report.diff.removed.len());
    println!("- added: {}", report.diff.added.len());
    for id in &report.diff.removed {
        println!("  removed {id}");
    }
    if let Some(control) = &report.control {
        println!("Negative {}: {} noisy nodes", control.snapshot.name, control.noisy.len());
        for id in &control.noisy {
            println!("  noisy {id}");
        }
    }
    println!(
        "Subgraph: {} nodes, {} edges",
        report.subgraph.nodes.len(),
        report.subgraph.edges.len()
    );
    if let Some(path) = out {
        println!("Report written to {}", path.display());
    }
    Ok(())
}

/// Print the byte offsets of the node at `address` that change at every step.
pub fn segment_diff_command(address: u64, dumps: &[PathBuf], config: Option<&Path>) -> Result<()> {
    let pipeline = SnapshotPipeline::new(load_config_or_default(config)?)?;
    let loaded = pipeline.load_dumps(dumps)?;
    let built = pipeline.build_graphs(&loaded);
    let versions = built
        .iter()
        .map(|b| {
            b.graph.seek_node_by_address(address).ok_or_else(|| {
                anyhow!("No node at {address:#010x} in the graph of {}", b.graph.name())
            })
        })
        .collect::<Result<Vec<&Segment>>>()?;

    let offsets = diff_segments(&versions)?;
    println!("{} offsets of {address:#010x} change at every step", offsets.len());
    for offset in offsets {
        println!("  {offset:#x}");
    }
    Ok(())
}
