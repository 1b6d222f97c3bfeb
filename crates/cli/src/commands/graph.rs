use std::path::Path;

use anyhow::Result;
use memdiff_core::dump::load_memory_dump;
use memdiff_core::graph::GraphBuilder;
use tracing::warn;

use crate::commands::{load_config_or_default, print_json, write_json};

/// Build the pruned graph of one dump and export it as JSON.
pub fn graph_command(dump: &Path, out: Option<&Path>, config: Option<&Path>) -> Result<()> {
    let config = load_config_or_default(config)?;
    let dump = load_memory_dump(dump)?;
    let built = GraphBuilder::new(&config).build(&dump);
    let exported = built.graph.export();

    for failure in &built.heap_failures {
        warn!("{}: skipped {failure}", dump.name);
    }
    match out {
        Some(path) => {
            write_json(path, &exported)?;
            println!(
                "Wrote graph of {} ({} nodes, {} edges) to {}",
                dump.name,
                exported.nodes.len(),
                exported.edges.len(),
                path.display()
            );
        }
        None => print_json(&exported)?,
    }
    Ok(())
}
