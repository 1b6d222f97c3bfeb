use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use memdiff::commands::{
    convert_command, diff_command, extract_command, graph_command, info_command,
    segment_diff_command,
};
use memdiff::{init_tracing, parse_number};

/// Heap object graph recovery and snapshot diffing for process memory dumps.
///
/// A dump is addressed by its base path: `<base>.core` holds the memory blob,
/// `<base>.segments`, `<base>.modules`, `<base>.heaps`, `<base>.stacks` and
/// `<base>.pdata` its metadata. All substantive logic lives in `memdiff-core`.
#[derive(Parser, Debug)]
#[command(name = "memdiff", version, about = "Memory dump graph diffing", long_about = None)]
struct Cli {
    /// Log debug details (RUST_LOG overrides).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show segments, modules, heaps and stacks of a dump.
    Info {
        /// Dump base path.
        dump: PathBuf,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Translate between virtual addresses and dump offsets.
    #[command(group(ArgGroup::new("query").required(true).args(["address", "offset"])))]
    Convert {
        /// Dump base path.
        dump: PathBuf,

        /// Virtual address (0x hex or decimal).
        #[arg(short, long, value_parser = parse_number)]
        address: Option<u64>,

        /// Dump offset (0x hex or decimal).
        #[arg(short, long, value_parser = parse_number)]
        offset: Option<u64>,
    },

    /// Write the bytes of the segment starting at an address to a file.
    Extract {
        /// Dump base path.
        dump: PathBuf,

        /// Start address of the segment.
        #[arg(short, long, value_parser = parse_number)]
        address: u64,

        /// Output directory. Defaults to the current directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Build the memory graph of one dump and export it as JSON.
    Graph {
        /// Dump base path.
        dump: PathBuf,

        /// Output file. Prints to stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Analysis config (YAML or JSON).
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Diff an ordered sequence of dumps.
    Diff {
        /// Dump base paths, oldest first.
        #[arg(required = true)]
        dumps: Vec<PathBuf>,

        /// Dump of a run known not to hold the target data.
        #[arg(short, long)]
        negative: Option<PathBuf>,

        /// Write the full report as JSON to this file.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Analysis config (YAML or JSON).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the report as JSON instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Byte offsets of one data structure that change at every step.
    SegmentDiff {
        /// Address of the data structure.
        #[arg(short, long, value_parser = parse_number)]
        address: u64,

        /// Dump base paths, oldest first.
        #[arg(required = true, num_args = 2..)]
        dumps: Vec<PathBuf>,

        /// Analysis config (YAML or JSON).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Info { dump, json } => info_command(&dump, json)?,
        Command::Convert { dump, address, offset } => convert_command(&dump, address, offset)?,
        Command::Extract { dump, address, out } => {
            extract_command(&dump, address, out.as_deref())?;
        }
        Command::Graph { dump, out, config } => {
            graph_command(&dump, out.as_deref(), config.as_deref())?
        }
        Command::Diff { dumps, negative, out, config, json } => {
            diff_command(&dumps, negative.as_deref(), out.as_deref(), config.as_deref(), json)?
        }
        Command::SegmentDiff { address, dumps, config } => {
            segment_diff_command(address, &dumps, config.as_deref())?
        }
    }

    Ok(())
}
