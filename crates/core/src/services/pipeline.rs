use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{AnalysisConfig, ConfigError};
use crate::diff::{diff_snapshots, extract_diff_subgraph, DiffError, DiffReport, DiffSubgraph, DiffSummary};
use crate::dump::{load_memory_dump, MemoryDump};
use crate::graph::{BuiltGraph, ExportedGraph, GraphBuilder, GraphStats, MemoryGraph};

use super::timing::OpTimer;

/// Per-snapshot facts recorded in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub name: String,
    /// Hex SHA-256 of the memory blob.
    pub sha256: String,
    pub stats: GraphStats,
    /// Heaps skipped as corrupt, with the reason.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub heap_failures: Vec<String>,
}

impl SnapshotSummary {
    pub fn new(dump: &MemoryDump, built: &BuiltGraph) -> Self {
        Self {
            name: dump.name.clone(),
            sha256: dump.sha256(),
            stats: built.stats.clone(),
            heap_failures: built.heap_failures.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Advisory comparison against the negative snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSummary {
    pub snapshot: SnapshotSummary,
    pub diff: DiffSummary,
    pub noisy: Vec<String>,
}

/// Everything a diff run produced, ready to serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// RFC 3339 timestamp.
    pub generated_at: String,
    pub config: AnalysisConfig,
    pub snapshots: Vec<SnapshotSummary>,
    pub diff: DiffSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<ControlSummary>,
    pub subgraph: ExportedGraph,
}

/// Full result of [`SnapshotPipeline::run`].
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub report: AnalysisReport,
    pub diff: DiffReport,
    pub subgraph: DiffSubgraph,
}

/// Loads dumps, builds one graph per dump in parallel, and diffs them.
#[derive(Debug, Clone, Default)]
pub struct SnapshotPipeline {
    config: AnalysisConfig,
}

impl SnapshotPipeline {
    pub fn new(config: AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Load every dump, in order.
    pub fn load_dumps(&self, bases: &[PathBuf]) -> Result<Vec<MemoryDump>> {
        let timer = OpTimer::start(format!("loading {} dumps", bases.len()));
        let dumps = bases.par_iter().map(|base| load_memory_dump(base)).collect::<Result<Vec<_>>>()?;
        timer.finish();
        Ok(dumps)
    }

    /// One pruned graph per dump, built concurrently; order follows `dumps`.
    pub fn build_graphs(&self, dumps: &[MemoryDump]) -> Vec<BuiltGraph> {
        let timer = OpTimer::start(format!("building {} graphs", dumps.len()));
        let builder = GraphBuilder::new(&self.config);
        let graphs = dumps.par_iter().map(|dump| builder.build(dump)).collect();
        timer.finish();
        graphs
    }

    pub fn diff(
        &self,
        graphs: &[MemoryGraph],
        negative: Option<&MemoryGraph>,
    ) -> Result<DiffReport, DiffError> {
        let timer = OpTimer::start(format!("diffing {} snapshots", graphs.len()));
        let report = diff_snapshots(graphs, negative)?;
        timer.finish();
        Ok(report)
    }

    /// Build, diff and extract the explaining subgraph of the last snapshot.
    pub fn run(
        &self,
        dumps: &[MemoryDump],
        negative: Option<&MemoryDump>,
    ) -> Result<PipelineOutput, DiffError> {
        if dumps.is_empty() {
            return Err(DiffError::EmptySnapshotSequence);
        }
        let built = self.build_graphs(dumps);
        let negative_built = negative.map(|dump| GraphBuilder::new(&self.config).build(dump));

        let graphs: Vec<MemoryGraph> = built.iter().map(|b| b.graph.clone()).collect();
        let diff = self.diff(&graphs, negative_built.as_ref().map(|b| &b.graph))?;
        let subgraph = match graphs.last() {
            Some(last) => extract_diff_subgraph(last, &diff.primary),
            None => DiffSubgraph::default(),
        };
        info!(
            "{} changed, {} removed, {} added; subgraph has {} nodes",
            diff.primary.changed.len(),
            diff.primary.removed.len(),
            diff.primary.added.len(),
            subgraph.graph.node_count()
        );

        let control = match (&diff.control, negative, &negative_built) {
            (Some(signal), Some(dump), Some(built)) => Some(ControlSummary {
                snapshot: SnapshotSummary::new(dump, built),
                diff: signal.diff.summary(),
                noisy: signal.noisy.iter().map(ToString::to_string).collect(),
            }),
            _ => None,
        };
        let report = AnalysisReport {
            generated_at: Utc::now().to_rfc3339(),
            config: self.config.clone(),
            snapshots: dumps.iter().zip(&built).map(|(d, b)| SnapshotSummary::new(d, b)).collect(),
            diff: diff.primary.summary(),
            control,
            subgraph: subgraph.export(),
        };
        Ok(PipelineOutput { report, diff, subgraph })
    }
}
