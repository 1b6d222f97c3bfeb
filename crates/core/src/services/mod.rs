//! Orchestration over several snapshots.

pub mod pipeline;
pub mod timing;

pub use pipeline::{AnalysisReport, ControlSummary, PipelineOutput, SnapshotPipeline, SnapshotSummary};
pub use timing::OpTimer;
