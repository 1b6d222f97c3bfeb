//! memdiff-core
//!
//! Heap object graphs recovered from process memory dumps, and the diffing
//! of those graphs across snapshots.
//!
//! A dump is loaded into a [`dump::MemoryDump`]; its heaps are walked for live
//! allocations ([`heap`]); pointers between allocations, modules and stacks
//! become the edges of a [`graph::MemoryGraph`]; a sequence of graphs is
//! classified into changed, removed and added nodes ([`diff`]). The CLI is a
//! thin frontend over [`services::SnapshotPipeline`].

pub mod config;
pub mod diff;
pub mod dump;
pub mod graph;
pub mod heap;
pub mod model;
pub mod services;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
