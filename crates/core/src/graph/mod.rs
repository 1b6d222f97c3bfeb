//! Memory graphs: allocations, modules and stacks linked by pointers.
//!
//! Building is two-phase. [`GraphBuilder::build_unpruned`] adds every node
//! and every discovered pointer; [`MemoryGraph::prune_unreachable`] then
//! returns a new graph holding only what is reachable from a root. Nothing
//! is removed while iterating.

pub mod export;
pub mod pointers;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::dump::MemoryDump;
use crate::heap::{parse_all_data_structures, HeapError};
use crate::model::Segment;

pub use export::{ExportedEdge, ExportedGraph, ExportedNode, NodeTag};
pub use pointers::{Pointer, PointerResolver, ResolvedPointer, StructureIndex};

/// Directed multigraph of memory regions.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    name: String,
    graph: DiGraph<Segment, Pointer>,
    roots: Vec<NodeIndex>,
}

impl MemoryGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), graph: DiGraph::new(), roots: Vec::new() }
    }

    /// Add a node; modules and stacks become roots.
    pub fn add_node(&mut self, segment: Segment) -> NodeIndex {
        let is_root = segment.is_root();
        let ix = self.graph.add_node(segment);
        if is_root {
            self.roots.push(ix);
        }
        ix
    }

    /// Add a node that is a root regardless of its kind.
    pub fn add_root(&mut self, segment: Segment) -> NodeIndex {
        let ix = self.graph.add_node(segment);
        self.roots.push(ix);
        ix
    }

    /// Add a pointer edge; `None` if either endpoint is unknown.
    pub fn add_edge(&mut self, src: NodeIndex, dest: NodeIndex, pointer: Pointer) -> Option<EdgeIndex> {
        self.graph.node_weight(src)?;
        self.graph.node_weight(dest)?;
        Some(self.graph.add_edge(src, dest, pointer))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Segment> {
        self.graph.node_weights()
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn node(&self, ix: NodeIndex) -> Option<&Segment> {
        self.graph.node_weight(ix)
    }

    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    pub fn is_root(&self, ix: NodeIndex) -> bool {
        self.roots.contains(&ix)
    }

    /// `(source, target, pointer)` for every edge.
    pub fn edges(&self) -> impl Iterator<Item = (&Segment, &Segment, &Pointer)> {
        self.graph.edge_references().filter_map(move |edge| {
            let src = self.graph.node_weight(edge.source())?;
            let dest = self.graph.node_weight(edge.target())?;
            Some((src, dest, edge.weight()))
        })
    }

    pub fn inner(&self) -> &DiGraph<Segment, Pointer> {
        &self.graph
    }

    /// First node starting at `address`.
    pub fn seek_node_by_address(&self, address: u64) -> Option<&Segment> {
        self.nodes().find(|n| n.address == address)
    }

    /// Sum of node sizes in bytes.
    pub fn total_size(&self) -> u64 {
        self.nodes().map(|n| n.size).sum()
    }

    /// Per-node flag: is there a path from at least one root.
    pub fn reachable_from_roots(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.graph.node_count()];
        let mut dfs = Dfs::empty(&self.graph);
        for root in &self.roots {
            dfs.move_to(*root);
            while let Some(ix) = dfs.next(&self.graph) {
                if let Some(flag) = reachable.get_mut(ix.index()) {
                    *flag = true;
                }
            }
        }
        reachable
    }

    /// A new graph without the nodes no root can reach.
    pub fn prune_unreachable(&self) -> MemoryGraph {
        self.retain(&self.reachable_from_roots())
    }

    /// A new graph holding only the nodes flagged in `keep` (by node index),
    /// the edges between them, and the surviving roots.
    pub fn retain(&self, keep: &[bool]) -> MemoryGraph {
        let kept = |ix: NodeIndex| keep.get(ix.index()).copied().unwrap_or(false);
        let mut remap = vec![None; self.graph.node_count()];
        let mut next = 0usize;
        for ix in self.graph.node_indices().filter(|ix| kept(*ix)) {
            if let Some(slot) = remap.get_mut(ix.index()) {
                *slot = Some(NodeIndex::new(next));
            }
            next += 1;
        }
        let graph = self
            .graph
            .filter_map(|ix, segment| kept(ix).then(|| segment.clone()), |_, pointer| Some(*pointer));
        let roots =
            self.roots.iter().filter_map(|r| remap.get(r.index()).copied().flatten()).collect();
        MemoryGraph { name: self.name.clone(), graph, roots }
    }

    /// Export with each node tagged by its kind.
    pub fn export(&self) -> ExportedGraph {
        self.export_with(|_, segment| NodeTag::for_segment(segment))
    }

    pub(crate) fn export_with(&self, tag: impl Fn(NodeIndex, &Segment) -> NodeTag) -> ExportedGraph {
        let nodes = self
            .graph
            .node_indices()
            .filter_map(|ix| self.graph.node_weight(ix).map(|seg| ExportedNode::new(seg, tag(ix, seg))))
            .collect();
        let edges = self
            .edges()
            .map(|(src, dest, pointer)| ExportedEdge {
                source: src.identity(),
                target: dest.identity(),
                label: pointer.to_string(),
            })
            .collect();
        let roots =
            self.roots.iter().filter_map(|r| self.graph.node_weight(*r)).map(Segment::identity).collect();
        ExportedGraph { name: self.name.clone(), roots, nodes, edges }
    }
}

/// Counters collected while building one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub data_structures: usize,
    pub global_pointers: usize,
    pub stack_pointers: usize,
    pub private_pointers: usize,
    pub structure_pointers: usize,
    pub nodes_before_prune: usize,
    pub nodes_after_prune: usize,
    pub edges_after_prune: usize,
    pub bytes_before_prune: u64,
    pub bytes_after_prune: u64,
}

/// Result of building a graph for one dump.
#[derive(Debug, Clone)]
pub struct BuiltGraph {
    pub graph: MemoryGraph,
    pub stats: GraphStats,
    /// Heaps skipped because their metadata was corrupt.
    pub heap_failures: Vec<HeapError>,
}

/// Builds memory graphs from dumps.
#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Build the graph for `dump` and prune what no root reaches.
    pub fn build(&self, dump: &MemoryDump) -> BuiltGraph {
        let BuiltGraph { graph: full, mut stats, heap_failures } = self.build_unpruned(dump);
        let graph = full.prune_unreachable();
        stats.nodes_after_prune = graph.node_count();
        stats.edges_after_prune = graph.edge_count();
        stats.bytes_after_prune = graph.total_size();
        debug!(
            "{}: sizes (KiB) dump={} graph={} pruned={}",
            dump.name,
            dump.size() / 1024,
            stats.bytes_before_prune / 1024,
            stats.bytes_after_prune / 1024
        );
        debug!(
            "{}: {} unreachable nodes removed, {} nodes / {} edges",
            dump.name,
            stats.nodes_before_prune - stats.nodes_after_prune,
            stats.nodes_after_prune,
            stats.edges_after_prune
        );
        BuiltGraph { graph, stats, heap_failures }
    }

    /// Every recovered node and pointer, before pruning.
    pub fn build_unpruned(&self, dump: &MemoryDump) -> BuiltGraph {
        let extraction = parse_all_data_structures(dump, &self.config.heap);
        let index = StructureIndex::new(extraction.structures);
        let resolver = PointerResolver::new(&index, self.config.pointer_band);
        debug!("{}: {} data structures parsed", dump.name, index.len());

        let mut graph = MemoryGraph::new(dump.name.clone());
        let structures: Vec<NodeIndex> = index.iter().map(|ds| graph.add_node(ds.clone())).collect();

        let mut stats = GraphStats { data_structures: index.len(), ..GraphStats::default() };
        stats.global_pointers = link_roots(&mut graph, &resolver, &structures, &dump.modules);
        debug!("{}: {} global pointers found", dump.name, stats.global_pointers);
        stats.stack_pointers = link_roots(&mut graph, &resolver, &structures, &dump.stacks);
        debug!("{}: {} stack pointers found", dump.name, stats.stack_pointers);
        if self.config.scan_private_data {
            stats.private_pointers =
                link_roots(&mut graph, &resolver, &structures, &dump.private_data);
            debug!("{}: {} private data pointers found", dump.name, stats.private_pointers);
        }

        for (idx, ds) in index.iter().enumerate() {
            for found in resolver.scan(ds, Some(idx)) {
                if let (Some(&src), Some(&dest)) = (structures.get(idx), structures.get(found.dest)) {
                    graph.add_edge(src, dest, found.pointer);
                    stats.structure_pointers += 1;
                }
            }
        }
        debug!("{}: {} data structure pointers found", dump.name, stats.structure_pointers);

        stats.nodes_before_prune = graph.node_count();
        stats.nodes_after_prune = graph.node_count();
        stats.edges_after_prune = graph.edge_count();
        stats.bytes_before_prune = graph.total_size();
        stats.bytes_after_prune = stats.bytes_before_prune;
        BuiltGraph { graph, stats, heap_failures: extraction.failures }
    }
}

/// Add `regions` as roots and link every pointer they hold.
fn link_roots(
    graph: &mut MemoryGraph,
    resolver: &PointerResolver<'_>,
    structures: &[NodeIndex],
    regions: &[Segment],
) -> usize {
    let mut linked = 0;
    for region in regions {
        let src = graph.add_root(region.clone());
        for found in resolver.scan(region, None) {
            if let Some(&dest) = structures.get(found.dest) {
                graph.add_edge(src, dest, found.pointer);
                linked += 1;
            }
        }
    }
    linked
}
