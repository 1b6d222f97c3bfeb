//! The part of a graph that explains a diff: every node on a shortest path
//! from a root to a changed or added node.

use std::collections::{HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::graph::{ExportedGraph, MemoryGraph, NodeTag, Pointer};
use crate::model::{Segment, SegmentKind, ValueKey};

use super::SequenceDiff;

/// Subgraph of the final snapshot with a display tag per node.
#[derive(Debug, Clone, Default)]
pub struct DiffSubgraph {
    pub graph: MemoryGraph,
    /// Indexed by node index of `graph`.
    pub tags: Vec<NodeTag>,
    /// Identities of removed nodes; they are absent from the final snapshot.
    pub removed: Vec<String>,
}

impl DiffSubgraph {
    pub fn tag(&self, ix: NodeIndex) -> Option<NodeTag> {
        self.tags.get(ix.index()).copied()
    }

    pub fn export(&self) -> ExportedGraph {
        self.graph.export_with(|ix, _| self.tag(ix).unwrap_or(NodeTag::OnPath))
    }
}

/// Extract from `graph` (the final snapshot) the nodes lying on any shortest
/// path from a root to a changed or added node.
pub fn extract_diff_subgraph(graph: &MemoryGraph, diff: &SequenceDiff) -> DiffSubgraph {
    let changed: HashSet<ValueKey<'_>> = diff.changed.iter().map(Segment::value_key).collect();
    let added: HashSet<ValueKey<'_>> = diff.added.iter().map(Segment::value_key).collect();
    let inner = graph.inner();
    let targets: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|ix| {
            graph.node(*ix).is_some_and(|n| {
                let key = n.value_key();
                changed.contains(&key) || added.contains(&key)
            })
        })
        .collect();

    let mut keep = vec![false; graph.node_count()];
    for &root in graph.roots() {
        let dist = distances_from(inner, root);
        let mut pending: Vec<NodeIndex> =
            targets.iter().copied().filter(|t| level(&dist, *t).is_some()).collect();
        let mut visited = HashSet::new();
        while let Some(node) = pending.pop() {
            if !visited.insert(node) {
                continue;
            }
            if let Some(flag) = keep.get_mut(node.index()) {
                *flag = true;
            }
            let Some(d) = level(&dist, node) else { continue };
            pending.extend(
                inner
                    .edges_directed(node, Direction::Incoming)
                    .map(|edge| edge.source())
                    .filter(|src| on_previous_level(&dist, *src, d)),
            );
        }
    }

    let graph = graph.retain(&keep);
    let tags = graph
        .nodes()
        .map(|node| {
            let key = node.value_key();
            if added.contains(&key) {
                NodeTag::Added
            } else if changed.contains(&key) {
                match node.kind {
                    SegmentKind::Stack => NodeTag::ChangedStack,
                    _ => NodeTag::Changed,
                }
            } else {
                NodeTag::OnPath
            }
        })
        .collect();
    let removed = diff.removed.iter().map(Segment::identity).collect();
    DiffSubgraph { graph, tags, removed }
}

/// Breadth-first hop count from `root`, indexed by node index.
fn distances_from(graph: &DiGraph<Segment, Pointer>, root: NodeIndex) -> Vec<Option<usize>> {
    let mut dist = vec![None; graph.node_count()];
    let mut queue = VecDeque::new();
    if let Some(slot) = dist.get_mut(root.index()) {
        *slot = Some(0);
        queue.push_back((root, 0));
    }
    while let Some((node, d)) = queue.pop_front() {
        for next in graph.neighbors_directed(node, Direction::Outgoing) {
            if let Some(slot) = dist.get_mut(next.index()).filter(|slot| slot.is_none()) {
                *slot = Some(d + 1);
                queue.push_back((next, d + 1));
            }
        }
    }
    dist
}

fn level(dist: &[Option<usize>], node: NodeIndex) -> Option<usize> {
    dist.get(node.index()).copied().flatten()
}

fn on_previous_level(dist: &[Option<usize>], node: NodeIndex, d: usize) -> bool {
    d.checked_sub(1).is_some_and(|prev| level(dist, node) == Some(prev))
}
