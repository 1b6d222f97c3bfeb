//! Serializable graph handed to visualization tooling.

use serde::{Deserialize, Serialize};

use crate::model::{Segment, SegmentKind};

/// Display tag of an exported node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeTag {
    Heap,
    Module,
    Stack,
    PrivateData,
    /// Kept only because it lies on a path to a diff target.
    OnPath,
    Changed,
    /// A changed node that is itself a thread stack.
    ChangedStack,
    Added,
}

impl NodeTag {
    /// Default tag for a node of a plain memory graph.
    pub fn for_segment(segment: &Segment) -> Self {
        match segment.kind {
            SegmentKind::Module { .. } => NodeTag::Module,
            SegmentKind::Stack => NodeTag::Stack,
            SegmentKind::PrivateData => NodeTag::PrivateData,
            _ => NodeTag::Heap,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            NodeTag::Heap => "orange",
            NodeTag::Module => "blue",
            NodeTag::Stack => "purple",
            NodeTag::PrivateData => "gray",
            NodeTag::OnPath => "turquoise",
            NodeTag::Changed => "red",
            NodeTag::ChangedStack => "deeppink",
            NodeTag::Added => "green",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedNode {
    pub id: String,
    pub tag: NodeTag,
    pub color: String,
    pub kind: String,
    pub address: u64,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ExportedNode {
    pub fn new(segment: &Segment, tag: NodeTag) -> Self {
        Self {
            id: segment.identity(),
            tag,
            color: tag.color().to_string(),
            kind: segment.kind.as_str().to_string(),
            address: segment.address,
            size: segment.size,
            name: segment.name().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedEdge {
    pub source: String,
    pub target: String,
    /// `{offset_src:#x}:{offset_dest:#x}`
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedGraph {
    pub name: String,
    pub roots: Vec<String>,
    pub nodes: Vec<ExportedNode>,
    pub edges: Vec<ExportedEdge>,
}

impl ExportedGraph {
    pub fn node(&self, id: &str) -> Option<&ExportedNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
