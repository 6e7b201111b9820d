//! Storage-layer identifiers and summaries.
//!
//! Row identifiers are defined here (not in trestle-core) because identity is
//! a storage concern: terms and statements only gain an id when persisted.
//! The inner `i64` aligns with SQLite's `INTEGER PRIMARY KEY`.

use std::fmt;

use serde::{Deserialize, Serialize};

use trestle_core::{NodeKind, Triple};

/// Row id of a graph record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphId(pub i64);

/// Row id of a node record. Shared by every graph that uses the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub i64);

/// Row id of a triple record. Shared by every graph that links the triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TripleId(pub i64);

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GraphId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for TripleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TripleId({})", self.0)
    }
}

/// Persisted node type tag (`nodes.node_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Blank = 0,
    Uri = 1,
    Literal = 2,
}

impl NodeType {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(NodeType::Blank),
            1 => Some(NodeType::Uri),
            2 => Some(NodeType::Literal),
            _ => None,
        }
    }
}

impl From<NodeKind> for NodeType {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Blank => NodeType::Blank,
            NodeKind::Uri => NodeType::Uri,
            NodeKind::Literal => NodeType::Literal,
        }
    }
}

/// What a buffered write does when the worker applies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    /// Create rows as needed and link the triple to the graph.
    Insert,
    /// Unlink the triple from the graph.
    Remove,
}

/// A pending write held by the background buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedWrite {
    pub op: WriteOp,
    pub triple: Triple,
    pub graph: GraphId,
}

impl BufferedWrite {
    pub fn insert(triple: Triple, graph: GraphId) -> Self {
        BufferedWrite {
            op: WriteOp::Insert,
            triple,
            graph,
        }
    }

    pub fn remove(triple: Triple, graph: GraphId) -> Self {
        BufferedWrite {
            op: WriteOp::Remove,
            triple,
            graph,
        }
    }
}

/// Row counts for a store (for listing and diagnostics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub graphs: u64,
    pub nodes: u64,
    pub triples: u64,
    pub links: u64,
    pub namespaces: u64,
}
