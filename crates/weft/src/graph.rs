//! The unbuilt graph: nodes as supplied by the graph producer.
//!
//! The core does not construct or optimize graphs; an external stage supplies
//! one operation kind, one queue descriptor, and one chosen backend per node.
//! Data dependencies are implied by shared tensor buffers: a node that reads
//! a buffer another node writes depends on that producer.

use crate::capability::BackendId;
use crate::descriptor::QueueDescriptor;
use crate::layer::LayerKind;

/// One graph node awaiting compilation.
#[derive(Debug)]
pub struct GraphNode {
    pub kind: LayerKind,
    pub descriptor: QueueDescriptor,
    pub backend: BackendId,
}

/// Ordered collection of nodes, ready to be loaded onto backends.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<GraphNode>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node and returns its index.
    pub fn add_node(
        &mut self,
        kind: LayerKind,
        descriptor: QueueDescriptor,
        backend: impl Into<BackendId>,
    ) -> usize {
        self.nodes.push(GraphNode {
            kind,
            descriptor,
            backend: backend.into(),
        });
        self.nodes.len() - 1
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
