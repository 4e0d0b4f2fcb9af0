//! Graph compilation and straight-line execution.
//!
//! `Graph -> LoadedGraph` is the Unbuilt -> Built transition: every node gets
//! a concrete workload from its backend's factory, in an order that respects
//! producer/consumer relationships between tensor buffers. Execution then
//! walks that order; no scheduler exists or is needed, and any parallelism
//! lives inside individual workloads.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, warn};

use crate::capability::BackendId;
use crate::error::{ExecutionError, GraphCompileError};
use crate::factory::{self, WorkloadFactory};
use crate::graph::Graph;
use crate::memory::MemoryManager;
use crate::workload::Workload;

/// Default per-backend scratch pool capacity (64 MiB).
pub const DEFAULT_WORKSPACE_CAPACITY: usize = 64 * 1024 * 1024;

/// Compiles graphs against the registered backend factories.
#[derive(Debug, Default)]
pub struct ExecutionEngine {
    fallback_order: Vec<BackendId>,
    workspace_capacity: Option<usize>,
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backends to try, in order, when a node's preferred backend declines it.
    pub fn with_fallbacks(mut self, fallback_order: Vec<BackendId>) -> Self {
        self.fallback_order = fallback_order;
        self
    }

    /// Overrides the per-backend scratch pool capacity in bytes.
    pub fn with_workspace_capacity(mut self, capacity: usize) -> Self {
        self.workspace_capacity = Some(capacity);
        self
    }

    /// Builds one workload per node, in topological order.
    ///
    /// Fails with [`GraphCompileError::NoBackend`] when a node is declined by
    /// its preferred backend and every configured fallback. The error is
    /// fatal for this graph only; the process and other graphs are unaffected.
    pub fn load_graph(&self, graph: &Graph) -> Result<LoadedGraph, GraphCompileError> {
        let order = topological_order(graph)?;
        let capacity = self.workspace_capacity.unwrap_or(DEFAULT_WORKSPACE_CAPACITY);

        let mut factories: HashMap<BackendId, Arc<dyn WorkloadFactory>> = HashMap::new();
        let mut memory: HashMap<BackendId, MemoryManager> = HashMap::new();
        let mut workloads = Vec::with_capacity(graph.len());

        for node_index in order {
            let node = &graph.nodes()[node_index];
            let mut attempts: Vec<(BackendId, String)> = Vec::new();
            let mut placed = None;

            let mut candidates = vec![node.backend.clone()];
            for fallback in &self.fallback_order {
                if !candidates.contains(fallback) {
                    candidates.push(fallback.clone());
                }
            }

            for backend in candidates {
                let factory = match factories.get(&backend) {
                    Some(factory) => Arc::clone(factory),
                    None => match factory::create_factory(backend.as_str()) {
                        Some(factory) => {
                            factories.insert(backend.clone(), Arc::clone(&factory));
                            factory
                        }
                        None => {
                            if backend == node.backend && self.fallback_order.is_empty() {
                                return Err(GraphCompileError::UnknownBackend {
                                    node: node_index,
                                    backend,
                                });
                            }
                            attempts.push((backend.clone(), "backend not registered".into()));
                            continue;
                        }
                    },
                };

                let pool = memory
                    .entry(backend.clone())
                    .or_insert_with(|| MemoryManager::new(capacity));

                match factory.create_workload(node.kind, &node.descriptor, pool) {
                    Ok(workload) => {
                        if backend != node.backend {
                            warn!(
                                "node {node_index} ({}) fell back from '{}' to '{}'",
                                node.kind, node.backend, backend
                            );
                        }
                        debug!("node {node_index} ({}) placed on '{}'", node.kind, backend);
                        placed = Some(LoadedWorkload {
                            node: node_index,
                            backend,
                            workload,
                        });
                        break;
                    }
                    Err(err) if err.is_not_supported() => {
                        attempts.push((backend, err.to_string()));
                    }
                    Err(err) => {
                        return Err(GraphCompileError::Factory {
                            node: node_index,
                            kind: node.kind,
                            source: err,
                        });
                    }
                }
            }

            match placed {
                Some(workload) => workloads.push(workload),
                None => {
                    return Err(GraphCompileError::NoBackend {
                        node: node_index,
                        kind: node.kind,
                        attempts,
                    });
                }
            }
        }

        Ok(LoadedGraph { workloads, memory })
    }
}

struct LoadedWorkload {
    node: usize,
    backend: BackendId,
    workload: Box<dyn Workload>,
}

/// A compiled graph: one workload per node, in execution order, plus the
/// per-backend scratch pools that outlive the workloads until teardown.
pub struct LoadedGraph {
    workloads: Vec<LoadedWorkload>,
    memory: HashMap<BackendId, MemoryManager>,
}

impl LoadedGraph {
    /// Executes every workload in topological order.
    ///
    /// Each node observes fully written inputs from its producers. Re-running
    /// after rewriting the graph's input tensor contents needs no rebuild.
    /// The first failure propagates immediately; there is no partial silent
    /// success and no internal retry.
    pub fn execute(&self) -> Result<(), ExecutionError> {
        for entry in &self.workloads {
            debug!(
                "executing node {} ({}) on '{}'",
                entry.node,
                entry.workload.kind(),
                entry.backend
            );
            entry.workload.execute()?;
        }
        Ok(())
    }

    /// (node index, backend) placements in execution order.
    pub fn placements(&self) -> impl Iterator<Item = (usize, &BackendId)> {
        self.workloads.iter().map(|entry| (entry.node, &entry.backend))
    }

    /// Scratch pool of one participating backend, if it took part.
    pub fn memory_manager(&self, backend: &BackendId) -> Option<MemoryManager> {
        self.memory.get(backend).cloned()
    }
}

/// Kahn's algorithm over buffer-identity edges: node A precedes node B when B
/// reads a buffer A writes. Ties keep the graph's insertion order.
fn topological_order(graph: &Graph) -> Result<Vec<usize>, GraphCompileError> {
    let nodes = graph.nodes();

    let mut producer_of: HashMap<usize, usize> = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        for output in &node.descriptor.outputs {
            producer_of.insert(output.buffer_id(), index);
        }
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];
    for (index, node) in nodes.iter().enumerate() {
        for input in &node.descriptor.inputs {
            if let Some(&producer) = producer_of.get(&input.buffer_id()) {
                if producer != index {
                    dependents[producer].push(index);
                    in_degree[index] += 1;
                }
            }
        }
    }

    let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(index) = ready.pop_front() {
        order.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    if order.len() != nodes.len() {
        return Err(GraphCompileError::Cyclic);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{LayerParams, QueueDescriptor};
    use crate::layer::LayerKind;
    use crate::tensor::{DType, TensorHandle, TensorInfo, TensorShape};

    fn handle() -> TensorHandle {
        TensorHandle::zeroed(TensorInfo::new(TensorShape::new([2]), DType::F32)).unwrap()
    }

    fn node(inputs: Vec<TensorHandle>, outputs: Vec<TensorHandle>) -> QueueDescriptor {
        QueueDescriptor::new(inputs, outputs, LayerParams::None)
    }

    #[test]
    fn topological_order_follows_buffer_identity() {
        // Insert nodes out of dependency order: consumer first.
        let a = handle();
        let b = handle();
        let c = handle();
        let mut graph = Graph::new();
        // node 0 consumes b (produced by node 1).
        graph.add_node(
            LayerKind::Addition,
            node(vec![b.clone(), b.clone()], vec![c]),
            BackendId::new("ref"),
        );
        // node 1 produces b from a.
        graph.add_node(
            LayerKind::Activation,
            node(vec![a], vec![b]),
            BackendId::new("ref"),
        );

        let order = topological_order(&graph).unwrap();
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn cycles_are_rejected() {
        let a = handle();
        let b = handle();
        let mut graph = Graph::new();
        graph.add_node(
            LayerKind::Addition,
            node(vec![a.clone()], vec![b.clone()]),
            BackendId::new("ref"),
        );
        graph.add_node(
            LayerKind::Addition,
            node(vec![b], vec![a]),
            BackendId::new("ref"),
        );
        assert!(matches!(
            topological_order(&graph),
            Err(GraphCompileError::Cyclic)
        ));
    }

    #[test]
    fn independent_nodes_keep_insertion_order() {
        let mut graph = Graph::new();
        for _ in 0..3 {
            graph.add_node(
                LayerKind::Activation,
                node(vec![handle()], vec![handle()]),
                BackendId::new("ref"),
            );
        }
        assert_eq!(topological_order(&graph).unwrap(), vec![0, 1, 2]);
    }
}
