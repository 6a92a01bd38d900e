use std::fmt::{self, Debug};

use anyhow::Context;
use petgraph::{Directed, Direction, prelude::StableGraph, visit::NodeIndexable};

pub use petgraph::prelude::NodeIndex;

/// Work recorded onto a stream during capture. Invoked at most once per
/// optimize call; every driver command it issues is captured rather than
/// executed.
pub type CaptureWork<S> = Box<dyn FnMut(&S) -> anyhow::Result<()>>;

/// Per-node scheduling state written by the optimizers.
///
/// Valid only for the duration of one optimize call; levelization resets it
/// up front. `event` indexes into that call's event table and is set when at
/// least one successor of the node is assigned to a different stream.
#[derive(Debug, Clone, Default)]
pub struct CaptureMeta {
    pub level: usize,
    pub idx: usize,
    pub event: Option<usize>,
}

struct CaptureNode<S> {
    name: String,
    work: CaptureWork<S>,
    meta: CaptureMeta,
}

/// A DAG of capture work items, generic over the backend's stream handle.
///
/// The optimizers only read topology and write [`CaptureMeta`]; they never
/// mutate the node/edge structure. Node enumeration follows insertion order,
/// which together with in-level position fixes the round-robin stream
/// assignment.
pub struct CaptureGraph<S> {
    graph: StableGraph<CaptureNode<S>, (), Directed>,
}

impl<S> Default for CaptureGraph<S> {
    fn default() -> Self {
        Self {
            graph: StableGraph::default(),
        }
    }
}

impl<S> CaptureGraph<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a work item. The closure receives the stream it was assigned to
    /// and enqueues driver commands on it.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        work: impl FnMut(&S) -> anyhow::Result<()> + 'static,
    ) -> NodeIndex {
        self.graph.add_node(CaptureNode {
            name: name.into(),
            work: Box::new(work),
            meta: CaptureMeta::default(),
        })
    }

    /// Declares that `to` depends on `from`.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        self.graph.add_edge(from, to, ());
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn name(&self, node: NodeIndex) -> &str {
        &self.graph[node].name
    }

    pub fn meta(&self, node: NodeIndex) -> &CaptureMeta {
        &self.graph[node].meta
    }

    pub(crate) fn meta_mut(&mut self, node: NodeIndex) -> &mut CaptureMeta {
        &mut self.graph[node].meta
    }

    pub fn successors(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Outgoing)
    }

    pub fn dependents(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Incoming)
    }

    /// Upper bound on `NodeIndex::index`, for sizing visit maps.
    pub(crate) fn node_bound(&self) -> usize {
        self.graph.node_bound()
    }

    pub(crate) fn run_work(&mut self, node: NodeIndex, stream: &S) -> anyhow::Result<()> {
        let n = &mut self.graph[node];
        (n.work)(stream).with_context(|| format!("task '{}' failed", n.name))
    }

    pub(crate) fn reset_meta(&mut self) {
        for weight in self.graph.node_weights_mut() {
            weight.meta = CaptureMeta::default();
        }
    }
}

impl<S> Debug for CaptureGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureGraph")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}
