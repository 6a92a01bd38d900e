use tracing::{debug, trace};

use crate::backend::CaptureBackend;
use crate::error::{CaptureError, Result};
use crate::graph::CaptureGraph;
use crate::topo::toposort;

/// Captures the described graph using a single stream.
///
/// Finds a topological order of the graph and replays dependent work items
/// one after another; the stream's FIFO ordering covers every dependency, so
/// no events are needed. All work runs sequentially.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialOptimizer;

impl SequentialOptimizer {
    pub fn new() -> Self {
        Self
    }

    #[tracing::instrument(skip_all, fields(nodes = graph.node_count()))]
    pub fn optimize<B: CaptureBackend>(
        &self,
        backend: &mut B,
        graph: &mut CaptureGraph<B::Stream>,
    ) -> Result<B::NativeGraph> {
        let stream = backend
            .stream()
            .map_err(CaptureError::driver("failed to acquire stream"))?;

        backend.begin_capture(&stream).map_err(CaptureError::driver(
            "failed to turn stream into per-thread capture mode",
        ))?;
        debug!("capture begun");

        for node in toposort(graph) {
            trace!(task = graph.name(node), "replaying");
            if let Err(err) = graph.run_work(node, &stream) {
                // Terminate the active capture before propagating; the
                // partial graph is discarded.
                let _ = backend.end_capture(&stream);
                return Err(CaptureError::Work(err));
            }
        }

        backend
            .end_capture(&stream)
            .map_err(CaptureError::driver("failed to end capture"))
    }
}
